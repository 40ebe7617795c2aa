//! Vector Search Domain Library
//!
//! Orchestrates similarity search and record mutation over a Milvus-style
//! vector index, with optional text embedding.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐  ┌─────────────────────┐  ┌────────────────────┐
//! │ SearchOrchestrator │  │ DataMutationService │  │ PartitionDirectory │
//! └─────────┬──────────┘  └──────────┬──────────┘  └─────────┬──────────┘
//!           │ CollectionManager      │                       │
//!           │ (load ref-counting)    │                       │
//! ┌─────────▼────────────────────────▼───────────────────────▼─────────┐
//! │                       VectorBackend (trait)                        │
//! └─────────┬──────────────────────────────────────────┬───────────────┘
//! ┌─────────▼──────────┐                     ┌─────────▼──────────────┐
//! │   MilvusBackend    │                     │ InMemoryVectorBackend  │
//! │   (REST v2)        │                     │ (tests, local runs)    │
//! └────────────────────┘                     └────────────────────────┘
//! ```
//!
//! Text inputs go through an [`EmbeddingProvider`] (OpenAI-compatible by
//! default) before reaching the orchestrator or the mutation service.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_search::{MilvusBackend, SearchConfig, SearchOrchestrator};
//!
//! # async fn example() -> Result<(), domain_search::VectorError> {
//! let backend = Arc::new(MilvusBackend::from_env()?);
//! let search = SearchOrchestrator::new(backend, SearchConfig::default());
//!
//! let ids = search.search("documents", vec![vec![0.1; 768]], 5).await?;
//! let handle = search.search_async("documents", vec![vec![0.1; 768]], vec!["2024".into()], 5)?;
//! let same_shape = handle.await?;
//! # let _ = (ids, same_shape);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod blocking;
pub mod config;
pub mod decode;
pub mod embedding;
pub mod error;
pub mod expr;
pub mod handlers;
pub mod lifecycle;
pub mod memory;
pub mod milvus;
pub mod models;
pub mod mutation;
pub mod orchestrator;
pub mod partitions;
pub mod query;

// Re-export commonly used types
pub use backend::{InsertRequest, RawSearchResults, Reply, Status, StatusCode, VectorBackend};
pub use blocking::BlockingSearchClient;
pub use config::{DocumentCollectionConfig, SearchConfig};
pub use decode::{DocumentHit, OutputFields, decode_rows, split_hits};
pub use embedding::{EmbeddingProvider, OpenAIConfig, OpenAIProvider};
pub use error::{ErrorResponse, VectorError, VectorResult};
pub use expr::Expr;
pub use handlers::{GatewayState, SearchApiDoc, router};
pub use lifecycle::{CollectionManager, LoadGuard};
pub use memory::InMemoryVectorBackend;
pub use milvus::{MilvusBackend, MilvusConfig};
pub use models::{
    CollectionSpec, ConsistencyLevel, FieldColumn, FieldData, FieldKind, FieldSpec, FieldValue,
    Hit, MetricType, MutationResult, RecordId, SearchResult,
};
pub use mutation::DataMutationService;
pub use orchestrator::{SearchHandle, SearchOrchestrator};
pub use partitions::PartitionDirectory;
pub use query::{QueryParams, SearchQuery};
