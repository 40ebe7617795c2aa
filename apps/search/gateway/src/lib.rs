//! Vector Search Gateway
//!
//! A thin REST front for the vector search orchestrator.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   ↓ (JSON over HTTP)
//! /api/base/search/vectorSearch/* (domain_search::handlers)
//!   ↓
//! SearchOrchestrator / DataMutationService / PartitionDirectory
//!   ↓                         ↓
//! MilvusBackend (REST v2)   OpenAIProvider (optional)
//! ```
//!
//! ## Modules
//!
//! - `config`: Gateway configuration composed from the shared config library
//! - `server`: Router assembly, startup and shutdown

pub mod config;
pub mod server;
mod shutdown;

pub use config::GatewayConfig;
pub use server::{API_BASE_PATH, build_app, run};
