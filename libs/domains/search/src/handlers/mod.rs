mod vector_search;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use utoipa::OpenApi;

use crate::backend::VectorBackend;
use crate::config::SearchConfig;
use crate::decode::DocumentHit;
use crate::embedding::EmbeddingProvider;
use crate::error::ErrorResponse;
use crate::models::{Hit, MutationResult};
use crate::mutation::DataMutationService;
use crate::orchestrator::SearchOrchestrator;
use crate::partitions::PartitionDirectory;

pub use vector_search::{
    DeleteRecordsRequest, InsertTextsRequest, PartitionsParams, SearchAsyncRequest,
    SearchTextRequest, SearchWithFilterRequest,
};

/// Services shared by the gateway handlers
pub struct GatewayState<B: VectorBackend + 'static> {
    pub search: SearchOrchestrator<B>,
    pub mutations: DataMutationService<B>,
    pub partitions: PartitionDirectory<B>,
}

impl<B: VectorBackend + 'static> GatewayState<B> {
    pub fn new(
        backend: Arc<B>,
        config: SearchConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        let mut search = SearchOrchestrator::new(Arc::clone(&backend), config.clone());
        let mut mutations = DataMutationService::new(Arc::clone(&backend), config.mutation_timeout)
            .with_text_fields(config.documents.clone());
        if let Some(provider) = embedder {
            search = search.with_embedding_provider(Arc::clone(&provider));
            mutations = mutations.with_embedding_provider(provider);
        }

        Self {
            search,
            mutations,
            partitions: PartitionDirectory::new(backend).with_timeout(config.search_timeout),
        }
    }
}

/// OpenAPI documentation for the vector search gateway
#[derive(OpenApi)]
#[openapi(
    paths(
        vector_search::search_text,
        vector_search::search_with_filter,
        vector_search::search_async,
        vector_search::list_partitions,
        vector_search::insert_texts,
        vector_search::delete_records,
    ),
    components(
        schemas(
            SearchTextRequest, SearchWithFilterRequest, SearchAsyncRequest,
            InsertTextsRequest, DeleteRecordsRequest,
            Hit, DocumentHit, MutationResult, ErrorResponse
        )
    ),
    tags(
        (name = "vector-search", description = "Vector similarity search and record mutation")
    )
)]
pub struct SearchApiDoc;

/// Router for the vector search gateway, to be nested under its base path
pub fn router<B: VectorBackend + 'static>(state: GatewayState<B>) -> Router {
    Router::new()
        .route("/search", post(vector_search::search_text))
        .route("/searchWithFilter", post(vector_search::search_with_filter))
        .route("/searchAsync", post(vector_search::search_async))
        .route("/partitions", get(vector_search::list_partitions))
        .route("/records/text", post(vector_search::insert_texts))
        .route("/records/delete", post(vector_search::delete_records))
        .with_state(Arc::new(state))
}
