use tokio::runtime::{Builder, Runtime};

use crate::backend::VectorBackend;
use crate::decode::DocumentHit;
use crate::error::{VectorError, VectorResult};
use crate::models::{Hit, RecordId};
use crate::orchestrator::SearchOrchestrator;

/// Blocking facade over [`SearchOrchestrator`] for callers without a runtime.
///
/// Must not be used from inside an async context.
pub struct BlockingSearchClient<B: VectorBackend + 'static> {
    runtime: Runtime,
    orchestrator: SearchOrchestrator<B>,
}

impl<B: VectorBackend + 'static> BlockingSearchClient<B> {
    pub fn new(orchestrator: SearchOrchestrator<B>) -> VectorResult<Self> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("search-blocking")
            .build()
            .map_err(|e| VectorError::Internal(format!("failed to build runtime: {}", e)))?;
        Ok(Self {
            runtime,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator<B> {
        &self.orchestrator
    }

    pub fn search(
        &self,
        collection_name: &str,
        vectors: Vec<Vec<f32>>,
        top_k: usize,
    ) -> VectorResult<Vec<Vec<RecordId>>> {
        self.runtime
            .block_on(self.orchestrator.search(collection_name, vectors, top_k))
    }

    pub fn search_filtered(
        &self,
        collection_name: &str,
        vectors: Vec<Vec<f32>>,
        top_k: usize,
        expr: &str,
    ) -> VectorResult<Vec<Vec<RecordId>>> {
        self.runtime.block_on(
            self.orchestrator
                .search_filtered(collection_name, vectors, top_k, expr),
        )
    }

    /// Partitioned search, waiting at most the configured search timeout
    pub fn search_partitioned(
        &self,
        collection_name: &str,
        vectors: Vec<Vec<f32>>,
        partition_names: Vec<String>,
        top_k: usize,
    ) -> VectorResult<Vec<Vec<RecordId>>> {
        let timeout = self.orchestrator.config().search_timeout;
        self.runtime.block_on(async {
            self.orchestrator
                .search_async(collection_name, vectors, partition_names, top_k)?
                .wait(timeout)
                .await
        })
    }

    pub fn search_text(
        &self,
        collection_name: &str,
        text: &str,
        top_k: usize,
    ) -> VectorResult<Vec<Hit>> {
        self.runtime
            .block_on(self.orchestrator.search_text(collection_name, text, top_k))
    }

    pub fn search_documents(&self, vectors: Vec<Vec<f32>>) -> VectorResult<Vec<DocumentHit>> {
        self.runtime
            .block_on(self.orchestrator.search_documents(vectors))
    }
}
