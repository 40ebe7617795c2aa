//! Search orchestration: query shapes, dispatch, timeouts and decoding.
//!
//! Every shape builds its [`SearchQuery`] through the one validating factory
//! and runs through [`SearchOrchestrator::spawn_search`]. Awaiting the
//! returned [`SearchHandle`] is the synchronous form; handing it out is the
//! asynchronous one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use observability::SearchMetrics;
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, instrument};

use crate::backend::VectorBackend;
use crate::config::SearchConfig;
use crate::decode::{DocumentHit, OutputFields, decode_rows, split_hits};
use crate::embedding::{EmbeddingProvider, validate_texts};
use crate::error::{VectorError, VectorResult};
use crate::lifecycle::CollectionManager;
use crate::models::{ConsistencyLevel, Hit, RecordId, SearchResult};
use crate::query::{MAX_TOP_K, QueryParams, SearchQuery};

/// A dispatched search.
///
/// Resolves to the projected result. Dropping the handle or calling
/// [`SearchHandle::cancel`] aborts the backend work.
#[must_use = "dropping a search handle cancels the search"]
pub struct SearchHandle<T> {
    task: JoinHandle<VectorResult<T>>,
}

fn join_error(err: JoinError) -> VectorError {
    if err.is_cancelled() {
        VectorError::Cancelled
    } else {
        VectorError::Internal(format!("search task failed: {}", err))
    }
}

impl<T> SearchHandle<T> {
    /// Wait at most `timeout`; on expiry the search is aborted
    pub async fn wait(mut self, timeout: Duration) -> VectorResult<T> {
        match tokio::time::timeout(timeout, &mut self).await {
            Ok(result) => result,
            Err(_) => {
                self.task.abort();
                tracing::warn!(?timeout, "Search timed out, aborting");
                Err(VectorError::Timeout(timeout))
            }
        }
    }

    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Future for SearchHandle<T> {
    type Output = VectorResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|err| Err(join_error(err))))
    }
}

impl<T> Drop for SearchHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct SearchOrchestrator<B: VectorBackend + 'static> {
    backend: Arc<B>,
    lifecycle: CollectionManager<B>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: SearchConfig,
}

impl<B: VectorBackend + 'static> Clone for SearchOrchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            lifecycle: self.lifecycle.clone(),
            embedder: self.embedder.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B: VectorBackend + 'static> SearchOrchestrator<B> {
    pub fn new(backend: Arc<B>, config: SearchConfig) -> Self {
        Self {
            lifecycle: CollectionManager::with_timeout(
                Arc::clone(&backend),
                config.search_timeout,
            ),
            backend,
            embedder: None,
            config,
        }
    }

    /// Share load references with other users of the same manager
    pub fn with_lifecycle(mut self, lifecycle: CollectionManager<B>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &CollectionManager<B> {
        &self.lifecycle
    }

    fn params(
        &self,
        collection_name: &str,
        vector_field: &str,
        vectors: Vec<Vec<f32>>,
        top_k: usize,
    ) -> QueryParams {
        let mut params = QueryParams::new(collection_name, vector_field, vectors, top_k);
        params.metric = self.config.metric;
        params.nprobe = self.config.nprobe;
        params
    }

    /// Run `query` on a spawned task and project the per-query hits into `T`
    pub fn spawn_search<T, F>(
        &self,
        shape: &'static str,
        query: SearchQuery,
        project: F,
    ) -> VectorResult<SearchHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(SearchResult) -> VectorResult<T> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| VectorError::Internal("no async runtime available".to_string()))?;

        let backend = Arc::clone(&self.backend);
        let span = tracing::info_span!(
            "search",
            shape,
            collection = %query.collection_name(),
            top_k = query.top_k(),
            queries = query.num_queries(),
        );

        let task = runtime.spawn(
            async move {
                let started = Instant::now();
                let top_k = query.top_k();

                let outcome = async {
                    let raw = backend.search(query).await?.into_data("search")?;
                    let hits = split_hits(raw, top_k)?;
                    let total: usize = hits.queries.iter().map(Vec::len).sum();
                    project(hits).map(|value| (value, total))
                }
                .await;

                let seconds = started.elapsed().as_secs_f64();
                match outcome {
                    Ok((value, total)) => {
                        SearchMetrics::record_search(shape, "ok", total, seconds);
                        Ok(value)
                    }
                    Err(err) => {
                        SearchMetrics::record_search(shape, err.kind(), 0, seconds);
                        tracing::warn!(error = %err, "Search failed");
                        Err(err)
                    }
                }
            }
            .instrument(span),
        );

        Ok(SearchHandle { task })
    }

    /// Unfiltered top-K search; ranked ids per query vector
    #[instrument(skip(self, vectors), fields(queries = vectors.len()))]
    pub async fn search(
        &self,
        collection_name: &str,
        vectors: Vec<Vec<f32>>,
        top_k: usize,
    ) -> VectorResult<Vec<Vec<RecordId>>> {
        let query = SearchQuery::new(self.params(
            collection_name,
            &self.config.vector_field,
            vectors,
            top_k,
        ))?;
        self.spawn_search("unfiltered", query, |hits| Ok(hits.ids()))?
            .wait(self.config.search_timeout)
            .await
    }

    /// Top-K search constrained by a boolean scalar expression
    #[instrument(skip(self, vectors), fields(queries = vectors.len()))]
    pub async fn search_filtered(
        &self,
        collection_name: &str,
        vectors: Vec<Vec<f32>>,
        top_k: usize,
        expr: &str,
    ) -> VectorResult<Vec<Vec<RecordId>>> {
        if expr.trim().is_empty() {
            return Err(VectorError::validation("filter expression is required"));
        }

        let mut params = self.params(
            collection_name,
            &self.config.filtered_vector_field,
            vectors,
            top_k,
        );
        params.filter = Some(expr.to_string());
        let query = SearchQuery::new(params)?;

        self.spawn_search("filtered", query, |hits| Ok(hits.ids()))?
            .wait(self.config.search_timeout)
            .await
    }

    /// Partition-restricted search handed out as a handle. Validation errors
    /// are returned here, before anything is dispatched.
    pub fn search_async(
        &self,
        collection_name: &str,
        vectors: Vec<Vec<f32>>,
        partition_names: Vec<String>,
        top_k: usize,
    ) -> VectorResult<SearchHandle<Vec<Vec<RecordId>>>> {
        if partition_names.is_empty() {
            return Err(VectorError::validation("at least one partition is required"));
        }

        let mut params = self.params(collection_name, &self.config.vector_field, vectors, top_k);
        params.partition_names = partition_names;
        let query = SearchQuery::new(params)?;

        tracing::debug!(
            collection = collection_name,
            partitions = query.partition_names().len(),
            "Dispatching partitioned search"
        );
        self.spawn_search("partitioned", query, |hits| Ok(hits.ids()))
    }

    /// Embed `text` and run an unfiltered search; hits carry scores
    #[instrument(skip(self, text))]
    pub async fn search_text(
        &self,
        collection_name: &str,
        text: &str,
        top_k: usize,
    ) -> VectorResult<Vec<Hit>> {
        if collection_name.trim().is_empty() {
            return Err(VectorError::validation("collectionName is required"));
        }
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(VectorError::validation(format!(
                "topK must be between 1 and {}",
                MAX_TOP_K
            )));
        }
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| VectorError::Config("no embedding provider configured".to_string()))?;

        let texts = vec![text.to_string()];
        validate_texts(&texts)?;
        let embedded = embedder.embed(&texts).await;
        SearchMetrics::record_embedding(
            &embedder.model_name(),
            if embedded.is_ok() { "ok" } else { "error" },
            texts.len(),
        );
        let vectors = embedded?;
        if vectors.len() != 1 {
            return Err(VectorError::Embedding(format!(
                "expected 1 embedding, got {}",
                vectors.len()
            )));
        }

        let query = SearchQuery::new(self.params(
            collection_name,
            &self.config.vector_field,
            vectors,
            top_k,
        ))?;
        self.spawn_search("text", query, |hits| {
            Ok(hits.queries.into_iter().next().unwrap_or_default())
        })?
        .wait(self.config.search_timeout)
        .await
    }

    /// Load, search with strong consistency, decode into `T`, release.
    ///
    /// The release runs exactly once whether the search succeeds, fails to
    /// decode, times out or returns nothing.
    pub async fn search_decoded<T: OutputFields>(
        &self,
        collection_name: &str,
        vector_field: &str,
        vectors: Vec<Vec<f32>>,
        top_k: usize,
    ) -> VectorResult<Vec<Vec<T>>> {
        let mut params = self.params(collection_name, vector_field, vectors, top_k);
        params.output_fields = T::output_fields();
        params.consistency = Some(ConsistencyLevel::Strong);
        let query = SearchQuery::new(params)?;

        self.lifecycle
            .with_loaded(collection_name, move || async move {
                self.spawn_search("decoded", query, decode_rows::<T>)?
                    .wait(self.config.search_timeout)
                    .await
            })
            .await
    }

    /// Decoded search over the document collection. Hits of all query
    /// vectors are returned in query order; no hits is an empty list.
    #[instrument(skip(self, vectors), fields(queries = vectors.len()))]
    pub async fn search_documents(&self, vectors: Vec<Vec<f32>>) -> VectorResult<Vec<DocumentHit>> {
        let documents = &self.config.documents;
        let hits = self
            .search_decoded::<DocumentHit>(
                &documents.collection_name,
                &documents.vector_field,
                vectors,
                documents.top_k,
            )
            .await?;
        Ok(hits.into_iter().flatten().collect())
    }
}
