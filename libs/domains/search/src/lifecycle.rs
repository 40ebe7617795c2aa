use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use observability::SearchMetrics;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::backend::{DEFAULT_CALL_TIMEOUT, StatusCode, VectorBackend, bounded};
use crate::error::{VectorError, VectorResult};
use crate::models::CollectionSpec;

/// Load reference count of one collection
type LoadSlot = Arc<Mutex<usize>>;

/// Per-collection load references shared by every manager clone and guard.
/// Each collection has its own slot, so a slow load only holds up callers of
/// that collection.
struct LoadTracker<B: VectorBackend> {
    backend: Arc<B>,
    timeout: Duration,
    slots: Mutex<HashMap<String, LoadSlot>>,
}

impl<B: VectorBackend + 'static> LoadTracker<B> {
    async fn slot(&self, collection_name: &str) -> LoadSlot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(collection_name.to_string()).or_default())
    }

    /// Physical load only on the 0 -> 1 transition. A failed or timed out
    /// load leaves the count unchanged.
    async fn load(&self, collection_name: &str) -> VectorResult<usize> {
        let slot = self.slot(collection_name).await;
        let mut count = slot.lock().await;

        if *count == 0 {
            bounded(self.timeout, self.backend.load_collection(collection_name))
                .await?
                .check("load_collection")?;
            SearchMetrics::record_physical_load(collection_name, "load");
            tracing::debug!(collection = collection_name, "Collection loaded");
        }

        *count += 1;
        SearchMetrics::set_active_loads(collection_name, *count);
        Ok(*count)
    }

    /// Physical release only on the 1 -> 0 transition. The reference is
    /// dropped even when the physical release fails. The slot stays locked
    /// until the backend answers, so a concurrent load waits for it.
    async fn release(&self, collection_name: &str) -> VectorResult<usize> {
        let slot = self.slot(collection_name).await;
        let mut count = slot.lock().await;
        if *count == 0 {
            return Err(VectorError::validation(format!(
                "collection {} has no outstanding load",
                collection_name
            )));
        }

        *count -= 1;
        SearchMetrics::set_active_loads(collection_name, *count);
        if *count > 0 {
            return Ok(*count);
        }

        bounded(self.timeout, self.backend.release_collection(collection_name))
            .await?
            .check("release_collection")?;
        SearchMetrics::record_physical_load(collection_name, "release");
        tracing::debug!(collection = collection_name, "Collection released");
        Ok(0)
    }

    /// Run the release on its own task. Dropping the caller's future after
    /// this point cannot lose the decrement or the physical release.
    fn spawn_release(self: &Arc<Self>, collection_name: String) -> JoinHandle<VectorResult<usize>> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move { tracker.release(&collection_name).await })
    }

    async fn current(&self, collection_name: &str) -> usize {
        let slot = self.slots.lock().await.get(collection_name).map(Arc::clone);
        match slot {
            Some(slot) => *slot.lock().await,
            None => 0,
        }
    }
}

async fn join_release(task: JoinHandle<VectorResult<usize>>) -> VectorResult<()> {
    task.await
        .map_err(|e| VectorError::Internal(format!("release task failed: {}", e)))?
        .map(|_| ())
}

/// Collection lifecycle: creation, description, partitions and
/// reference-counted load/release.
pub struct CollectionManager<B: VectorBackend> {
    tracker: Arc<LoadTracker<B>>,
}

impl<B: VectorBackend> Clone for CollectionManager<B> {
    fn clone(&self) -> Self {
        Self {
            tracker: Arc::clone(&self.tracker),
        }
    }
}

fn require_name(value: &str, what: &str) -> VectorResult<()> {
    if value.trim().is_empty() {
        return Err(VectorError::validation(format!("{} is required", what)));
    }
    Ok(())
}

impl<B: VectorBackend + 'static> CollectionManager<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_timeout(backend, DEFAULT_CALL_TIMEOUT)
    }

    /// Every backend call, physical loads and releases included, is bounded by `timeout`
    pub fn with_timeout(backend: Arc<B>, timeout: Duration) -> Self {
        Self {
            tracker: Arc::new(LoadTracker {
                backend,
                timeout,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.tracker.backend
    }

    /// Not idempotent: an existing name is `CollectionAlreadyExists`
    #[instrument(skip(self, spec), fields(collection = %spec.name))]
    pub async fn create_collection(&self, spec: CollectionSpec) -> VectorResult<()> {
        spec.validate()?;

        let name = spec.name.clone();
        let status = bounded(self.tracker.timeout, self.tracker.backend.create_collection(spec))
            .await?;
        if status.code == StatusCode::CollectionAlreadyExists {
            return Err(VectorError::CollectionAlreadyExists(name));
        }
        status.check("create_collection")?;

        tracing::info!("Collection created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn describe_collection(&self, collection_name: &str) -> VectorResult<CollectionSpec> {
        require_name(collection_name, "collectionName")?;
        bounded(
            self.tracker.timeout,
            self.tracker.backend.describe_collection(collection_name),
        )
        .await?
        .into_data("describe_collection")
    }

    #[instrument(skip(self))]
    pub async fn create_partition(
        &self,
        collection_name: &str,
        partition_name: &str,
    ) -> VectorResult<()> {
        require_name(collection_name, "collectionName")?;
        require_name(partition_name, "partitionName")?;
        bounded(
            self.tracker.timeout,
            self.tracker.backend.create_partition(collection_name, partition_name),
        )
        .await?
        .check("create_partition")
    }

    /// Take a load reference without a guard; pair with [`Self::release_collection`]
    #[instrument(skip(self))]
    pub async fn load_collection(&self, collection_name: &str) -> VectorResult<()> {
        require_name(collection_name, "collectionName")?;
        self.tracker.load(collection_name).await.map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn release_collection(&self, collection_name: &str) -> VectorResult<()> {
        require_name(collection_name, "collectionName")?;
        join_release(self.tracker.spawn_release(collection_name.to_string())).await
    }

    /// Take a load reference held by the returned guard
    pub async fn acquire(&self, collection_name: &str) -> VectorResult<LoadGuard<B>> {
        require_name(collection_name, "collectionName")?;
        self.tracker.load(collection_name).await?;
        Ok(LoadGuard {
            tracker: Arc::clone(&self.tracker),
            collection_name: collection_name.to_string(),
            released: false,
        })
    }

    /// Run `body` with the collection loaded and release it afterwards, on
    /// success and on failure. The body's error wins over a release error.
    pub async fn with_loaded<T, F, Fut>(&self, collection_name: &str, body: F) -> VectorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = VectorResult<T>>,
    {
        let guard = self.acquire(collection_name).await?;
        let result = body().await;
        let released = guard.release().await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                tracing::warn!(
                    collection = collection_name,
                    error = %release_err,
                    "Release failed after a failed operation"
                );
                Err(err)
            }
        }
    }

    pub async fn active_loads(&self, collection_name: &str) -> usize {
        self.tracker.current(collection_name).await
    }
}

/// A load reference. Release it with [`LoadGuard::release`]; a guard dropped
/// without release (panic, cancelled task) schedules the release on the
/// current runtime.
#[must_use = "dropping the guard releases the collection in the background"]
pub struct LoadGuard<B: VectorBackend + 'static> {
    tracker: Arc<LoadTracker<B>>,
    collection_name: String,
    released: bool,
}

impl<B: VectorBackend + 'static> LoadGuard<B> {
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// The release runs on its own task, so it completes even if this
    /// future is dropped before it resolves.
    pub async fn release(mut self) -> VectorResult<()> {
        self.released = true;
        let task = self.tracker.spawn_release(self.collection_name.clone());
        join_release(task).await
    }
}

impl<B: VectorBackend + 'static> Drop for LoadGuard<B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let tracker = Arc::clone(&self.tracker);
        let collection_name = std::mem::take(&mut self.collection_name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = tracker.release(&collection_name).await {
                        tracing::warn!(
                            collection = %collection_name,
                            error = %err,
                            "Deferred release failed"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    collection = %collection_name,
                    "Load guard dropped outside a runtime, release skipped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockVectorBackend, Status};
    use crate::memory::InMemoryVectorBackend;
    use crate::memory::delayed::DelayedBackend;
    use crate::models::FieldSpec;

    fn spec(name: &str) -> CollectionSpec {
        CollectionSpec::new(
            name,
            vec![FieldSpec::primary_key("id", true), FieldSpec::vector("embedding", 2)],
        )
    }

    #[tokio::test]
    async fn test_invalid_spec_never_reaches_backend() {
        let manager = CollectionManager::new(Arc::new(MockVectorBackend::new()));
        let err = manager
            .create_collection(CollectionSpec::new("docs", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_describe_returns_created_schema() {
        let manager = CollectionManager::new(Arc::new(InMemoryVectorBackend::new()));
        manager.create_collection(spec("docs")).await.unwrap();

        let described = manager.describe_collection("docs").await.unwrap();
        assert_eq!(described, spec("docs"));

        let err = manager.describe_collection("missing").await.unwrap_err();
        assert!(matches!(err, VectorError::BackendQueryFailure { .. }));
    }

    #[tokio::test]
    async fn test_existing_collection_is_conflict() {
        let mut backend = MockVectorBackend::new();
        backend.expect_create_collection().times(1).returning(|_| {
            Ok(Status::error(StatusCode::CollectionAlreadyExists, "exists"))
        });
        let manager = CollectionManager::new(Arc::new(backend));

        let err = manager.create_collection(spec("docs")).await.unwrap_err();
        assert!(matches!(err, VectorError::CollectionAlreadyExists(name) if name == "docs"));
    }

    #[tokio::test]
    async fn test_physical_load_and_release_happen_once() {
        let mut backend = MockVectorBackend::new();
        backend
            .expect_load_collection()
            .times(1)
            .returning(|_| Ok(Status::success()));
        backend
            .expect_release_collection()
            .times(1)
            .returning(|_| Ok(Status::success()));
        let manager = CollectionManager::new(Arc::new(backend));

        manager.load_collection("docs").await.unwrap();
        manager.load_collection("docs").await.unwrap();
        assert_eq!(manager.active_loads("docs").await, 2);

        manager.release_collection("docs").await.unwrap();
        manager.release_collection("docs").await.unwrap();
        assert_eq!(manager.active_loads("docs").await, 0);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_count_unchanged() {
        let mut backend = MockVectorBackend::new();
        backend
            .expect_load_collection()
            .times(1)
            .returning(|_| Ok(Status::error(StatusCode::CollectionNotFound, "missing")));
        let manager = CollectionManager::new(Arc::new(backend));

        let err = manager.load_collection("docs").await.unwrap_err();
        assert!(matches!(err, VectorError::BackendQueryFailure { .. }));
        assert_eq!(manager.active_loads("docs").await, 0);
    }

    #[tokio::test]
    async fn test_release_without_load_is_rejected() {
        let manager = CollectionManager::new(Arc::new(MockVectorBackend::new()));
        let err = manager.release_collection("docs").await.unwrap_err();
        assert!(matches!(err, VectorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_with_loaded_releases_on_body_error() {
        let mut backend = MockVectorBackend::new();
        backend
            .expect_load_collection()
            .times(1)
            .returning(|_| Ok(Status::success()));
        backend
            .expect_release_collection()
            .times(1)
            .returning(|_| Ok(Status::success()));
        let manager = CollectionManager::new(Arc::new(backend));

        let result: VectorResult<()> = manager
            .with_loaded("docs", || async { Err(VectorError::decode("bad row")) })
            .await;
        assert!(matches!(result, Err(VectorError::Decode(_))));
        assert_eq!(manager.active_loads("docs").await, 0);
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_in_background() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        backend.create_collection(spec("docs")).await.unwrap();
        let manager = CollectionManager::new(Arc::clone(&backend));

        let guard = manager.acquire("docs").await.unwrap();
        assert!(backend.is_loaded("docs").await);
        drop(guard);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.release_count(), 1);
        assert_eq!(manager.active_loads("docs").await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_share_one_load() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        backend.create_collection(spec("docs")).await.unwrap();
        let manager = CollectionManager::new(Arc::clone(&backend));

        let guards = futures::future::try_join_all((0..8).map(|_| manager.acquire("docs")))
            .await
            .unwrap();
        assert_eq!(backend.load_count(), 1);
        assert_eq!(manager.active_loads("docs").await, 8);

        for guard in guards {
            guard.release().await.unwrap();
        }
        assert_eq!(backend.release_count(), 1);
        assert!(!backend.is_loaded("docs").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_release_still_releases() {
        let backend = Arc::new(DelayedBackend::new(&[("docs", Duration::from_millis(200))]));
        backend.create_collection(spec("docs")).await.unwrap();
        let manager = CollectionManager::new(Arc::clone(&backend));

        let guard = manager.acquire("docs").await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(10), guard.release()).await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(backend.inner.release_count(), 1);
        assert!(!backend.inner.is_loaded("docs").await);
        assert_eq!(manager.active_loads("docs").await, 0);

        // the next acquire is a fresh physical load, not a stale reference
        let guard = manager.acquire("docs").await.unwrap();
        assert_eq!(backend.inner.load_count(), 2);
        guard.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_load_does_not_block_other_collections() {
        let backend = Arc::new(DelayedBackend::new(&[("slow", Duration::from_secs(3600))]));
        backend.create_collection(spec("slow")).await.unwrap();
        backend.create_collection(spec("fast")).await.unwrap();
        let manager = CollectionManager::new(Arc::clone(&backend));

        let slow = tokio::spawn({
            let manager = manager.clone();
            async move { manager.acquire("slow").await.map(|_| ()) }
        });
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(Duration::from_secs(1), manager.acquire("fast"))
            .await
            .expect("fast collection waited on the slow one")
            .unwrap();
        assert_eq!(manager.active_loads("fast").await, 1);
        fast.release().await.unwrap();
        slow.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_load_times_out_and_keeps_count() {
        let backend = Arc::new(DelayedBackend::new(&[("docs", Duration::from_secs(3600))]));
        backend.create_collection(spec("docs")).await.unwrap();
        let manager = CollectionManager::with_timeout(Arc::clone(&backend), Duration::from_secs(5));

        let err = manager.load_collection("docs").await.unwrap_err();
        assert!(matches!(err, VectorError::Timeout(t) if t == Duration::from_secs(5)));
        assert_eq!(manager.active_loads("docs").await, 0);
    }
}
