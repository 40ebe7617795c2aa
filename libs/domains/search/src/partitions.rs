use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::backend::{DEFAULT_CALL_TIMEOUT, VectorBackend, bounded};
use crate::error::{VectorError, VectorResult};

/// Lists the partitions of a collection
pub struct PartitionDirectory<B: VectorBackend> {
    backend: Arc<B>,
    timeout: Duration,
}

impl<B: VectorBackend> PartitionDirectory<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Partition names in backend order, without sorting or dedup
    #[instrument(skip(self))]
    pub async fn list_partitions(&self, collection_name: &str) -> VectorResult<Vec<String>> {
        if collection_name.trim().is_empty() {
            return Err(VectorError::validation("collectionName is required"));
        }

        bounded(self.timeout, self.backend.show_partitions(collection_name))
            .await?
            .into_data("show_partitions")?
            .into_iter()
            .map(|raw| {
                String::from_utf8(raw).map_err(|e| {
                    VectorError::decode(format!("partition name is not valid UTF-8: {}", e))
                })
            })
            .collect()
    }
}
