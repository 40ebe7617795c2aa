use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{VectorError, VectorResult};
use crate::models::{CollectionSpec, FieldColumn, RecordId};
use crate::query::SearchQuery;

/// Per-call bound used when a service is built without a configured timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound a backend call by `timeout`; expiry is `Timeout`
pub(crate) async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = VectorResult<T>>,
) -> VectorResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| VectorError::Timeout(timeout))?
}

/// Outcome code reported by the index engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    CollectionAlreadyExists,
    CollectionNotFound,
    CollectionNotLoaded,
    PartitionNotFound,
    IllegalArgument,
    Unexpected(i32),
}

impl StatusCode {
    pub fn as_i32(&self) -> i32 {
        match self {
            StatusCode::Success => 0,
            StatusCode::CollectionAlreadyExists => 1,
            StatusCode::CollectionNotFound => 100,
            StatusCode::CollectionNotLoaded => 101,
            StatusCode::PartitionNotFound => 200,
            StatusCode::IllegalArgument => 1100,
            StatusCode::Unexpected(code) => *code,
        }
    }
}

/// Engine-reported status of a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub reason: String,
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            reason: String::new(),
        }
    }

    pub fn error(code: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    /// Turn a non-success status into a `BackendQueryFailure`
    pub fn check(self, operation: &str) -> VectorResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(VectorError::BackendQueryFailure {
                operation: operation.to_string(),
                code: self.code.as_i32(),
                reason: self.reason,
            })
        }
    }
}

/// Status plus the payload of a successful call
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub status: Status,
    pub data: Option<T>,
}

impl<T> Reply<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: Status::success(),
            data: Some(data),
        }
    }

    pub fn failed(status: Status) -> Self {
        Self { status, data: None }
    }

    /// Payload of a successful reply; a success without payload is a decode error
    pub fn into_data(self, operation: &str) -> VectorResult<T> {
        self.status.check(operation)?;
        self.data
            .ok_or_else(|| VectorError::decode(format!("{} reply carried no data", operation)))
    }
}

/// Insert request, columnar
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    pub collection_name: String,
    pub partition_name: Option<String>,
    pub fields: Vec<FieldColumn>,
}

/// Engine-native search output.
///
/// Hits of all queries are flattened into `ids`/`scores`; `topks[i]` is the
/// number of hits that belong to query `i`. Every output column is aligned
/// with `ids`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSearchResults {
    pub num_queries: usize,
    pub topks: Vec<usize>,
    pub ids: Vec<RecordId>,
    pub scores: Vec<f32>,
    pub fields_data: Vec<FieldColumn>,
}

impl RawSearchResults {
    pub fn has_results(&self) -> bool {
        !self.ids.is_empty()
    }
}

/// Vector index engine.
///
/// `Err` means the engine could not be reached (`BackendUnavailable`) or its
/// answer could not be read (`Decode`). Outcomes the engine itself reports,
/// successful or not, come back as a [`Status`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn create_collection(&self, spec: CollectionSpec) -> VectorResult<Status>;

    async fn describe_collection(&self, collection_name: &str)
    -> VectorResult<Reply<CollectionSpec>>;

    async fn create_partition(
        &self,
        collection_name: &str,
        partition_name: &str,
    ) -> VectorResult<Status>;

    /// Make the collection searchable
    async fn load_collection(&self, collection_name: &str) -> VectorResult<Status>;

    async fn release_collection(&self, collection_name: &str) -> VectorResult<Status>;

    /// Returns the ids of the inserted rows
    async fn insert(&self, request: InsertRequest) -> VectorResult<Reply<Vec<RecordId>>>;

    /// Returns the number of deleted rows
    async fn delete(&self, collection_name: &str, expr: &str) -> VectorResult<Reply<u64>>;

    async fn search(&self, query: SearchQuery) -> VectorResult<Reply<RawSearchResults>>;

    /// Partition names, byte-encoded as the engine stores them
    async fn show_partitions(&self, collection_name: &str) -> VectorResult<Reply<Vec<Vec<u8>>>>;
}
