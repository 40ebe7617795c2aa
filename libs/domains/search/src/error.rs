use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum VectorError {
    /// Missing or malformed argument, raised before any backend call
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),

    /// Transport-level failure talking to the index backend
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend answered but reported a non-success status
    #[error("Backend {operation} failed (code {code}): {reason}")]
    BackendQueryFailure {
        operation: String,
        code: i32,
        reason: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Search was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type VectorResult<T> = Result<T, VectorError>;

impl VectorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        VectorError::Validation(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        VectorError::Decode(msg.into())
    }

    /// Stable machine-readable error kind, used in responses and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            VectorError::Validation(_) => "validation",
            VectorError::Embedding(_) => "embedding",
            VectorError::CollectionAlreadyExists(_) => "collection_exists",
            VectorError::BackendUnavailable(_) => "backend_unavailable",
            VectorError::BackendQueryFailure { .. } => "backend_failure",
            VectorError::Decode(_) => "decode",
            VectorError::Timeout(_) => "timeout",
            VectorError::Cancelled => "cancelled",
            VectorError::Config(_) => "config",
            VectorError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            VectorError::Validation(_) => StatusCode::BAD_REQUEST,
            VectorError::CollectionAlreadyExists(_) => StatusCode::CONFLICT,
            VectorError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VectorError::BackendQueryFailure { .. } | VectorError::Embedding(_) => {
                StatusCode::BAD_GATEWAY
            }
            VectorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            VectorError::Decode(_)
            | VectorError::Cancelled
            | VectorError::Config(_)
            | VectorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for VectorError {
    fn from(err: serde_json::Error) -> Self {
        VectorError::Decode(format!("JSON error: {}", err))
    }
}

impl From<core_config::ConfigError> for VectorError {
    fn from(err: core_config::ConfigError) -> Self {
        VectorError::Config(err.to_string())
    }
}

/// JSON error body returned by the gateway handlers
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for VectorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }

        let body = ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            VectorError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            VectorError::CollectionAlreadyExists("c".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            VectorError::BackendUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            VectorError::Timeout(Duration::from_secs(1)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_backend_failure_message() {
        let err = VectorError::BackendQueryFailure {
            operation: "search".to_string(),
            code: 1100,
            reason: "bad field".to_string(),
        };
        assert_eq!(err.to_string(), "Backend search failed (code 1100): bad field");
        assert_eq!(err.kind(), "backend_failure");
    }
}
