//! Observability utilities for the vector search gateway.
//!
//! This crate provides:
//! - Prometheus metrics recording and export
//! - Search, mutation and load metrics
//! - Axum middleware for automatic request metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, SearchMetrics};
//!
//! init_metrics()?;
//!
//! SearchMetrics::record_search("filtered", "ok", 3, 0.012);
//!
//! let app = Router::new()
//!     .route("/metrics", get(metrics_handler));
//! ```

pub mod middleware;
pub mod search;

pub use middleware::metrics_middleware;
pub use search::SearchMetrics;

pub use metrics::{counter, gauge, histogram};
pub use metrics_exporter_prometheus::BuildError;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder once; later calls return the same handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();
        Ok(handle)
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for /metrics endpoint
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // HTTP metrics
    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    // Search metrics
    describe_counter!(
        "vector_searches_total",
        "Vector searches by shape and outcome"
    );
    describe_histogram!(
        "vector_search_duration_seconds",
        "Vector search duration in seconds, including decoding"
    );
    describe_histogram!(
        "vector_search_hits",
        "Hits returned per search, summed over query vectors"
    );

    // Mutation metrics
    describe_counter!(
        "vector_mutations_total",
        "Insert and delete calls by operation and outcome"
    );
    describe_counter!(
        "vector_records_mutated_total",
        "Records inserted or deleted"
    );

    // Lifecycle metrics
    describe_gauge!(
        "vector_collection_active_loads",
        "Outstanding load references per collection"
    );
    describe_counter!(
        "vector_collection_loads_total",
        "Physical load and release calls by collection"
    );

    // Embedding metrics
    describe_counter!(
        "embedding_requests_total",
        "Embedding requests by model and outcome"
    );
    describe_histogram!(
        "embedding_texts",
        "Texts per embedding request"
    );
}
