//! HTTP server initialization and lifecycle management
//!
//! This module handles all server setup:
//! - Tracing and metrics initialization
//! - Milvus client and optional embedding provider
//! - Router assembly (API, docs, health, metrics)
//! - Startup and graceful shutdown

use std::sync::Arc;

use axum::{Json, Router, middleware, routing::get};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_search::{
    EmbeddingProvider, GatewayState, MilvusBackend, OpenAIProvider, SearchApiDoc, VectorBackend,
};
use eyre::{Result, WrapErr};
use observability::{metrics_handler, metrics_middleware};
use serde_json::{Value, json};
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::GatewayConfig;
use crate::shutdown::shutdown_signal;

/// Prefix every search route is nested under
pub const API_BASE_PATH: &str = "/api/base/search/vectorSearch";

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Assemble the full application router around a gateway state
pub fn build_app<B: VectorBackend + 'static>(state: GatewayState<B>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", SearchApiDoc::openapi()))
        .nest(API_BASE_PATH, domain_search::router(state))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
}

/// Run the HTTP gateway
///
/// 1. Sets up error reports and structured logging (JSON for prod, pretty for dev)
/// 2. Installs the Prometheus recorder
/// 3. Creates the Milvus client and, when configured, the OpenAI embedder
/// 4. Serves until SIGINT/SIGTERM
pub async fn run() -> Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    let config = GatewayConfig::from_env().wrap_err("Failed to load gateway configuration")?;
    init_tracing(&config.environment);

    observability::init_metrics().wrap_err("Failed to install metrics recorder")?;

    info!(url = %config.milvus.url, "Configuring Milvus backend");
    let backend = Arc::new(
        MilvusBackend::new(config.milvus.clone()).wrap_err("Failed to create Milvus client")?,
    );

    let embedder: Option<Arc<dyn EmbeddingProvider>> = match OpenAIProvider::from_env() {
        Ok(provider) => {
            info!(model = %provider.model_name(), "OpenAI embedding provider configured");
            Some(Arc::new(provider))
        }
        Err(e) => {
            info!(reason = %e, "No embedding provider, text search and text inserts are disabled");
            None
        }
    };

    let app = build_app(GatewayState::new(backend, config.search.clone(), embedder));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", addr))?;
    info!("Search gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("HTTP server failed")?;

    info!("Search gateway shutdown complete");
    Ok(())
}
