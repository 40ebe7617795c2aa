use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use domain_search::{
    CollectionManager, CollectionSpec, FieldSpec, GatewayState, InMemoryVectorBackend,
    SearchConfig,
};
use http_body_util::BodyExt;
use search_gateway::{API_BASE_PATH, build_app};
use serde_json::Value;
use tower::ServiceExt;

async fn app() -> Router {
    let backend = Arc::new(InMemoryVectorBackend::new());
    CollectionManager::new(Arc::clone(&backend))
        .create_collection(CollectionSpec::new(
            "docs",
            vec![FieldSpec::primary_key("id", true), FieldSpec::vector("document_content", 2)],
        ))
        .await
        .unwrap();
    build_app(GatewayState::new(backend, SearchConfig::default(), None))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get_json(app().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["name"], "search_gateway");
}

#[tokio::test]
async fn test_routes_nested_under_base_path() {
    let uri = format!("{}/partitions?collectionName=docs", API_BASE_PATH);
    let (status, body) = get_json(app().await, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!(["_default"]));

    let (status, _) = get_json(app().await, "/partitions?collectionName=docs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_document_lists_search_routes() {
    let (status, body) = get_json(app().await, "/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    for path in ["/search", "/searchWithFilter", "/searchAsync", "/partitions"] {
        assert!(paths.contains_key(path), "missing {}", path);
    }
}

#[tokio::test]
async fn test_text_search_without_provider_is_server_error() {
    let app = app().await;
    let request = Request::post(format!("{}/search", API_BASE_PATH))
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"collectionName":"docs","searchText":"hello","topK":1}"#,
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
