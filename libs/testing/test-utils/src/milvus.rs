//! Fake Milvus REST v2 server
//!
//! Serves every `/v2/vectordb/...` endpoint from an in-process axum server,
//! records each request body and answers with scripted responses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

#[derive(Default)]
struct Script {
    responses: HashMap<String, Value>,
    requests: Vec<(String, Value)>,
}

type Shared = Arc<Mutex<Script>>;

/// Fake Milvus endpoint bound to an ephemeral local port
///
/// Unscripted paths answer `{"code": 0, "data": {}}`. The server stops when
/// this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use test_utils::TestMilvus;
///
/// # async fn example() {
/// let milvus = TestMilvus::start().await;
/// milvus.respond("collections/describe", json!({"code": 100, "message": "collection not found"}));
///
/// // point a client at milvus.url() ...
///
/// assert_eq!(milvus.requests("collections/describe").len(), 0);
/// # }
/// ```
pub struct TestMilvus {
    addr: SocketAddr,
    script: Shared,
    server: JoinHandle<()>,
}

impl TestMilvus {
    pub async fn start() -> Self {
        let script: Shared = Arc::default();
        let app = Router::new()
            .route("/v2/vectordb/{*path}", post(handle))
            .with_state(Arc::clone(&script));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake Milvus listener");
        let addr = listener
            .local_addr()
            .expect("Failed to read fake Milvus address");

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Fake Milvus server stopped");
            }
        });

        tracing::info!(%addr, "Test Milvus ready");
        Self {
            addr,
            script,
            server,
        }
    }

    /// Base URL to configure a client with
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer every later request to `path` (e.g. `entities/search`) with `body`
    pub fn respond(&self, path: &str, body: Value) {
        self.script
            .lock()
            .expect("fake Milvus script poisoned")
            .responses
            .insert(path.to_string(), body);
    }

    /// Request bodies received on `path`, in arrival order
    pub fn requests(&self, path: &str) -> Vec<Value> {
        self.script
            .lock()
            .expect("fake Milvus script poisoned")
            .requests
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Every path hit so far, in arrival order
    pub fn paths(&self) -> Vec<String> {
        self.script
            .lock()
            .expect("fake Milvus script poisoned")
            .requests
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }
}

impl Drop for TestMilvus {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    State(script): State<Shared>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut script = script.lock().expect("fake Milvus script poisoned");
    let response = script
        .responses
        .get(&path)
        .cloned()
        .unwrap_or_else(|| json!({"code": 0, "data": {}}));
    script.requests.push((path, body));
    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_scripts() {
        let milvus = TestMilvus::start().await;
        milvus.respond("collections/load", json!({"code": 0, "data": {"ok": true}}));
        milvus.respond("collections/release", json!({"code": 0, "data": {"ok": true}}));

        let reply = post_raw(&milvus, "collections/load", json!({"collectionName": "a"})).await;
        assert_eq!(reply, json!({"code": 0, "data": {"ok": true}}));
        assert_eq!(
            milvus.requests("collections/load"),
            vec![json!({"collectionName": "a"})]
        );
        assert_eq!(milvus.paths(), vec!["collections/load"]);
    }

    /// Minimal HTTP/1.1 POST over a raw socket
    async fn post_raw(milvus: &TestMilvus, path: &str, body: Value) -> Value {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let payload = body.to_string();
        let mut stream = tokio::net::TcpStream::connect(milvus.addr).await.unwrap();
        let request = format!(
            "POST /v2/vectordb/{} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            path,
            milvus.addr,
            payload.len(),
            payload
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        let (_, body) = response.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }
}
