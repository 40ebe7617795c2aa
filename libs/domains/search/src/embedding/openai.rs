use std::time::Duration;

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EmbeddingProvider, validate_texts};
use crate::error::{VectorError, VectorResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// OpenAI embedding provider configuration
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: Option<u32>,
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: None,
            timeout_secs: 30,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

impl FromEnv for OpenAIConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let dimensions = match env_optional("OPENAI_EMBEDDING_DIMENSIONS") {
            Some(_) => Some(env_parse("OPENAI_EMBEDDING_DIMENSIONS", 0u32)?),
            None => None,
        };

        Ok(Self {
            api_key: env_required("OPENAI_API_KEY")?,
            base_url: env_or_default("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            model: env_or_default("OPENAI_EMBEDDING_MODEL", DEFAULT_MODEL),
            dimensions,
            timeout_secs: env_parse("OPENAI_TIMEOUT_SECS", 30u64)?,
        })
    }
}

/// OpenAI embeddings provider
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> VectorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> VectorResult<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> String {
        self.config.model.clone()
    }

    #[tracing::instrument(skip(self, texts), fields(model = %self.config.model, count = texts.len()))]
    async fn embed(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>> {
        validate_texts(texts)?;

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VectorError::Embedding(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VectorError::Embedding(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| VectorError::Embedding(format!("Invalid OpenAI response: {}", e)))?;

        let mut data = embedding_response.data;
        if data.len() != texts.len() {
            return Err(VectorError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        // Sort by index to maintain order
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::{Value, json};

    async fn serve(reply: Value) -> String {
        let app = Router::new().route(
            "/embeddings",
            post(move |Json(_body): Json<Value>| {
                let reply = reply.clone();
                async move { Json(reply) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: String) -> OpenAIProvider {
        OpenAIProvider::new(OpenAIConfig::new("test-key".to_string()).with_base_url(base_url))
            .unwrap()
    }

    #[tokio::test]
    async fn test_embed_reorders_by_index() {
        let base_url = serve(json!({
            "data": [
                {"embedding": [0.0, 1.0], "index": 1},
                {"embedding": [1.0, 0.0], "index": 0}
            ]
        }))
        .await;

        let vectors = provider(base_url)
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_fails() {
        let base_url = serve(json!({"data": [{"embedding": [1.0], "index": 0}]})).await;

        let err = provider(base_url)
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_blank_text_rejected_before_request() {
        let err = provider("http://127.0.0.1:9".to_string())
            .embed(&["  ".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Embedding(msg) if msg.contains("empty")));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_embedding_error() {
        let err = provider("http://127.0.0.1:9".to_string())
            .embed(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Embedding(_)));
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("sk-test")),
                ("OPENAI_BASE_URL", None),
                ("OPENAI_EMBEDDING_MODEL", Some("text-embedding-3-large")),
                ("OPENAI_EMBEDDING_DIMENSIONS", Some("256")),
                ("OPENAI_TIMEOUT_SECS", None),
            ],
            || {
                let config = OpenAIConfig::from_env().unwrap();
                assert_eq!(config.base_url, DEFAULT_BASE_URL);
                assert_eq!(config.model, "text-embedding-3-large");
                assert_eq!(config.dimensions, Some(256));
            },
        );

        temp_env::with_var_unset("OPENAI_API_KEY", || {
            assert!(OpenAIConfig::from_env().is_err());
        });
    }
}
