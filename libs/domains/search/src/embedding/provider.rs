use async_trait::async_trait;

use crate::error::{VectorError, VectorResult};

/// Trait for embedding generation providers
///
/// `embed` returns exactly one vector per input text, in input order.
/// Deterministic for a fixed provider and model version.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, used in logs and metrics
    fn model_name(&self) -> String;

    async fn embed(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>>;
}

/// Reject empty batches and blank texts before any network call
pub fn validate_texts(texts: &[String]) -> VectorResult<()> {
    if texts.is_empty() {
        return Err(VectorError::Embedding("no texts to embed".to_string()));
    }
    if let Some(index) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(VectorError::Embedding(format!(
            "text at index {} is empty",
            index
        )));
    }
    Ok(())
}
