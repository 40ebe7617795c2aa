mod openai;
mod provider;

pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::{EmbeddingProvider, validate_texts};

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
