use std::time::Duration;

use core_config::{ConfigError, FromEnv, env_or_default, env_parse};

use crate::models::MetricType;
use crate::query::DEFAULT_NPROBE;

/// The well-known document collection searched by `search_documents`
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentCollectionConfig {
    pub collection_name: String,
    pub vector_field: String,
    pub content_field: String,
    pub word_count_field: String,
    pub top_k: usize,
}

impl Default for DocumentCollectionConfig {
    fn default() -> Self {
        Self {
            collection_name: "pdf_data".to_string(),
            vector_field: "content_vector".to_string(),
            content_field: "content".to_string(),
            word_count_field: "content_word_count".to_string(),
            top_k: 4,
        }
    }
}

impl FromEnv for DocumentCollectionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            collection_name: env_or_default("DOCUMENTS_COLLECTION", &defaults.collection_name),
            vector_field: env_or_default("DOCUMENTS_VECTOR_FIELD", &defaults.vector_field),
            content_field: env_or_default("DOCUMENTS_CONTENT_FIELD", &defaults.content_field),
            word_count_field: env_or_default(
                "DOCUMENTS_WORD_COUNT_FIELD",
                &defaults.word_count_field,
            ),
            top_k: env_parse("DOCUMENTS_TOP_K", defaults.top_k)?,
        })
    }
}

/// Search and mutation tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Search breadth passed to the index, never derived from the vector size
    pub nprobe: u32,
    pub metric: MetricType,
    pub search_timeout: Duration,
    pub mutation_timeout: Duration,
    /// Vector field used by unfiltered and partitioned searches
    pub vector_field: String,
    /// Vector field used by filtered searches
    pub filtered_vector_field: String,
    pub documents: DocumentCollectionConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            nprobe: DEFAULT_NPROBE,
            metric: MetricType::IP,
            search_timeout: Duration::from_secs(30),
            mutation_timeout: Duration::from_secs(60),
            vector_field: "document_content".to_string(),
            filtered_vector_field: "embedding".to_string(),
            documents: DocumentCollectionConfig::default(),
        }
    }
}

impl FromEnv for SearchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let nprobe = env_parse("SEARCH_NPROBE", defaults.nprobe)?;
        if nprobe == 0 {
            return Err(ConfigError::ParseError {
                key: "SEARCH_NPROBE".to_string(),
                details: "must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            nprobe,
            metric: env_parse("SEARCH_METRIC_TYPE", defaults.metric)?,
            search_timeout: Duration::from_secs(env_parse("SEARCH_TIMEOUT_SECS", 30u64)?),
            mutation_timeout: Duration::from_secs(env_parse("MUTATION_TIMEOUT_SECS", 60u64)?),
            vector_field: env_or_default("SEARCH_VECTOR_FIELD", &defaults.vector_field),
            filtered_vector_field: env_or_default(
                "SEARCH_FILTERED_VECTOR_FIELD",
                &defaults.filtered_vector_field,
            ),
            documents: DocumentCollectionConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 11] = [
        "SEARCH_NPROBE",
        "SEARCH_METRIC_TYPE",
        "SEARCH_TIMEOUT_SECS",
        "MUTATION_TIMEOUT_SECS",
        "SEARCH_VECTOR_FIELD",
        "SEARCH_FILTERED_VECTOR_FIELD",
        "DOCUMENTS_COLLECTION",
        "DOCUMENTS_VECTOR_FIELD",
        "DOCUMENTS_CONTENT_FIELD",
        "DOCUMENTS_WORD_COUNT_FIELD",
        "DOCUMENTS_TOP_K",
    ];

    #[test]
    fn test_defaults_when_unset() {
        temp_env::with_vars_unset(VARS, || {
            let config = SearchConfig::from_env().unwrap();
            assert_eq!(config, SearchConfig::default());
            assert_eq!(config.nprobe, 10);
            assert_eq!(config.documents.collection_name, "pdf_data");
            assert_eq!(config.documents.top_k, 4);
        });
    }

    #[test]
    fn test_overrides() {
        temp_env::with_vars(
            [
                ("SEARCH_NPROBE", Some("64")),
                ("SEARCH_METRIC_TYPE", Some("cosine")),
                ("SEARCH_TIMEOUT_SECS", Some("5")),
                ("DOCUMENTS_COLLECTION", Some("manuals")),
            ],
            || {
                let config = SearchConfig::from_env().unwrap();
                assert_eq!(config.nprobe, 64);
                assert_eq!(config.metric, MetricType::Cosine);
                assert_eq!(config.search_timeout, Duration::from_secs(5));
                assert_eq!(config.documents.collection_name, "manuals");
            },
        );
    }

    #[test]
    fn test_invalid_values() {
        temp_env::with_var("SEARCH_NPROBE", Some("0"), || {
            assert!(SearchConfig::from_env().is_err());
        });
        temp_env::with_var("SEARCH_METRIC_TYPE", Some("hamming"), || {
            let err = SearchConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("SEARCH_METRIC_TYPE"));
        });
    }
}
