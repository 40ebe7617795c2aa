use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse};

use crate::models::MetricType;

const DEFAULT_URL: &str = "http://localhost:19530";

/// Milvus connection configuration
#[derive(Debug, Clone)]
pub struct MilvusConfig {
    pub url: String,
    pub token: Option<String>,
    pub db_name: Option<String>,
    pub timeout_secs: u64,
    /// Index built for every vector field on collection creation
    pub index_type: String,
    pub index_metric: MetricType,
    pub nlist: u32,
}

impl MilvusConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_db_name(mut self, db_name: String) -> Self {
        self.db_name = Some(db_name);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl FromEnv for MilvusConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_or_default("MILVUS_URL", DEFAULT_URL),
            token: env_optional("MILVUS_TOKEN"),
            db_name: env_optional("MILVUS_DB_NAME"),
            timeout_secs: env_parse("MILVUS_TIMEOUT_SECS", 30u64)?,
            index_type: env_or_default("MILVUS_INDEX_TYPE", "IVF_FLAT"),
            index_metric: env_parse("MILVUS_INDEX_METRIC_TYPE", MetricType::IP)?,
            nlist: env_parse("MILVUS_NLIST", 1024u32)?,
        })
    }
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: None,
            db_name: None,
            timeout_secs: 30,
            index_type: "IVF_FLAT".to_string(),
            index_metric: MetricType::IP,
            nlist: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars(
            [
                ("MILVUS_URL", None::<&str>),
                ("MILVUS_TOKEN", None),
                ("MILVUS_DB_NAME", None),
                ("MILVUS_TIMEOUT_SECS", None),
                ("MILVUS_INDEX_TYPE", None),
                ("MILVUS_INDEX_METRIC_TYPE", None),
                ("MILVUS_NLIST", None),
            ],
            || {
                let config = MilvusConfig::from_env().unwrap();
                assert_eq!(config.url, DEFAULT_URL);
                assert!(config.token.is_none());
                assert_eq!(config.timeout_secs, 30);
                assert_eq!(config.index_type, "IVF_FLAT");
                assert_eq!(config.index_metric, MetricType::IP);
                assert_eq!(config.nlist, 1024);
            },
        );
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("MILVUS_URL", Some("http://milvus:19530")),
                ("MILVUS_TOKEN", Some("root:Milvus")),
                ("MILVUS_NLIST", Some("128")),
                ("MILVUS_INDEX_METRIC_TYPE", Some("l2")),
            ],
            || {
                let config = MilvusConfig::from_env().unwrap();
                assert_eq!(config.url, "http://milvus:19530");
                assert_eq!(config.token.as_deref(), Some("root:Milvus"));
                assert_eq!(config.nlist, 128);
                assert_eq!(config.index_metric, MetricType::L2);
            },
        );
    }

    #[test]
    fn test_from_env_invalid_timeout() {
        temp_env::with_var("MILVUS_TIMEOUT_SECS", Some("soon"), || {
            assert!(MilvusConfig::from_env().is_err());
        });
    }
}
