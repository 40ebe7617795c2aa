use core_config::{Environment, FromEnv, server::ServerConfig};
use domain_search::{MilvusConfig, SearchConfig};

/// Gateway configuration
/// Composes shared config components from the `config` library
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub milvus: MilvusConfig,
}

impl GatewayConfig {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?, // HOST=0.0.0.0, PORT=8080
            search: SearchConfig::from_env()?,
            milvus: MilvusConfig::from_env()?,
        })
    }
}
