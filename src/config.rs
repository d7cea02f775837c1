use serde::Deserialize;

use crate::rpc::types::Commitment;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcConfig {
    pub primary_endpoint: String,
    #[serde(default)]
    pub fallback_endpoints: Vec<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Commitment used when ingesting blocks (§6 "finalized for ingestion").
    #[serde(default = "default_ingestion_commitment")]
    pub ingestion_commitment: Commitment,
    /// Commitment used when probing the cluster tip (§6 "confirmed for tip probing").
    #[serde(default = "default_tip_probe_commitment")]
    pub tip_probe_commitment: Commitment,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_pool_size() -> usize {
    3
}

fn default_ingestion_commitment() -> Commitment {
    Commitment::Finalized
}

fn default_tip_probe_commitment() -> Commitment {
    Commitment::Confirmed
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

impl RpcConfig {
    /// Primary endpoint first, then fallbacks in configured order — the
    /// order the Connection Pool (§4.3) uses to build its endpoint list
    /// before ranking kicks in.
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints = vec![self.primary_endpoint.clone()];
        endpoints.extend(self.fallback_endpoints.clone());
        endpoints
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.rpc.primary_endpoint.trim().is_empty() {
            return Err(eyre::eyre!("rpc.primary_endpoint must not be empty"));
        }
        if self.rpc.pool_size == 0 {
            return Err(eyre::eyre!("rpc.pool_size must be at least 1"));
        }
        for endpoint in self.rpc.endpoints() {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(eyre::eyre!(
                    "RPC endpoint '{}' must be an http(s) URL",
                    endpoint
                ));
            }
        }
        Ok(())
    }
}
