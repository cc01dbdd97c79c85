use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use embed::EmbedderConfig;
use pipeline::{PipelineConfig, ValidationConfig};
use canonical::CanonicalizeConfig;

/// HTTP server configuration. Loaded from `server.toml`/`server.yaml` if
/// present, overridden by `DEVMESH_SERVER__*` environment variables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Shared secret the shippers present. `None` disables authentication.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// How many ingest batches may be in flight before the endpoint
    /// answers `busy`.
    #[serde(default = "default_ingest_queue_depth")]
    pub ingest_queue_depth: usize,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level (env-filter directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Cadence of the safety-net backfill passes.
    #[serde(default = "default_backfill_interval_secs")]
    pub backfill_interval_secs: u64,

    /// Cadence of the retention sweep.
    #[serde(default = "default_retention_interval_secs")]
    pub retention_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            shared_secret: None,
            ingest_queue_depth: default_ingest_queue_depth(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            backfill_interval_secs: default_backfill_interval_secs(),
            retention_interval_secs: default_retention_interval_secs(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from config files and environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("server").required(false))
            .add_source(config::Environment::with_prefix("DEVMESH_SERVER").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        if config.shared_secret.is_none() {
            tracing::warn!("no shared secret configured; ingest endpoint is unauthenticated");
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

/// Everything the server needs to assemble the core: pipeline, embedder,
/// store sizing, and safety-net knobs.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    pub canon: CanonicalizeConfig,
    pub chunk_version: u32,
    pub validation: ValidationConfig,
    pub embedder: EmbedderConfig,
    /// Bound on the template hash→id LRU.
    pub template_cache_capacity: usize,
    /// Templates preloaded into the cache at startup.
    pub warm_cache: usize,
    pub backfill_batch_size: usize,
    pub backfill_delay_ms: u64,
    pub retention_max_age_secs: u64,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            canon: CanonicalizeConfig::default(),
            chunk_version: 1,
            validation: ValidationConfig::default(),
            embedder: EmbedderConfig::default(),
            template_cache_capacity: 100_000,
            warm_cache: 10_000,
            backfill_batch_size: 500,
            backfill_delay_ms: 0,
            retention_max_age_secs: 90 * 24 * 60 * 60,
        }
    }
}

impl CoreOptions {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            canon: self.canon,
            chunk_version: self.chunk_version,
            validation: self.validation.clone(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8600
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_ingest_queue_depth() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backfill_interval_secs() -> u64 {
    60
}

fn default_retention_interval_secs() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8600);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_body_size_mb, 10);
        assert_eq!(cfg.ingest_queue_depth, 8);
        assert!(cfg.shared_secret.is_none());
        assert!(cfg.enable_cors);
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 8600);
    }

    #[test]
    fn core_defaults_match_deployment() {
        let core = CoreOptions::default();
        assert_eq!(core.template_cache_capacity, 100_000);
        assert_eq!(core.retention_max_age_secs, 90 * 24 * 60 * 60);
        assert_eq!(core.pipeline_config().canon.version, 1);
    }
}
