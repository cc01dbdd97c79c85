//! YAML configuration file support for the DevMesh server.
//!
//! A single YAML file describes every stage of the pipeline and the HTTP
//! surface, and resolves into the typed configs the crates consume. All
//! sections are optional; an empty file is a valid stub-embedder
//! deployment.
//!
//! ## Example
//!
//! ```yaml
//! version: "1.0"
//! name: "fleet-live"
//!
//! server:
//!   bind_addr: "0.0.0.0"
//!   port: 8600
//!   shared_secret: "change-me"
//!   ingest_queue_depth: 8
//!
//! canonical:
//!   version: 1
//!
//! embedding:
//!   api_url: "http://gpu-node:8080/v1/embeddings"
//!   model: "qwen3-embedding-8b"
//!   dim: 4096
//!   batch_size: 50
//!   timeout_secs: 60
//!   max_concurrency: 4
//!
//! templates:
//!   cache_capacity: 100000
//!   warm_cache: 10000
//!
//! safety_net:
//!   batch_size: 500
//!   inter_batch_delay_ms: 50
//!
//! retention:
//!   max_age_days: 90
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use canonical::CanonicalizeConfig;
use embed::EmbedderConfig;
use pipeline::ValidationConfig;
use server::{CoreOptions, ServerConfig};

/// Errors that can occur when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration for the whole deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevMeshConfig {
    /// Configuration format version ("1.0").
    #[serde(default = "default_format_version")]
    pub version: String,

    /// Optional deployment name, echoed in logs.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub canonical: CanonicalizeConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub embedding: EmbedderConfig,

    #[serde(default)]
    pub templates: TemplateSection,

    #[serde(default)]
    pub safety_net: SafetyNetSection,

    #[serde(default)]
    pub retention: RetentionSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSection {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_warm_cache")]
    pub warm_cache: usize,
}

impl Default for TemplateSection {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            warm_cache: default_warm_cache(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyNetSection {
    #[serde(default = "default_backfill_batch")]
    pub batch_size: usize,
    #[serde(default)]
    pub inter_batch_delay_ms: u64,
}

impl Default for SafetyNetSection {
    fn default() -> Self {
        Self {
            batch_size: default_backfill_batch(),
            inter_batch_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSection {
    #[serde(default = "default_retention_days")]
    pub max_age_days: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            max_age_days: default_retention_days(),
        }
    }
}

impl DevMeshConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: DevMeshConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "" | "1" | "1.0" => {}
            v => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }
        if self.canonical.version == 0 {
            return Err(ConfigLoadError::Validation(
                "canonical.version must be >= 1".to_string(),
            ));
        }
        self.embedding
            .validate()
            .map_err(ConfigLoadError::Validation)?;
        if self.safety_net.batch_size == 0 {
            return Err(ConfigLoadError::Validation(
                "safety_net.batch_size must be >= 1".to_string(),
            ));
        }
        if self.retention.max_age_days == 0 {
            return Err(ConfigLoadError::Validation(
                "retention.max_age_days must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The server-side view of this configuration.
    pub fn server_config(&self) -> ServerConfig {
        self.server.clone()
    }

    /// The core assembly options derived from this configuration.
    pub fn core_options(&self) -> CoreOptions {
        CoreOptions {
            canon: self.canonical,
            chunk_version: 1,
            validation: self.validation.clone(),
            embedder: self.embedding.clone(),
            template_cache_capacity: self.templates.cache_capacity,
            warm_cache: self.templates.warm_cache,
            backfill_batch_size: self.safety_net.batch_size,
            backfill_delay_ms: self.safety_net.inter_batch_delay_ms,
            retention_max_age_secs: self.retention.max_age_days * 24 * 60 * 60,
        }
    }
}

fn default_format_version() -> String {
    "1.0".to_string()
}

fn default_cache_capacity() -> usize {
    100_000
}

fn default_warm_cache() -> usize {
    10_000
}

fn default_backfill_batch() -> usize {
    500
}

fn default_retention_days() -> u64 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "fleet-live"
server:
  port: 9000
  shared_secret: "s3cret"
canonical:
  version: 1
embedding:
  api_url: "http://gpu:8080/v1/embeddings"
  dim: 1024
retention:
  max_age_days: 30
"#;
        let config = DevMeshConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("fleet-live"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.embedding.dim, 1024);

        let core = config.core_options();
        assert_eq!(core.retention_max_age_secs, 30 * 24 * 60 * 60);
        assert_eq!(core.embedder.api_url.as_deref(), Some("http://gpu:8080/v1/embeddings"));
    }

    #[test]
    fn empty_yaml_is_a_stub_deployment() {
        let config = DevMeshConfig::from_yaml("{}").unwrap();
        assert!(config.embedding.api_url.is_none());
        assert_eq!(config.canonical.version, 1);
        assert_eq!(config.templates.cache_capacity, 100_000);
    }

    #[test]
    fn load_from_file() {
        let yaml = "version: \"1.0\"\n";
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = DevMeshConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn unsupported_version_rejected() {
        let result = DevMeshConfig::from_yaml("version: \"2.0\"\n");
        assert!(matches!(result, Err(ConfigLoadError::UnsupportedVersion(_))));
    }

    #[test]
    fn zero_canonical_version_rejected() {
        let result = DevMeshConfig::from_yaml("canonical:\n  version: 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_retention_rejected() {
        let result = DevMeshConfig::from_yaml("retention:\n  max_age_days: 0\n");
        assert!(result.is_err());
    }
}
