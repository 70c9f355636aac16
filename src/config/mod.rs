//! Configuration module for Filelink
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. A second loader reads the
//! flat environment variables (`PORT`, `MINIO_*`, `FILE_TIME_EXPIRATION`)
//! used by MinIO-style deployments.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Longest validity AWS SigV4 accepts for a presigned URL (7 days)
pub const MAX_LINK_EXPIRATION_HOURS: u64 = 7 * 24;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Failed to read environment: {0}")]
    EnvError(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Load configuration from the process environment (and `.env`, if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        ConfigLoader::from_env()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .address
            .parse::<SocketAddr>()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid server address '{}': {}",
                    self.server.address, e
                ))
            })?;

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_body_bytes must be greater than zero".into(),
            ));
        }

        validate_bucket_name(&self.storage.bucket)?;

        if self.storage.link_expiration_hours == 0
            || self.storage.link_expiration_hours > MAX_LINK_EXPIRATION_HOURS
        {
            return Err(ConfigError::ValidationError(format!(
                "storage.link_expiration_hours must be between 1 and {}, got {}",
                MAX_LINK_EXPIRATION_HOURS, self.storage.link_expiration_hours
            )));
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "storage.access_key and storage.secret_key must be set together".into(),
            ));
        }

        if self.batch.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_concurrency must be at least 1".into(),
            ));
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid logging format '{}': must be 'text' or 'json'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// S3 bucket naming rules (the subset MinIO enforces)
fn validate_bucket_name(bucket: &str) -> Result<(), ConfigError> {
    if bucket.len() < 3 || bucket.len() > 63 {
        return Err(ConfigError::ValidationError(format!(
            "Bucket name '{}' must be between 3 and 63 characters",
            bucket
        )));
    }

    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .is_some_and(|(first, last)| {
            first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
        });

    if !valid_chars || !valid_edges {
        return Err(ConfigError::ValidationError(format!(
            "Bucket name '{}' may only contain lowercase letters, digits, '-' and '.', \
             and must start and end with a letter or digit",
            bucket
        )));
    }

    Ok(())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_max_body_bytes() -> usize {
    33554432 // 32MB
}

/// Which Storage Gateway implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// `host:port` or a full URL. `None` targets AWS S3 for `region`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Validity of links handed out by create operations
    #[serde(default = "default_link_expiration_hours")]
    pub link_expiration_hours: u64,
}

impl StorageConfig {
    /// Endpoint URL with a scheme, if an endpoint is configured
    pub fn endpoint_url(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                let scheme = if self.use_ssl { "https" } else { "http" };
                format!("{}://{}", scheme, endpoint)
            }
        })
    }

    /// Create-time link validity as a duration
    pub fn link_expiration(&self) -> Duration {
        Duration::from_secs(self.link_expiration_hours * 3600)
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_link_expiration_hours() -> u64 {
    24
}

/// Batch coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Upper bound on concurrently executing storage calls per batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_max_concurrency() -> usize {
    16
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

/// Logging configuration
///
/// `RUST_LOG` takes precedence over `level` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                address: "0.0.0.0:8080".into(),
                max_body_bytes: default_max_body_bytes(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                endpoint: Some("localhost:9000".into()),
                use_ssl: false,
                region: default_region(),
                bucket: "files".into(),
                access_key: Some("root".into()),
                secret_key: Some("minio_password".into()),
                link_expiration_hours: 24,
            },
            batch: BatchConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_endpoint_url_adds_scheme() {
        let mut config = test_config();
        assert_eq!(
            config.storage.endpoint_url().as_deref(),
            Some("http://localhost:9000")
        );

        config.storage.use_ssl = true;
        assert_eq!(
            config.storage.endpoint_url().as_deref(),
            Some("https://localhost:9000")
        );

        config.storage.endpoint = Some("http://minio:9000".into());
        assert_eq!(
            config.storage.endpoint_url().as_deref(),
            Some("http://minio:9000")
        );
    }

    #[test]
    fn test_link_expiration_bounds() {
        let mut config = test_config();
        config.storage.link_expiration_hours = 0;
        assert!(config.validate().is_err());

        config.storage.link_expiration_hours = MAX_LINK_EXPIRATION_HOURS + 1;
        assert!(config.validate().is_err());

        config.storage.link_expiration_hours = MAX_LINK_EXPIRATION_HOURS;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.storage.link_expiration(),
            Duration::from_secs(7 * 24 * 3600)
        );
    }

    #[test]
    fn test_invalid_bucket_names() {
        for bucket in ["ab", "defaultBucket", "-files", "files-", "under_score"] {
            let mut config = test_config();
            config.storage.bucket = bucket.into();
            assert!(config.validate().is_err(), "{} should be rejected", bucket);
        }
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut config = test_config();
        config.storage.secret_key = None;
        assert!(config.validate().is_err());

        config.storage.access_key = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = test_config();
        config.batch.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let mut config = test_config();
        config.server.address = "not-an-address".into();
        assert!(config.validate().is_err());
    }
}
