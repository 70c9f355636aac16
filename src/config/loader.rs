//! Configuration loader with environment variable expansion

use super::{
    BatchConfig, Config, ConfigError, LoggingConfig, MetricsConfig, ServerConfig,
    StorageBackend, StorageConfig,
};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from flat environment variables
    ///
    /// A `.env` file in the working directory is read first when present.
    /// Values that fail to parse fall back to their defaults.
    pub fn from_env() -> Result<Config, ConfigError> {
        let _ = dotenvy::dotenv();

        let settings = ::config::Config::builder()
            .set_default("port", "8080")?
            .set_default("minio_endpoint", "localhost:9000")?
            .set_default("minio_bucket_name", "default-bucket")?
            .set_default("minio_root_user", "root")?
            .set_default("minio_root_password", "minio_password")?
            .add_source(::config::Environment::default().try_parsing(true))
            .build()?;

        let port = settings
            .get_int("port")
            .ok()
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(8080);

        let link_expiration_hours = settings
            .get_int("file_time_expiration")
            .ok()
            .and_then(|h| u64::try_from(h).ok())
            .unwrap_or(24);

        let config = Config {
            server: ServerConfig {
                address: format!("0.0.0.0:{}", port),
                max_body_bytes: super::default_max_body_bytes(),
            },
            storage: StorageConfig {
                backend: StorageBackend::S3,
                endpoint: Some(settings.get_string("minio_endpoint")?),
                use_ssl: settings.get_bool("minio_use_ssl").unwrap_or(false),
                region: super::default_region(),
                bucket: settings.get_string("minio_bucket_name")?,
                access_key: Some(settings.get_string("minio_root_user")?),
                secret_key: Some(settings.get_string("minio_root_password")?),
                link_expiration_hours,
            },
            batch: BatchConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in `${VAR}` and `${VAR:-default}` form
    ///
    /// A placeholder whose variable is unset and has no default is kept as-is.
    fn expand_env_vars(content: &str) -> String {
        let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
            Ok(re) => re,
            Err(_) => return content.to_string(),
        };

        re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
            match std::env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => caps
                    .get(2)
                    .map(|default| default.as_str().to_string())
                    .unwrap_or_else(|| caps[0].to_string()),
            }
        })
        .into_owned()
    }
}
