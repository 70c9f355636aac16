//! Logging subscriber setup
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else logging.level)
//!   └── Fmt Layer (text or json)
//! ```

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging setup errors
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the level filter; `RUST_LOG` wins over the configured level
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
        filter: config.level.clone(),
        message: e.to_string(),
    })
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init()
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config(level: &str, format: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            format: format.to_string(),
        }
    }

    #[test]
    #[serial]
    fn test_configured_level_used_without_rust_log() {
        std::env::remove_var("RUST_LOG");
        let filter = env_filter(&config("filelink=debug,warn", "text")).unwrap();
        assert!(filter.to_string().contains("filelink=debug"));
    }

    #[test]
    #[serial]
    fn test_rust_log_wins() {
        std::env::set_var("RUST_LOG", "trace");
        let filter = env_filter(&config("info", "text"));
        std::env::remove_var("RUST_LOG");
        assert!(filter.unwrap().to_string().contains("trace"));
    }

    #[test]
    #[serial]
    fn test_invalid_level_rejected() {
        std::env::remove_var("RUST_LOG");
        assert!(matches!(
            env_filter(&config("filelink=loud", "text")),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init(&config("info", "json"));
        assert!(matches!(
            init(&config("info", "text")),
            Err(LoggingError::AlreadyInitialized(_))
        ));
    }
}
