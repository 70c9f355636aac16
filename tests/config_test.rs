//! Configuration Integration Tests
//!
//! YAML files on disk and the flat environment loader.

use filelink::config::{Config, ConfigError, StorageBackend};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

const ENV_KEYS: &[&str] = &[
    "PORT",
    "MINIO_ENDPOINT",
    "MINIO_BUCKET_NAME",
    "MINIO_ROOT_USER",
    "MINIO_ROOT_PASSWORD",
    "MINIO_USE_SSL",
    "FILE_TIME_EXPIRATION",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_yaml() {
    let file = write_config(
        r#"
server:
  address: "127.0.0.1:9000"
  max_body_bytes: 1048576
storage:
  backend: s3
  endpoint: "minio:9000"
  use_ssl: true
  region: "eu-west-1"
  bucket: "uploads"
  access_key: "key"
  secret_key: "secret"
  link_expiration_hours: 6
batch:
  max_concurrency: 4
metrics:
  enabled: false
  port: 9191
logging:
  level: "debug"
  format: "json"
"#,
    );

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.server.address, "127.0.0.1:9000");
    assert_eq!(config.server.max_body_bytes, 1048576);
    assert_eq!(config.storage.backend, StorageBackend::S3);
    assert_eq!(
        config.storage.endpoint_url().as_deref(),
        Some("https://minio:9000")
    );
    assert_eq!(config.storage.link_expiration().as_secs(), 6 * 3600);
    assert_eq!(config.batch.max_concurrency, 4);
    assert!(!config.metrics.enabled);
    assert_eq!(config.logging.format, "json");
}

#[test]
#[serial]
fn test_yaml_expands_environment() {
    std::env::set_var("FILELINK_IT_BUCKET", "from-env-bucket");
    let file = write_config(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  backend: memory
  bucket: "${FILELINK_IT_BUCKET}"
  link_expiration_hours: ${FILELINK_IT_HOURS:-12}
"#,
    );

    let config = Config::load(file.path());
    std::env::remove_var("FILELINK_IT_BUCKET");

    let config = config.unwrap();
    assert_eq!(config.storage.bucket, "from-env-bucket");
    assert_eq!(config.storage.link_expiration_hours, 12);
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        Config::load("/nonexistent/filelink.yaml"),
        Err(ConfigError::IoError(_))
    ));
}

#[test]
fn test_invalid_yaml() {
    let file = write_config("server: [not, a, map");
    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_expiration_beyond_presign_limit_rejected() {
    let file = write_config(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  bucket: "files"
  link_expiration_hours: 200
"#,
    );
    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();

    assert_eq!(config.server.address, "0.0.0.0:8080");
    assert_eq!(config.storage.backend, StorageBackend::S3);
    assert_eq!(config.storage.endpoint.as_deref(), Some("localhost:9000"));
    assert_eq!(config.storage.bucket, "default-bucket");
    assert_eq!(config.storage.access_key.as_deref(), Some("root"));
    assert_eq!(config.storage.link_expiration_hours, 24);
    assert!(!config.storage.use_ssl);
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    std::env::set_var("PORT", "3001");
    std::env::set_var("MINIO_ENDPOINT", "storage.internal:9000");
    std::env::set_var("MINIO_BUCKET_NAME", "reports");
    std::env::set_var("MINIO_USE_SSL", "true");
    std::env::set_var("FILE_TIME_EXPIRATION", "48");

    let config = Config::from_env();
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.server.address, "0.0.0.0:3001");
    assert_eq!(
        config.storage.endpoint_url().as_deref(),
        Some("https://storage.internal:9000")
    );
    assert_eq!(config.storage.bucket, "reports");
    assert_eq!(config.storage.link_expiration_hours, 48);
}

#[test]
#[serial]
fn test_from_env_unparsable_expiration_falls_back() {
    clear_env();
    std::env::set_var("FILE_TIME_EXPIRATION", "soon");

    let config = Config::from_env();
    clear_env();

    assert_eq!(config.unwrap().storage.link_expiration_hours, 24);
}
