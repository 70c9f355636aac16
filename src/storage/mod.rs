//! Storage Gateway module
//!
//! The object store is reached only through the [`StorageGateway`] trait,
//! which exposes four primitives:
//!
//! | Primitive | Input | Output |
//! |-----------|-------|--------|
//! | `put` | key, bytes, content type | ack |
//! | `presigned_get_url` | key, ttl | [`PresignedLink`] |
//! | `remove` | key | ack |
//! | `ensure_bucket` | none | ack (startup only) |
//!
//! Implementations must be safe for concurrent independent calls; the batch
//! coordinator shares one gateway across all of its workers.
//!
//! # Example
//!
//! ```no_run
//! use filelink::config::Config;
//! use filelink::storage::{self, StorageGateway};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let gateway = storage::build_gateway(&config.storage).await?;
//! gateway.ensure_bucket().await?;
//! gateway.put("hello.txt", Bytes::from("Hello"), "text/plain; charset=utf-8").await?;
//! let link = gateway.presigned_get_url("hello.txt", Duration::from_secs(3600)).await?;
//! println!("{}", link.url);
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod memory;
pub mod s3;

use crate::config::{StorageBackend, StorageConfig};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use credentials::{Credentials, CredentialsError, CredentialsProvider};
pub use memory::MemoryGateway;
pub use s3::S3Gateway;

/// Storage Gateway errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("{operation} failed for object {key}: {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("Failed to sign URL for object {key}: {message}")]
    Signing { key: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn backend(operation: &'static str, key: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// True when the key did not resolve to a stored object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A time-limited retrieval link for one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedLink {
    pub url: String,
    pub expires_in: Duration,
    pub expires_at: DateTime<Utc>,
}

impl PresignedLink {
    /// Build a link valid for `expires_in` starting now
    pub fn new(url: impl Into<String>, expires_in: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(expires_in)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            url: url.into(),
            expires_in,
            expires_at,
        }
    }
}

/// Capability set of the external object store
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Store `body` under `key`
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError>;

    /// Sign a GET link for an existing object
    ///
    /// Fails with [`StorageError::NotFound`] when the key does not resolve.
    async fn presigned_get_url(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedLink, StorageError>;

    /// Remove the object stored under `key`
    ///
    /// Removing a missing key is delegated to the backend; S3 treats it as success.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Create the bucket if it does not exist yet
    async fn ensure_bucket(&self) -> Result<(), StorageError>;
}

/// Build the gateway selected by `storage.backend`
pub async fn build_gateway(
    config: &StorageConfig,
) -> Result<Arc<dyn StorageGateway>, StorageError> {
    match config.backend {
        StorageBackend::S3 => Ok(Arc::new(S3Gateway::new(config).await?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryGateway::new(&config.bucket))),
    }
}
