//! Filelink Library
//!
//! REST facade over S3-compatible object storage. Uploads are stored under
//! an object identifier and answered with a time-limited presigned link.
//!
//! # Features
//!
//! - **Single operations**: create, fetch-link and delete one object
//! - **Bulk operations**: the same three over many objects, run concurrently
//!   with first-error-wins, all-or-nothing semantics
//! - **S3 Compatible**: AWS S3 or MinIO through `aws-sdk-s3`, plus an
//!   in-memory backend
//!
//! # Example
//!
//! ```no_run
//! use filelink::{config::Config, objects::ObjectService, server::Server, storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let gateway = storage::build_gateway(&config.storage).await?;
//!     let service = ObjectService::from_config(gateway, &config);
//!     Server::bind(&config.server, service).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod objects;
pub mod router;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use batch::BatchCoordinator;
pub use config::Config;
pub use objects::ObjectService;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
