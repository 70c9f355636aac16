//! Filelink - REST facade over S3-compatible object storage
//!
//! Stores uploads and hands out time-limited presigned links, one object or
//! many at a time.

use anyhow::Context;
use clap::Parser;
use filelink::config::Config;
use filelink::metrics::server::{MetricsServer, MetricsServerConfig};
use filelink::storage::{self, StorageGateway};
use filelink::{logging, ObjectService, Server};
use std::path::PathBuf;
use tracing::{info, warn};

/// Filelink - object storage links over HTTP
#[derive(Parser, Debug)]
#[command(name = "filelink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file; without one the MinIO-style
    /// environment variables are read
    #[arg(short, long, env = "FILELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_parser = ["text", "json"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => Config::from_env().context("Failed to load configuration from environment")?,
    };

    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    logging::init(&config.logging)?;

    info!("Starting Filelink v{}", filelink::VERSION);
    match &args.config {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Loaded configuration from environment"),
    }

    let gateway = storage::build_gateway(&config.storage)
        .await
        .context("Failed to build storage gateway")?;
    gateway
        .ensure_bucket()
        .await
        .with_context(|| format!("Bucket {} is not available", config.storage.bucket))?;
    info!(
        bucket = %config.storage.bucket,
        backend = ?config.storage.backend,
        "Storage ready"
    );

    let mut metrics_server = if config.metrics.enabled {
        let mut server = MetricsServer::new(MetricsServerConfig::from(&config.metrics));
        match server.start().await {
            Ok(addr) => info!("Metrics available at http://{}/metrics", addr),
            Err(e) => warn!("Metrics server disabled: {}", e),
        }
        Some(server)
    } else {
        None
    };

    let service = ObjectService::from_config(gateway, &config);
    let server = Server::bind(&config.server, service).await?;
    server.run().await?;

    if let Some(server) = metrics_server.as_mut() {
        server.shutdown().await;
    }

    Ok(())
}
