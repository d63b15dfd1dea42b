//! tos3 - HTTP upload service for S3
//!
//! Accepts files directly or by URL and stores them in an S3 bucket.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tos3::s3::{S3Client, S3ClientConfig};
use tos3::{Config, UploadServer};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// tos3 - upload files and remote URLs into S3
#[derive(Parser, Debug)]
#[command(name = "tos3-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; built-in defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on [default: 8833]
    #[arg(short, long)]
    port: Option<u16>,

    /// Bucket every upload is written to
    #[arg(long)]
    default_bucket: Option<String>,

    /// Namespace prefix for generated object keys
    #[arg(long)]
    common_io: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tos3 v{}", tos3::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    // Command-line values win over the file
    if let Some(port) = args.port {
        let host = config
            .server
            .address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.server.address = format!("{}:{}", host, port);
    }
    if let Some(bucket) = args.default_bucket {
        config.upload.default_bucket = bucket;
    }
    if let Some(namespace) = args.common_io {
        config.upload.path_namespace = Some(namespace);
    }
    config.validate()?;

    #[cfg(feature = "metrics")]
    let _metrics = if config.metrics.enabled {
        let server = tos3::metrics::server::MetricsServer::bind(&config.metrics.address()).await?;
        Some(server.spawn())
    } else {
        None
    };

    let store = S3Client::new(S3ClientConfig::from(&config.s3)).await?;
    info!(
        region = store.region(),
        endpoint = %store.endpoint(),
        bucket = %config.upload.default_bucket,
        "Object store ready"
    );

    let server = UploadServer::new(&config, Arc::new(store)).await?;
    server.run().await?;

    Ok(())
}
