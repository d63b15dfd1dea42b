//! tos3 Library
//!
//! HTTP upload service that stores files in S3.
//!
//! # Features
//!
//! - **Direct body**: stream a file as the request body, metadata in the
//!   `payload_json` header
//! - **Remote fetch**: post a JSON request naming a source URL and let the
//!   service download it
//! - **Content sniffing**: the stored content type is detected from the
//!   first 512 bytes
//! - **Staging**: bodies are spooled to a temp file so S3 gets a known
//!   length and a replayable body; the file is always removed afterwards
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tos3::s3::{S3Client, S3ClientConfig};
//! use tos3::{Config, UploadServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let store = S3Client::new(S3ClientConfig::from(&config.s3)).await?;
//!     let server = UploadServer::new(&config, Arc::new(store)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod s3;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::UploadServer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
