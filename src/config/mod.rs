//! Configuration module for tos3
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section and field
//! has a default, so an empty file (or no file at all) is a valid setup.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Invalid server address '{}'",
                self.server.address
            )));
        }

        if self.upload.default_bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "upload.default_bucket cannot be empty".into(),
            ));
        }

        if self.upload.max_payload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_payload_bytes must be greater than zero".into(),
            ));
        }

        if self.s3.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "s3.region cannot be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.s3.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(
                    "Invalid s3.endpoint: must start with http:// or https://".into(),
                ));
            }
        }

        if self.s3.access_key.is_some() != self.s3.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "s3.access_key and s3.secret_key must be set together".into(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
        }
    }
}

fn default_server_address() -> String {
    "0.0.0.0:8833".to_string()
}

/// Upload pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Bucket every upload goes to
    #[serde(default = "default_bucket")]
    pub default_bucket: String,

    /// Prefix for generated object keys ("common io" namespace)
    #[serde(default)]
    pub path_namespace: Option<String>,

    /// Directory for staging files. Default: the system temp directory
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Abort uploads when the client disconnects. Default: true
    #[serde(default = "default_cancellable")]
    pub cancellable: bool,

    /// Largest JSON body accepted in remote-fetch mode. Default: 1MB
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl UploadConfig {
    /// Effective staging directory
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            default_bucket: default_bucket(),
            path_namespace: None,
            staging_dir: None,
            cancellable: default_cancellable(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bucket() -> String {
    "tatan".to_string()
}

fn default_cancellable() -> bool {
    true
}

fn default_max_payload_bytes() -> usize {
    1048576 // 1MB
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
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

impl MetricsConfig {
    /// Listen address for the scrape endpoint, on all interfaces
    pub fn address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}
