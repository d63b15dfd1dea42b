//! HTTP server module
//!
//! Accepts upload requests and hands them to the [`Uploader`](crate::upload::Uploader).

pub mod http;

use thiserror::Error;

pub use http::UploadServer;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Failed to initialize: {0}")]
    InitError(String),
}
