//! Upload module
//!
//! The upload pipeline: content sniffing, staging to a seekable temp file,
//! MD5 accumulation, destination path resolution and the put-object call.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use hyper::StatusCode;
use std::io;
use thiserror::Error;
use tokio_util::io::StreamReader;

use crate::s3::S3ClientError;

pub mod checksum;
pub mod lookup;
pub mod path;
pub mod put_object;
pub mod request;
pub mod sniff;
pub mod staging;
pub mod uploader;

pub use lookup::{ExistingUploadLookup, NoExistingUploads};
pub use request::{IntakeMode, UploadRequest, UploadResponse, Visibility};
pub use uploader::{Uploader, UploaderConfig};

/// Upload errors
///
/// The `Display` text of every variant is what the HTTP caller sees.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("expecting a non-empty URL")]
    EmptyUrl,

    #[error("expecting a non-empty path")]
    EmptyPath,

    #[error("expecting a non-empty bucket")]
    EmptyBucket,

    #[error("expected \"payload_json\" in the request headers")]
    MissingPayloadHeader,

    #[error("{0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("failed to read request body: {0}")]
    PayloadRead(String),

    /// Remote source answered with a non-2xx status; holds the status line
    #[error("{0}")]
    FetchStatus(String),

    #[error("{0}")]
    FetchError(#[from] reqwest::Error),

    #[error("{0}")]
    IoError(#[from] io::Error),

    #[error(transparent)]
    S3Error(#[from] S3ClientError),

    #[error("upload cancelled")]
    Cancelled,

    #[error("unimplemented")]
    Unimplemented,
}

impl UploadError {
    /// HTTP status reported to the caller for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::EmptyUrl
            | UploadError::EmptyPath
            | UploadError::EmptyBucket
            | UploadError::MissingPayloadHeader
            | UploadError::InvalidPayload(_)
            | UploadError::PayloadRead(_)
            | UploadError::FetchStatus(_) => StatusCode::BAD_REQUEST,
            UploadError::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            UploadError::FetchError(_)
            | UploadError::IoError(_)
            | UploadError::S3Error(_)
            | UploadError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the error counter
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::EmptyUrl | UploadError::EmptyPath | UploadError::EmptyBucket => {
                "validation"
            }
            UploadError::MissingPayloadHeader
            | UploadError::InvalidPayload(_)
            | UploadError::PayloadRead(_) => "payload",
            UploadError::FetchStatus(_) | UploadError::FetchError(_) => "fetch",
            UploadError::IoError(_) => "io",
            UploadError::S3Error(_) => "s3_upload",
            UploadError::Cancelled => "cancelled",
            UploadError::Unimplemented => "unimplemented",
        }
    }
}

/// Byte stream adapted into `AsyncRead`, as fed to the pipeline by the HTTP layer
pub type BodyReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// Adapt a fallible stream of byte chunks (hyper body, reqwest response) into a reader
pub fn body_reader<S, E>(stream: S) -> BodyReader
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    StreamReader::new(stream.map_err(io::Error::other).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_validation_errors_are_bad_requests() {
        assert_eq!(UploadError::EmptyPath.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(UploadError::EmptyUrl.to_string(), "expecting a non-empty URL");
        assert_eq!(
            UploadError::FetchStatus("404 Not Found".into()).to_string(),
            "404 Not Found"
        );
    }

    #[test]
    fn test_store_error_text_is_forwarded() {
        let err = UploadError::from(S3ClientError::RequestError("AccessDenied".into()));
        assert_eq!(err.to_string(), "AccessDenied");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unimplemented_status() {
        assert_eq!(
            UploadError::Unimplemented.status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[tokio::test]
    async fn test_body_reader_concatenates_chunks() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let mut reader = body_reader(futures::stream::iter(chunks));
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello world");
    }
}
