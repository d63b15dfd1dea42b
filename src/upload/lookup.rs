//! Pre-upload lookup hook
//!
//! Lets a deployment answer "was this content already stored under this
//! key?" before bytes are sent to the store. Only the contract lives here;
//! the default implementation never finds anything.

use async_trait::async_trait;

use super::{UploadError, UploadResponse};

/// Lookup of previously stored uploads, keyed by destination and checksum
#[async_trait]
pub trait ExistingUploadLookup: Send + Sync {
    /// Return the earlier response when `bucket`/`key` already holds content
    /// with this MD5 checksum.
    async fn find_existing(
        &self,
        bucket: &str,
        key: &str,
        md5_checksum: &str,
    ) -> Result<Option<UploadResponse>, UploadError>;
}

/// Lookup that never reports an existing upload
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExistingUploads;

#[async_trait]
impl ExistingUploadLookup for NoExistingUploads {
    async fn find_existing(
        &self,
        _bucket: &str,
        _key: &str,
        _md5_checksum: &str,
    ) -> Result<Option<UploadResponse>, UploadError> {
        Ok(None)
    }
}
