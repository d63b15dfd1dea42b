//! Staging file for uploads
//!
//! Request and fetch bodies are not seekable, but the S3 put needs a known
//! length and a body it can replay on retry. The body is therefore written
//! to a temp file first, rewound, and handed to the store from there.
//!
//! # Flow
//!
//! 1. Create the file, named after the upload's request id
//! 2. Write the sniffed prefix, then copy the rest of the body
//! 3. Rewind and hand the file to the put-object call
//! 4. The file is removed when the [`StagingFile`] is dropped, on every path
//!
//! # Example
//!
//! ```no_run
//! use tos3::upload::staging::StagingFile;
//!
//! # async fn example() -> std::io::Result<()> {
//! let dir = std::env::temp_dir();
//! let mut staging = StagingFile::create(&dir, "6f1c2c7e").await?;
//! staging.write_all(b"Hello, ").await?;
//! staging.copy_from(&mut &b"World!"[..]).await?;
//! staging.rewind().await?;
//!
//! println!("Staged {} bytes at {:?}", staging.len(), staging.path());
//! # Ok(())
//! # }
//! ```

use aws_sdk_s3::primitives::ByteStream;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWriteExt};

use crate::metrics;

/// Temporary, exclusively owned staging file for one upload
///
/// Automatically removed when dropped (RAII pattern).
pub struct StagingFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl StagingFile {
    /// Create a new staging file in `dir`, named after `request_id`
    pub async fn create(dir: &Path, request_id: &str) -> io::Result<Self> {
        let path = dir.join(format!("tos3-{}", request_id));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        tracing::debug!(path = %path.display(), "Created staging file");

        Ok(Self { path, file, len: 0 })
    }

    /// Get the path to the staging file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `buf` to the file
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf).await?;
        self.len += buf.len() as u64;
        Ok(())
    }

    /// Append everything `reader` yields, returning the number of bytes copied
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let copied = tokio::io::copy(reader, &mut self.file).await?;
        self.len += copied;
        Ok(copied)
    }

    /// Flush pending writes and seek back to the start
    pub async fn rewind(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// Replayable body for the put-object call, backed by the file path
    pub async fn byte_stream(&self) -> io::Result<ByteStream> {
        ByteStream::from_path(&self.path)
            .await
            .map_err(io::Error::other)
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                metrics::record_error("staging_cleanup");
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to clean up staging file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = StagingFile::create(dir.path(), "req-1").await.unwrap();

        staging.write_all(b"sniffed ").await.unwrap();
        let copied = staging.copy_from(&mut &b"remainder"[..]).await.unwrap();
        staging.rewind().await.unwrap();

        assert_eq!(copied, 9);
        assert_eq!(staging.len(), 17);
        let body = staging.byte_stream().await.unwrap().collect().await.unwrap();
        assert_eq!(body.into_bytes().as_ref(), b"sniffed remainder");
    }

    #[tokio::test]
    async fn test_file_named_after_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingFile::create(dir.path(), "abc").await.unwrap();
        assert_eq!(staging.path(), dir.path().join("tos3-abc"));
        assert!(staging.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let mut staging = StagingFile::create(dir.path(), "req-2").await.unwrap();
            staging.write_all(b"temp data").await.unwrap();
            path = staging.path().to_path_buf();
            assert!(path.exists());
        }
        // Dropped
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_after_failed_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let mut staging = StagingFile::create(dir.path(), "req-3").await.unwrap();
            path = staging.path().to_path_buf();
            let mut reader = tokio_test::io::Builder::new()
                .read(b"some")
                .read_error(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"))
                .build();
            assert!(staging.copy_from(&mut reader).await.is_err());
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_request_id_collision_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let _first = StagingFile::create(dir.path(), "same").await.unwrap();
        let second = StagingFile::create(dir.path(), "same").await;
        assert_eq!(second.err().unwrap().kind(), io::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_byte_stream_replays_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = StagingFile::create(dir.path(), "req-4").await.unwrap();
        staging.write_all(b"body bytes").await.unwrap();
        staging.rewind().await.unwrap();

        let body = staging.byte_stream().await.unwrap();
        let collected = body.collect().await.unwrap().into_bytes();
        assert_eq!(&collected[..], b"body bytes");
    }
}
