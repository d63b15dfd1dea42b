//! MD5 accumulation while copying
//!
//! [`Md5Reader`] feeds every byte it yields into an MD5 context, so the
//! digest is ready as soon as the copy into the staging file finishes.
//! The data is read exactly once.

use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

pin_project! {
    /// Reader adapter that hashes everything read through it
    pub struct Md5Reader<R> {
        #[pin]
        inner: R,
        context: md5::Context,
        bytes_read: u64,
    }
}

impl<R> Md5Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            context: md5::Context::new(),
            bytes_read: 0,
        }
    }

    /// Number of bytes that have passed through so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Hex-encoded digest of everything read
    pub fn hex_digest(self) -> String {
        format!("{:x}", self.context.compute())
    }
}

impl<R: AsyncRead> AsyncRead for Md5Reader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        ready!(this.inner.poll_read(cx, buf))?;

        let fresh = &buf.filled()[before..];
        this.context.consume(fresh);
        *this.bytes_read += fresh.len() as u64;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::sniff::ContentSniff;

    async fn copy_with_md5<R: AsyncRead + Unpin>(
        reader: R,
        sink: &mut Vec<u8>,
    ) -> io::Result<(u64, String)> {
        let mut reader = Md5Reader::new(reader);
        let copied = tokio::io::copy(&mut reader, sink).await?;
        assert_eq!(reader.bytes_read(), copied);
        Ok((copied, reader.hex_digest()))
    }

    #[tokio::test]
    async fn test_known_digest() {
        let mut sink = Vec::new();
        let (n, digest) = copy_with_md5(&b"hello"[..], &mut sink).await.unwrap();

        assert_eq!(n, 5);
        assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(sink, b"hello");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut sink = Vec::new();
        let (n, digest) = copy_with_md5(&b""[..], &mut sink).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(digest, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn test_digest_is_deterministic() {
        let data = vec![7u8; 100_000];
        let (_, first) = copy_with_md5(&data[..], &mut Vec::new()).await.unwrap();
        let (_, second) = copy_with_md5(&data[..], &mut Vec::new()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_digest_covers_sniffed_prefix() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = &data[..];
        let sniff = ContentSniff::read(&mut reader).await.unwrap();

        let mut sink = Vec::new();
        let (n, digest) = copy_with_md5(sniff.chain(reader), &mut sink)
            .await
            .unwrap();

        assert_eq!(n, data.len() as u64);
        assert_eq!(digest, format!("{:x}", md5::compute(&data)));
        assert_eq!(sink, data);
    }

    #[tokio::test]
    async fn test_read_error_aborts_copy() {
        let reader = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let result = copy_with_md5(reader, &mut Vec::new()).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionReset);
    }
}
