//! Content-type sniffing
//!
//! Reads up to [`SNIFF_LEN`] bytes from a stream and classifies them using
//! the WHATWG MIME sniffing rules. The consumed prefix is kept so the caller
//! can put it back in front of the rest of the stream.

use bytes::Bytes;
use std::io::{self, Cursor};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Number of bytes considered when sniffing
pub const SNIFF_LEN: usize = 512;

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// HTML tags that mark a document as HTML when they start the content
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Sniffed prefix of a stream and its classification
#[derive(Debug, Clone)]
pub struct ContentSniff {
    prefix: Bytes,
    content_type: Option<String>,
}

impl ContentSniff {
    /// Read up to [`SNIFF_LEN`] bytes from `reader` and classify them.
    ///
    /// An empty stream yields an empty prefix and no content type.
    pub async fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < SNIFF_LEN {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        let content_type = (!buf.is_empty()).then(|| detect_content_type(&buf).to_string());
        Ok(Self {
            prefix: Bytes::from(buf),
            content_type,
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Put the sniffed prefix back in front of the remaining stream
    pub fn chain<R>(self, rest: R) -> impl AsyncRead + Unpin
    where
        R: AsyncRead + Unpin,
    {
        Cursor::new(self.prefix).chain(rest)
    }
}

/// Classify `data` (at most the first [`SNIFF_LEN`] bytes are considered).
///
/// Always returns a valid MIME type, falling back to
/// `application/octet-stream`.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    // Byte order marks
    if data.starts_with(&[0xFE, 0xFF]) {
        return "text/plain; charset=utf-16be";
    }
    if data.starts_with(&[0xFF, 0xFE]) {
        return "text/plain; charset=utf-16le";
    }
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return TEXT_PLAIN_UTF8;
    }

    let markup = skip_whitespace(data);
    if HTML_TAGS.iter().any(|tag| is_html_tag(markup, tag)) {
        return "text/html; charset=utf-8";
    }
    if markup.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }
    if data.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    if data.starts_with(b"%!PS-Adobe-") {
        return "application/postscript";
    }

    // Binary signatures (images, archives, media, fonts). Text matchers are
    // skipped so that scripts and markup fall through to the byte-class rule.
    if let Some(kind) = infer::get(data) {
        if kind.matcher_type() != infer::MatcherType::Text {
            return standard_mime_name(kind.mime_type());
        }
    }

    if data.iter().any(|&b| is_binary_byte(b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN_UTF8
    }
}

/// Names from the WHATWG sniffing table where `infer` uses a different alias
fn standard_mime_name(mime: &'static str) -> &'static str {
    match mime {
        "application/gzip" => "application/x-gzip",
        "application/vnd.rar" => "application/x-rar-compressed",
        "audio/x-wav" => "audio/wave",
        "audio/x-aiff" => "audio/aiff",
        "audio/ogg" => "application/ogg",
        "image/vnd.microsoft.icon" => "image/x-icon",
        "video/x-msvideo" => "video/avi",
        other => other,
    }
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | 0x0C | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive tag match that must be followed by a space or `>`
fn is_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() < tag.len() + 1 {
        return false;
    }
    let matches = data
        .iter()
        .zip(tag)
        .all(|(d, t)| d.to_ascii_uppercase() == *t);
    matches && matches!(data[tag.len()], b' ' | b'>')
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
