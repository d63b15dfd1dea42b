//! Upload request and response types
//!
//! `UploadRequest` is decoded from the `payload_json` header (direct body)
//! or from the request body (remote fetch). Empty and absent fields are
//! omitted when either type is serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UploadError;

/// Caller credentials attached to an upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(rename = "akid", default, skip_serializing_if = "String::is_empty")]
    pub access_key_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

/// Location attached to an upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(rename = "lat", default, skip_serializing_if = "is_zero")]
    pub latitude: f32,
    #[serde(rename = "lon", default, skip_serializing_if = "is_zero")]
    pub longitude: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub radius: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub x: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub y: f32,
}

/// Free-form metadata attached to an upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Who may read the stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
}

/// How the upload content reaches the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeMode {
    /// File bytes arrive as the HTTP request body
    DirectBody,
    /// File bytes are fetched from `UploadRequest::url`
    RemoteFetch,
}

impl IntakeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeMode::DirectBody => "direct_body",
            IntakeMode::RemoteFetch => "remote_fetch",
        }
    }
}

/// Destination metadata for one upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(default, skip_serializing_if = "is_false")]
    pub private: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,

    /// Set from the staged byte count, never from the payload
    #[serde(skip)]
    pub content_length: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<AuthInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_info: Option<GeoInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_info: Option<MetaInfo>,
}

impl UploadRequest {
    /// Decode a request from its JSON form
    pub fn from_json(payload: &str) -> Result<Self, UploadError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Decode a request from a JSON body
    pub fn from_slice(payload: &[u8]) -> Result<Self, UploadError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn visibility(&self) -> Visibility {
        if self.private {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    /// Check required fields before any I/O happens.
    ///
    /// Order is fixed: URL (remote fetch only), then path, then bucket.
    pub fn validate(&self, mode: IntakeMode) -> Result<(), UploadError> {
        if mode == IntakeMode::RemoteFetch && self.url.trim().is_empty() {
            return Err(UploadError::EmptyUrl);
        }
        if self.path.is_empty() {
            return Err(UploadError::EmptyPath);
        }
        if self.bucket.is_empty() {
            return Err(UploadError::EmptyBucket);
        }
        Ok(())
    }
}

/// Result of a stored upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "md5", default, skip_serializing_if = "String::is_empty")]
    pub md5_checksum: String,
}

impl UploadResponse {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_md5_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.md5_checksum = checksum.into();
        self
    }
}

/// Public URL of an object in the default S3 virtual-hosted style
pub fn object_url(bucket: &str, key: &str) -> String {
    format!("https://{}.s3.amazonaws.com/{}", bucket, key)
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &f32) -> bool {
    *value == 0.0
}
