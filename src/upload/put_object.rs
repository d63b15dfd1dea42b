//! Put-object step
//!
//! Shared by both intake modes: turns a validated [`UploadRequest`] and a
//! staged body into a put-object call and maps the store's answer into an
//! [`UploadResponse`].

use aws_sdk_s3::primitives::ByteStream;
use std::sync::Arc;
use std::time::Instant;

use super::request::{object_url, UploadRequest, UploadResponse, Visibility};
use super::UploadError;
use crate::metrics;
use crate::s3::{CannedAcl, ObjectStore, PutObjectInput};

/// Put-object handler
///
/// No retries happen at this layer; store errors are returned unchanged.
#[derive(Clone)]
pub struct PutObjectHandler {
    store: Arc<dyn ObjectStore>,
}

impl PutObjectHandler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(
        name = "upload.put_object",
        skip(self, req, body),
        fields(
            s3.bucket = %req.bucket,
            s3.key = %req.path,
            http.content_type = %req.content_type,
            upload.bytes = req.content_length,
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    pub async fn put(
        &self,
        req: &UploadRequest,
        body: ByteStream,
    ) -> Result<UploadResponse, UploadError> {
        req.validate(super::IntakeMode::DirectBody)?;

        let input = PutObjectInput {
            bucket: req.bucket.clone(),
            key: req.path.clone(),
            body,
            content_type: Some(req.content_type.clone()).filter(|ct| !ct.is_empty()),
            content_length: Some(req.content_length).filter(|len| *len > 0),
            acl: match req.visibility() {
                Visibility::Private => None,
                Visibility::Public => Some(CannedAcl::PublicRead),
            },
        };

        let start_time = Instant::now();
        let result = self.store.put_object(input).await;
        metrics::record_put_duration(&req.bucket, start_time.elapsed().as_secs_f64());
        let output = result?;

        let response = UploadResponse {
            url: object_url(&req.bucket, &req.path),
            bucket: req.bucket.clone(),
            name: req.path.clone(),
            etag: output.etag.unwrap_or_default(),
            version_id: output.version_id.unwrap_or_default(),
            ..Default::default()
        };

        tracing::Span::current().record("s3.etag", response.etag.as_str());
        tracing::info!(
            etag = %response.etag,
            bytes = req.content_length,
            duration_ms = start_time.elapsed().as_millis(),
            "PutObject completed"
        );

        Ok(response)
    }
}
