//! Upload orchestrator
//!
//! Composes sniffing, staging, checksum accumulation and the put-object
//! step into the two intake modes:
//!
//! - **Direct body**: the caller streams the content; metadata arrives
//!   separately as a JSON payload.
//! - **Remote fetch**: the caller sends only metadata with a source URL and
//!   the service downloads the content itself. Only this mode computes an
//!   MD5 checksum.
//!
//! Every step that waits on the network or disk races the caller's
//! [`CancellationToken`] when cancellation is enabled.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use super::checksum::Md5Reader;
use super::lookup::{ExistingUploadLookup, NoExistingUploads};
use super::path::{new_request_id, resolve_path};
use super::put_object::PutObjectHandler;
use super::request::{IntakeMode, UploadRequest, UploadResponse};
use super::sniff::ContentSniff;
use super::staging::StagingFile;
use super::{body_reader, UploadError};
use crate::config::UploadConfig;
use crate::metrics;
use crate::s3::ObjectStore;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Bucket every upload is written to, whatever the caller asked for
    pub default_bucket: String,
    /// Prefix for generated object keys
    pub path_namespace: Option<String>,
    /// Directory holding per-upload staging files
    pub staging_dir: PathBuf,
    /// Abort in-flight steps when the caller goes away
    pub cancellable: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            default_bucket: "tatan".to_string(),
            path_namespace: None,
            staging_dir: std::env::temp_dir(),
            cancellable: true,
        }
    }
}

impl From<&UploadConfig> for UploaderConfig {
    fn from(config: &UploadConfig) -> Self {
        Self {
            default_bucket: config.default_bucket.clone(),
            path_namespace: config.path_namespace.clone(),
            staging_dir: config.staging_dir(),
            cancellable: config.cancellable,
        }
    }
}

/// Upload orchestrator
///
/// Holds no per-request state and is shared by all connections.
pub struct Uploader {
    config: UploaderConfig,
    put: PutObjectHandler,
    http: reqwest::Client,
    lookup: Arc<dyn ExistingUploadLookup>,
}

impl Uploader {
    /// Create an orchestrator writing to `store`
    pub fn new(config: UploaderConfig, store: Arc<dyn ObjectStore>) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tos3/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            put: PutObjectHandler::new(store),
            http,
            lookup: Arc::new(NoExistingUploads),
        })
    }

    /// Use `http` for remote fetches
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Consult `lookup` before uploading fetched content
    pub fn with_lookup(mut self, lookup: Arc<dyn ExistingUploadLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Direct-body upload with the metadata still in its JSON form
    pub async fn upload_payload<R>(
        &self,
        payload_json: &str,
        body: R,
        cancel: &CancellationToken,
    ) -> Result<UploadResponse, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let req = match UploadRequest::from_json(payload_json) {
            Ok(req) => req,
            Err(e) => {
                metrics::record_error(e.kind());
                return Err(e);
            }
        };
        self.upload_body(req, body, cancel).await
    }

    /// Store `body` under the destination described by `req`
    pub async fn upload_body<R>(
        &self,
        req: UploadRequest,
        body: R,
        cancel: &CancellationToken,
    ) -> Result<UploadResponse, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let start_time = Instant::now();
        let result = self.direct_body(req, body, cancel).await;
        self.observe(IntakeMode::DirectBody, start_time, result)
    }

    /// Download `req.url` and store it under the destination described by `req`
    pub async fn upload_from_url(
        &self,
        req: UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<UploadResponse, UploadError> {
        let start_time = Instant::now();
        let result = self.remote_fetch(req, cancel).await;
        self.observe(IntakeMode::RemoteFetch, start_time, result)
    }

    /// Search stored uploads
    pub async fn search(&self, _req: &UploadRequest) -> Result<Vec<UploadResponse>, UploadError> {
        Err(UploadError::Unimplemented)
    }

    /// Delete a stored upload
    pub async fn delete(&self, _req: &UploadRequest) -> Result<UploadResponse, UploadError> {
        Err(UploadError::Unimplemented)
    }

    #[tracing::instrument(
        name = "upload.direct_body",
        skip_all,
        fields(
            request_id = tracing::field::Empty,
            s3.bucket = tracing::field::Empty,
            s3.key = tracing::field::Empty
        ),
        err
    )]
    async fn direct_body<R>(
        &self,
        mut req: UploadRequest,
        mut body: R,
        cancel: &CancellationToken,
    ) -> Result<(UploadResponse, u64), UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let request_id = self.prepare(&mut req);
        req.validate(IntakeMode::DirectBody)?;

        let sniff = self
            .cancellable(cancel, async {
                Ok::<_, UploadError>(ContentSniff::read(&mut body).await?)
            })
            .await?;
        apply_sniffed_type(&mut req, &sniff);

        let mut staging = StagingFile::create(&self.config.staging_dir, &request_id).await?;
        let staged = self
            .cancellable(cancel, async {
                staging.write_all(sniff.prefix()).await?;
                staging.copy_from(&mut body).await?;
                staging.rewind().await?;
                Ok::<_, UploadError>(staging.len())
            })
            .await?;
        req.content_length = staged;

        let response = self.store(&req, &staging, cancel).await?;
        Ok((response.with_request_id(request_id), staged))
    }

    #[tracing::instrument(
        name = "upload.remote_fetch",
        skip_all,
        fields(
            request_id = tracing::field::Empty,
            s3.bucket = tracing::field::Empty,
            s3.key = tracing::field::Empty,
            http.url = %req.url
        ),
        err
    )]
    async fn remote_fetch(
        &self,
        mut req: UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<(UploadResponse, u64), UploadError> {
        let request_id = self.prepare(&mut req);
        req.validate(IntakeMode::RemoteFetch)?;

        let response = self
            .cancellable(cancel, async {
                Ok::<_, UploadError>(self.http.get(req.url.trim()).send().await?)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                url = %req.url,
                status = %status,
                "Remote source returned an error status"
            );
            return Err(UploadError::FetchStatus(status.to_string()));
        }

        let mut body = body_reader(response.bytes_stream());
        let sniff = self
            .cancellable(cancel, async {
                Ok::<_, UploadError>(ContentSniff::read(&mut body).await?)
            })
            .await?;
        apply_sniffed_type(&mut req, &sniff);

        let mut staging = StagingFile::create(&self.config.staging_dir, &request_id).await?;
        let checksum = self
            .cancellable(cancel, async {
                let mut reader = Md5Reader::new(sniff.chain(&mut body));
                staging.copy_from(&mut reader).await?;
                staging.rewind().await?;
                Ok::<_, UploadError>(reader.hex_digest())
            })
            .await?;
        req.content_length = staging.len();

        if let Some(existing) = self
            .lookup
            .find_existing(&req.bucket, &req.path, &checksum)
            .await?
        {
            tracing::info!(
                bucket = %req.bucket,
                key = %req.path,
                md5 = %checksum,
                "Content already stored, skipping put"
            );
            let response = existing
                .with_request_id(request_id)
                .with_md5_checksum(checksum);
            return Ok((response, 0));
        }

        let response = self.store(&req, &staging, cancel).await?;
        Ok((
            response
                .with_md5_checksum(checksum)
                .with_request_id(request_id),
            req.content_length,
        ))
    }

    /// Force the default bucket, resolve the object key and open the span
    /// fields; returns the new request id.
    fn prepare(&self, req: &mut UploadRequest) -> String {
        let request_id = new_request_id();

        if !req.bucket.is_empty() && req.bucket != self.config.default_bucket {
            tracing::debug!(
                requested = %req.bucket,
                bucket = %self.config.default_bucket,
                "Ignoring caller bucket"
            );
        }
        req.bucket = self.config.default_bucket.clone();
        req.path = resolve_path(&req.path, self.config.path_namespace.as_deref());

        let span = tracing::Span::current();
        span.record("request_id", request_id.as_str());
        span.record("s3.bucket", req.bucket.as_str());
        span.record("s3.key", req.path.as_str());

        request_id
    }

    async fn store(
        &self,
        req: &UploadRequest,
        staging: &StagingFile,
        cancel: &CancellationToken,
    ) -> Result<UploadResponse, UploadError> {
        let body = staging.byte_stream().await?;
        self.cancellable(cancel, self.put.put(req, body)).await
    }

    /// Run `step`, giving up early if `cancel` fires first
    async fn cancellable<T, F>(&self, cancel: &CancellationToken, step: F) -> Result<T, UploadError>
    where
        F: Future<Output = Result<T, UploadError>>,
    {
        if !self.config.cancellable {
            return step.await;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = step => result,
        }
    }

    fn observe(
        &self,
        mode: IntakeMode,
        start_time: Instant,
        result: Result<(UploadResponse, u64), UploadError>,
    ) -> Result<UploadResponse, UploadError> {
        let bucket = self.config.default_bucket.as_str();
        let duration = start_time.elapsed();
        metrics::record_upload_duration(bucket, mode.as_str(), duration.as_secs_f64());

        match result {
            Ok((response, bytes)) => {
                metrics::record_upload_success(bucket, mode.as_str(), bytes);
                tracing::info!(
                    request_id = %response.request_id,
                    mode = mode.as_str(),
                    key = %response.name,
                    bytes,
                    duration_ms = duration.as_millis(),
                    "Upload completed"
                );
                Ok(response)
            }
            Err(e) => {
                metrics::record_upload_failure(bucket, mode.as_str());
                metrics::record_error(e.kind());
                tracing::error!(
                    mode = mode.as_str(),
                    error = %e,
                    duration_ms = duration.as_millis(),
                    "Upload failed"
                );
                Err(e)
            }
        }
    }
}

/// The sniffed type always replaces the caller's; an empty source leaves it empty
fn apply_sniffed_type(req: &mut UploadRequest, sniff: &ContentSniff) {
    req.content_type = sniff.content_type().unwrap_or_default().to_string();
}
