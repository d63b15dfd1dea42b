//! Shared test infrastructure
//!
//! - In-memory object store recording every put
//! - Uploader and server helpers bound to a temp staging directory

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tos3::s3::{CannedAcl, ObjectStore, PutObjectInput, PutObjectOutput, S3ClientError};
use tos3::upload::{Uploader, UploaderConfig};
use tos3::UploadServer;

/// One object as the store received it
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub acl: Option<CannedAcl>,
    pub body: Vec<u8>,
}

/// Object store keeping everything in memory
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<Vec<StoredObject>>,
    fail_with: Option<String>,
    delay: Option<Duration>,
}

impl MemoryStore {
    /// Store that rejects every put with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Store that holds every put for `delay` before accepting it
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, input: PutObjectInput) -> Result<PutObjectOutput, S3ClientError> {
        if let Some(message) = &self.fail_with {
            return Err(S3ClientError::RequestError(message.clone()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let body = input
            .body
            .collect()
            .await
            .map_err(|e| S3ClientError::RequestError(e.to_string()))?
            .into_bytes()
            .to_vec();

        let etag = format!("\"{:x}\"", md5::compute(&body));
        self.objects.lock().unwrap().push(StoredObject {
            bucket: input.bucket,
            key: input.key,
            content_type: input.content_type,
            content_length: input.content_length,
            acl: input.acl,
            body,
        });

        Ok(PutObjectOutput {
            etag: Some(etag),
            version_id: Some("null".to_string()),
        })
    }
}

/// Uploader settings staging into `dir`
pub fn uploader_config(dir: &Path) -> UploaderConfig {
    UploaderConfig {
        staging_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

/// Number of files left in the staging directory
pub fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// Running upload server, stopped on drop
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub async fn start(uploader: Uploader, max_payload_bytes: usize) -> Self {
        let server = UploadServer::bind("127.0.0.1:0", uploader, max_payload_bytes)
            .await
            .expect("Failed to bind server");
        let addr = server.local_addr();

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = server
                .run_until(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            _shutdown: tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Uploader over `store` staging into `dir`
pub fn uploader(dir: &Path, store: Arc<MemoryStore>) -> Uploader {
    Uploader::new(uploader_config(dir), store).expect("Failed to build uploader")
}
