//! HTTP server for tos3
//!
//! Built on `hyper` and `tokio`: one task per connection, HTTP/1.1.
//!
//! # Endpoints
//!
//! * `GET /health` - liveness probe, returns `ok`
//! * `POST /` with a `payload_json` header - direct-body upload; the request
//!   body is the file content and the header carries the metadata
//! * `POST /` with a JSON body and no header - remote-fetch upload; the body
//!   carries the metadata including the source `url`
//! * `GET /search`, `DELETE /` - reserved, answer 501
//!
//! Successful uploads answer 200 with the pretty-printed JSON
//! [`UploadResponse`]. Failures answer with the error text as `text/plain`
//! and the status from [`UploadError::status_code`].
//!
//! Each upload runs in a task of its own guarded by a [`CancellationToken`].
//! If the client goes away and hyper drops the request future, the token is
//! cancelled and the upload stops at its next step.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tos3::config::Config;
//! use tos3::s3::{S3Client, S3ClientConfig};
//! use tos3::server::UploadServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let store = S3Client::new(S3ClientConfig::from(&config.s3)).await?;
//! let server = UploadServer::new(&config, Arc::new(store)).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::config::Config;
use crate::metrics;
use crate::s3::ObjectStore;
use crate::server::ServerError;
use crate::upload::{
    body_reader, UploadError, UploadRequest, UploadResponse, Uploader, UploaderConfig,
};

/// Header carrying the metadata of a direct-body upload
pub const PAYLOAD_HEADER: &str = "payload_json";

struct AppState {
    uploader: Arc<Uploader>,
    max_payload_bytes: usize,
}

/// Upload HTTP server
///
/// Binds on construction; with port 0 the OS picks the port, available
/// from [`UploadServer::local_addr`].
pub struct UploadServer {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl UploadServer {
    /// Bind to `config.server.address` and upload into `store`
    pub async fn new(config: &Config, store: Arc<dyn ObjectStore>) -> Result<Self, ServerError> {
        let uploader = Uploader::new(UploaderConfig::from(&config.upload), store)
            .map_err(|e| ServerError::InitError(e.to_string()))?;
        Self::bind(
            &config.server.address,
            uploader,
            config.upload.max_payload_bytes,
        )
        .await
    }

    /// Bind to `address` with a ready-made [`Uploader`]
    pub async fn bind(
        address: &str,
        uploader: Uploader,
        max_payload_bytes: usize,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        // Actual bound address (important for port 0)
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!(address = %local_addr, "Server bound");

        Ok(Self {
            state: Arc::new(AppState {
                uploader: Arc::new(uploader),
                max_payload_bytes,
            }),
            listener,
            local_addr,
        })
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        };
        self.run_until(shutdown).await
    }

    /// Serve until `shutdown` completes
    ///
    /// Stops accepting new connections; connections already being served
    /// run to completion in their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!(address = %self.local_addr, "Starting upload server");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(peer = %peer_addr, error = %e, "Error serving connection");
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<String>, Infallible> {
    let span = tracing::info_span!(
        "http.request",
        http.method = %req.method(),
        http.target = %req.uri().path(),
        http.status_code = tracing::field::Empty,
    );

    let response = route(req, &state).instrument(span.clone()).await;
    span.record("http.status_code", response.status().as_u16());
    Ok(response)
}

async fn route(req: Request<Incoming>, state: &AppState) -> Response<String> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::POST, "/") => match upload(req, state).await {
            Ok(response) => json_response(&response),
            Err(e) => error_response(&e),
        },
        (&Method::GET, "/search") => {
            let result = match request_from_header(&req) {
                Ok(query) => state.uploader.search(&query).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(found) => json_response(&found),
                Err(e) => error_response(&e),
            }
        }
        (&Method::DELETE, "/") => {
            let result = match request_from_header(&req) {
                Ok(target) => state.uploader.delete(&target).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(deleted) => json_response(&deleted),
                Err(e) => error_response(&e),
            }
        }
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Pick the intake mode from the request shape and run it
async fn upload(req: Request<Incoming>, state: &AppState) -> Result<UploadResponse, UploadError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    if let Some(payload) = payload_header(&req) {
        let body = body_reader(req.into_body().into_data_stream());
        let uploader = Arc::clone(&state.uploader);
        let token = cancel.clone();
        let task =
            tokio::spawn(async move { uploader.upload_payload(&payload, body, &token).await });
        return join(task).await;
    }

    let upload_req = match read_json_request(req, state.max_payload_bytes).await {
        Ok(upload_req) => upload_req,
        Err(e) => {
            metrics::record_error(e.kind());
            return Err(e);
        }
    };

    let uploader = Arc::clone(&state.uploader);
    let token = cancel.clone();
    let task = tokio::spawn(async move { uploader.upload_from_url(upload_req, &token).await });
    join(task).await
}

/// Decode a remote-fetch request from a capped JSON body
async fn read_json_request(
    req: Request<Incoming>,
    max_payload_bytes: usize,
) -> Result<UploadRequest, UploadError> {
    if !is_json(&req) {
        return Err(UploadError::MissingPayloadHeader);
    }

    let bytes = Limited::new(req.into_body(), max_payload_bytes)
        .collect()
        .await
        .map_err(|e| UploadError::PayloadRead(e.to_string()))?
        .to_bytes();

    UploadRequest::from_slice(&bytes)
}

async fn join(
    task: JoinHandle<Result<UploadResponse, UploadError>>,
) -> Result<UploadResponse, UploadError> {
    task.await
        .map_err(|e| UploadError::IoError(io::Error::other(e)))?
}

fn payload_header<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(PAYLOAD_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

fn request_from_header<B>(req: &Request<B>) -> Result<UploadRequest, UploadError> {
    match payload_header(req) {
        Some(payload) => UploadRequest::from_json(&payload),
        None => Ok(UploadRequest::default()),
    }
}

fn is_json<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
}

fn json_response<T: Serialize>(value: &T) -> Response<String> {
    match serde_json::to_string_pretty(value) {
        Ok(body) => {
            let mut response = text_response(StatusCode::OK, body);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn error_response(err: &UploadError) -> Response<String> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "Request failed");
    } else {
        warn!(status = status.as_u16(), error = %err, "Request rejected");
    }
    text_response(status, err.to_string())
}

fn text_response(status: StatusCode, body: impl Into<String>) -> Response<String> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
