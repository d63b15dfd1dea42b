//! Scrape endpoint
//!
//! `GET /metrics` renders the default registry in the text exposition
//! format; `GET /health` answers probes. Runs on its own listener so that
//! scrapes never queue behind uploads.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder, TEXT_FORMAT};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Bound, not yet serving, metrics listener
pub struct MetricsServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

/// Keeps the spawned metrics server alive; dropping it stops accepting
pub struct MetricsHandle {
    local_addr: SocketAddr,
    _stop: DropGuard,
}

impl MetricsHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl MetricsServer {
    pub async fn bind(address: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Serve in a background task until the returned handle is dropped
    pub fn spawn(self) -> MetricsHandle {
        let stop = CancellationToken::new();
        let local_addr = self.local_addr;
        tracing::info!(address = %local_addr, "Metrics server listening");
        tokio::spawn(accept_loop(self.listener, stop.clone()));

        MetricsHandle {
            local_addr,
            _stop: stop.drop_guard(),
        }
    }
}

async fn accept_loop(listener: TcpListener, stop: CancellationToken) {
    loop {
        let stream = tokio::select! {
            _ = stop.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept metrics connection");
                    continue;
                }
            },
        };

        tokio::spawn(async move {
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(scrape));
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "Metrics connection error");
            }
        });
    }
}

async fn scrape(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => render(),
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(response)
}

fn render() -> Response<Full<Bytes>> {
    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => respond(StatusCode::OK, TEXT_FORMAT, buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string())
        }
    }
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
