//! Forwarding requests to backends.
//!
//! # Responsibilities
//! - Open one connection per request to the chosen backend (plain or TLS)
//! - Rewrite the request for the backend (origin-form URI, forwarding headers)
//! - Bound connect + handshake + response head by a deadline
//! - Stream the response body back without buffering
//! - Tunnel protocol upgrades (WebSocket)
//!
//! # Design Decisions
//! - The backend connection task is aborted when the response (or tunnel)
//!   that depends on it is dropped, so an abandoned exchange releases its
//!   socket immediately
//! - Backend TLS certificates are not verified (see `net::tls`)
//! - The `Forwarder` trait is the seam tests use to stand in for the network

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Request, Response, StatusCode, Uri, Version},
};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::AbortHandle;
use tokio_rustls::TlsConnector;

use crate::http::{headers, websocket};
use crate::net::stream::BackendStream;
use crate::net::tls;
use crate::routing::{Endpoint, Target};

/// Errors from a single forwarding attempt.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("connection to backend failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("TLS handshake with backend failed: {0}")]
    Tls(String),

    #[error("backend protocol error: {0}")]
    Protocol(#[from] hyper::Error),

    #[error("request cannot be forwarded: {0}")]
    InvalidRequest(String),
}

impl ForwardError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Connect(_) => "connect",
            ForwardError::Tls(_) => "tls",
            ForwardError::Protocol(_) => "protocol",
            ForwardError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Sends a client request to a backend and returns the backend's response.
#[async_trait]
pub trait Forwarder: Send + Sync + 'static {
    /// `timeout` bounds the time until the response head arrives; the body
    /// then streams without a deadline.
    async fn forward(
        &self,
        request: Request<Body>,
        target: &Target,
        timeout: Duration,
    ) -> Result<Response<Body>, ForwardError>;
}

/// Aborts the backend connection task when dropped.
struct ConnectionGuard(AbortHandle);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// HTTP/1.1 forwarder over hyper's connection-level client.
#[derive(Clone)]
pub struct HyperForwarder {
    tls: TlsConnector,
}

impl HyperForwarder {
    pub fn new() -> Result<Self, rustls::Error> {
        Ok(Self {
            tls: tls::insecure_connector()?,
        })
    }

    async fn connect(&self, target: &Target) -> Result<BackendStream, ForwardError> {
        let tcp = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(ForwardError::Connect)?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY on backend socket");
        }

        if !target.is_tls() {
            return Ok(BackendStream::Plain(tcp));
        }

        let name = ServerName::try_from(target.host.clone()).map_err(|e| ForwardError::Tls(e.to_string()))?;
        let stream = self
            .tls
            .connect(name, tcp)
            .await
            .map_err(|e| ForwardError::Tls(e.to_string()))?;
        Ok(BackendStream::Tls(Box::new(stream)))
    }

    async fn exchange(
        &self,
        request: Request<Body>,
        target: &Target,
    ) -> Result<(Response<Incoming>, ConnectionGuard), ForwardError> {
        let stream = self.connect(target).await?;
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;

        let task = tokio::spawn(async move {
            if let Err(e) = connection.with_upgrades().await {
                tracing::debug!(error = %e, "Backend connection closed with error");
            }
        });
        let guard = ConnectionGuard(task.abort_handle());

        let response = sender.send_request(request).await?;
        Ok((response, guard))
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(
        &self,
        mut request: Request<Body>,
        target: &Target,
        timeout: Duration,
    ) -> Result<Response<Body>, ForwardError> {
        let upgrade = websocket::is_upgrade_request(request.headers());
        let client_upgrade = if upgrade {
            request.extensions_mut().remove::<OnUpgrade>()
        } else {
            None
        };

        let outbound = prepare_request(request, target, upgrade)?;
        let (mut response, guard) = tokio::time::timeout(timeout, self.exchange(outbound, target))
            .await
            .map_err(|_| ForwardError::Timeout(timeout))??;

        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            if let Some(client_upgrade) = client_upgrade {
                let backend_upgrade = hyper::upgrade::on(&mut response);
                websocket::spawn_tunnel(client_upgrade, backend_upgrade, guard);

                let (mut parts, _) = response.into_parts();
                headers::strip_hop_by_hop(&mut parts.headers, true);
                return Ok(Response::from_parts(parts, Body::empty()));
            }
        }

        let (mut parts, body) = response.into_parts();
        headers::strip_hop_by_hop(&mut parts.headers, false);
        let body = body.map_frame(move |frame| {
            let _held = &guard;
            frame
        });
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Turn the client request into the request sent to `target`.
fn prepare_request(request: Request<Body>, target: &Target, upgrade: bool) -> Result<Request<Body>, ForwardError> {
    let (mut parts, body) = request.into_parts();

    let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|c| c.0);
    let endpoint = parts.extensions.get::<Endpoint>().copied();
    let original_host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));

    headers::strip_hop_by_hop(&mut parts.headers, upgrade);
    headers::add_forwarded(&mut parts.headers, peer, endpoint, original_host.as_deref());

    if !parts.headers.contains_key(header::HOST) {
        let host = original_host.unwrap_or_else(|| target.authority());
        let value = HeaderValue::from_str(&host).map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;
        parts.headers.insert(header::HOST, value);
    }

    let path = parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    parts.uri = path
        .parse::<Uri>()
        .map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;
    parts.version = Version::HTTP_11;

    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::BackendScheme;

    fn target() -> Target {
        Target {
            scheme: BackendScheme::Http,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }

    #[test]
    fn request_is_rewritten_to_origin_form() {
        let mut request = Request::builder()
            .uri("/api/items?page=2")
            .header("host", "api.rcdinfo.fr")
            .header("connection", "keep-alive")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(Endpoint::Plain);
        request
            .extensions_mut()
            .insert(ConnectInfo("10.1.2.3:4000".parse::<SocketAddr>().unwrap()));

        let out = prepare_request(request, &target(), false).unwrap();
        assert_eq!(out.uri(), "/api/items?page=2");
        assert_eq!(out.version(), Version::HTTP_11);
        assert_eq!(out.headers()["host"], "api.rcdinfo.fr");
        assert_eq!(out.headers()["x-forwarded-for"], "10.1.2.3");
        assert_eq!(out.headers()["x-forwarded-proto"], "http");
        assert!(out.headers().get("connection").is_none());
    }

    #[test]
    fn host_is_taken_from_authority_when_missing() {
        let request = Request::builder()
            .uri("https://blog.rcdinfo.fr/post/1")
            .version(Version::HTTP_2)
            .body(Body::empty())
            .unwrap();

        let out = prepare_request(request, &target(), false).unwrap();
        assert_eq!(out.uri(), "/post/1");
        assert_eq!(out.headers()["host"], "blog.rcdinfo.fr");
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let forwarder = HyperForwarder::new().unwrap();
        let target = Target {
            scheme: BackendScheme::Http,
            host: "127.0.0.1".to_string(),
            port,
        };
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let err = forwarder
            .forward(request, &target, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "connect");
    }

    #[tokio::test]
    async fn silent_backend_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let forwarder = HyperForwarder::new().unwrap();
        let target = Target {
            scheme: BackendScheme::Http,
            host: "127.0.0.1".to_string(),
            port,
        };
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let err = forwarder
            .forward(request, &target, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Timeout(_)));
    }
}
