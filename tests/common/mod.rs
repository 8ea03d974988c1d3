//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use subdomain_proxy::http::server;
use subdomain_proxy::http::HyperForwarder;
use subdomain_proxy::routing::{Endpoint, NewRoute, Route, RouteId};
use subdomain_proxy::store::{MemoryRouteStore, RouteStore};
use subdomain_proxy::{HttpServer, ProxyConfig, RouteTable, Shutdown};

pub const BASE_DOMAIN: &str = "rcdinfo.fr";
pub const API_KEY: &str = "test-admin-key";

/// A running proxy with both endpoints on ephemeral ports.
///
/// The "secure" endpoint serves the TLS-endpoint router over plain TCP, which
/// exercises backend selection without certificates.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub secure_addr: SocketAddr,
    pub table: RouteTable,
    pub store: Arc<MemoryRouteStore>,
    pub http: HttpServer,
    shutdown: Shutdown,
}

impl TestProxy {
    /// Client that resolves every `host` to this proxy.
    pub fn client(&self, hosts: &[&str]) -> reqwest::Client {
        client_for(hosts, self.addr)
    }

    pub fn url(&self, host: &str, path: &str) -> String {
        format!("http://{}:{}{}", host, self.addr.port(), path)
    }

    pub fn secure_url(&self, host: &str, path: &str) -> String {
        format!("http://{}:{}{}", host, self.secure_addr.port(), path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.base_domain = BASE_DOMAIN.to_string();
    config.admin.enabled = true;
    config.admin.api_key = API_KEY.to_string();
    config.observability.metrics_enabled = false;
    config
}

/// Start a proxy over `store`, with the initial route load done.
pub async fn start_proxy(store: Arc<MemoryRouteStore>) -> TestProxy {
    start_proxy_with_config(store, test_config()).await
}

pub async fn start_proxy_with_config(store: Arc<MemoryRouteStore>, config: ProxyConfig) -> TestProxy {
    let table = RouteTable::new(store.clone());
    table.reload().await.unwrap();

    let forwarder = Arc::new(HyperForwarder::new().unwrap());
    let http = HttpServer::new(config, table.clone(), forwarder);
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(
        http.proxy_router(Endpoint::Plain),
        listener,
        shutdown.subscribe(),
        "proxy",
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let secure_addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(
        http.proxy_router(Endpoint::Tls),
        listener,
        shutdown.subscribe(),
        "proxy-secure",
    ));

    TestProxy {
        addr,
        secure_addr,
        table,
        store,
        http,
        shutdown,
    }
}

/// Start a proxy whose store already holds `routes`, in order.
pub async fn start_proxy_with(routes: Vec<NewRoute>) -> TestProxy {
    let store = Arc::new(MemoryRouteStore::new());
    for route in routes {
        store.create(route).await.unwrap();
    }
    start_proxy(store).await
}

pub fn client_for(hosts: &[&str], addr: SocketAddr) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(5));
    for host in hosts {
        builder = builder.resolve(host, addr);
    }
    builder.build().unwrap()
}

pub fn route(sub_domain: &str, backend: SocketAddr) -> NewRoute {
    NewRoute::new(sub_domain, backend.ip().to_string(), backend.port())
}

pub fn stored_route(sub_domain: &str, backend: SocketAddr) -> Route {
    Route::from_new(RouteId::new(), route(sub_domain, backend))
}

/// Start an HTTP backend that echoes the request as JSON.
///
/// `GET /status/418` answers 418 instead.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    let app = Router::new().fallback(move |req: Request<Body>| echo(name, req));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn echo(name: &'static str, req: Request<Body>) -> Response {
    if req.uri().path() == "/status/418" {
        return (StatusCode::IM_A_TEAPOT, "short and stout").into_response();
    }

    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, 1024 * 1024).await.unwrap_or_default();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(json!({
        "backend": name,
        "method": parts.method.as_str(),
        "path": parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"),
        "host": header("host"),
        "x_forwarded_for": header("x-forwarded-for"),
        "x_forwarded_proto": header("x-forwarded-proto"),
        "x_forwarded_host": header("x-forwarded-host"),
        "body": String::from_utf8_lossy(&body),
    }))
    .into_response()
}

/// A port with nothing listening on it.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Start a backend that never answers and reports each connection the proxy
/// closes.
pub async fn start_watching_backend() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });
    (addr, closed_rx)
}

/// Start a WebSocket backend that echoes text and binary messages.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_close() {
                        break;
                    }
                    if (msg.is_text() || msg.is_binary()) && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}
