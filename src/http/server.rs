//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum routers (proxy per endpoint, admin)
//! - Wire up middleware (tracing, request ID)
//! - Dispatch every proxied request through the routing dispatcher
//! - Serve plain and TLS listeners with graceful shutdown
//! - Record request metrics

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::admin::{self, RouteAdmin};
use crate::config::ProxyConfig;
use crate::http::forward::Forwarder;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::observability::metrics;
use crate::routing::{Dispatcher, Endpoint, RouteTable};

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct ProxyState {
    pub dispatcher: Arc<Dispatcher>,
    pub endpoint: Endpoint,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    config: ProxyConfig,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Create a server that routes through `table` and forwards with `forwarder`.
    pub fn new(config: ProxyConfig, table: RouteTable, forwarder: Arc<dyn Forwarder>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            table,
            forwarder,
            config.base_domain.clone(),
            config.forwarding.timeout(),
        ));
        Self { config, dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Router for one client-facing listener.
    pub fn proxy_router(&self, endpoint: Endpoint) -> Router {
        let state = ProxyState {
            dispatcher: self.dispatcher.clone(),
            endpoint,
        };

        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Router for the admin API.
    pub fn admin_router(&self) -> Router {
        let route_admin = RouteAdmin::new(self.dispatcher.table().clone());
        admin::setup_admin_router(route_admin, &self.config.admin)
    }

    /// Run the plain proxy endpoint on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let router = self.proxy_router(Endpoint::Plain);
        serve(router, listener, shutdown, "proxy").await
    }
}

/// Serve `router` on a plain TCP listener with graceful shutdown.
pub async fn serve(
    router: Router,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
    name: &'static str,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(server = name, address = %addr, "HTTP server starting");

    let app = router.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!(server = name, "HTTP server stopped");
    Ok(())
}

/// Serve `router` behind TLS termination. In-flight requests get `grace` to
/// finish after shutdown.
pub async fn serve_tls(
    router: Router,
    addr: SocketAddr,
    tls: RustlsConfig,
    mut shutdown: broadcast::Receiver<()>,
    grace: Duration,
) -> Result<(), std::io::Error> {
    let handle = axum_server::Handle::new();
    let signal = handle.clone();
    tokio::spawn(async move {
        let _ = shutdown.recv().await;
        signal.graceful_shutdown(Some(grace));
    });

    tracing::info!(server = "proxy-tls", address = %addr, "HTTPS server starting");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    tracing::info!(server = "proxy-tls", "HTTPS server stopped");
    Ok(())
}

/// Main proxy handler: every request on a proxy listener lands here.
async fn proxy_handler(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let span = tracing::info_span!(
        "dispatch",
        request_id = %request.request_id(),
        endpoint = %state.endpoint,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let decision = state.dispatcher.dispatch(request, state.endpoint).instrument(span).await;
    let outcome = decision.state().as_str();
    let response = decision.into_response();

    metrics::record_request(outcome, response.status().as_u16(), start);
    response
}
