//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Load the route table before accepting traffic
//! - Start background tasks (periodic refresh, file watcher, signals)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, including the first route load
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)
//! - One listener failing shuts the others down

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::config::{ProxyConfig, StoreConfig, StoreKind};
use crate::http::server::{self, HttpServer};
use crate::http::HyperForwarder;
use crate::lifecycle::{signals, Shutdown};
use crate::net::tls;
use crate::observability::{logging, metrics};
use crate::routing::{Endpoint, RouteTable};
use crate::store::{watcher, FileRouteStore, MemoryRouteStore, RouteStore, StoreError, StoreWatcher};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid address {field}: {value:?}")]
    Address { field: &'static str, value: String },

    #[error("initial route load failed: {0}")]
    Routes(#[from] StoreError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Run the proxy until a shutdown signal, returning the first listener error.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    tls::install_crypto_provider();
    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "subdomain-proxy starting");
    tracing::info!(
        base_domain = %config.base_domain,
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        store = ?config.store.kind,
        timeout_ms = config.forwarding.timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = parse_addr("observability.metrics_address", &config.observability.metrics_address)?;
        metrics::init_metrics(addr);
    }

    let table = RouteTable::new(build_store(&config.store));
    let count = table.reload().await?;
    tracing::info!(routes = count, "Routes loaded");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::handle_signals(shutdown.clone(), table.clone()));

    if config.store.refresh_interval_secs > 0 {
        tokio::spawn(refresh_periodically(
            table.clone(),
            Duration::from_secs(config.store.refresh_interval_secs),
            shutdown.subscribe(),
        ));
    }

    // dropping the watcher stops file notifications
    let _watcher = if config.store.kind == StoreKind::File && config.store.watch {
        start_watcher(&config.store.path, &table, &shutdown)
    } else {
        None
    };

    let forwarder = Arc::new(HyperForwarder::new()?);
    let http = HttpServer::new(config.clone(), table, forwarder);
    let mut listeners: JoinSet<Result<(), std::io::Error>> = JoinSet::new();

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        listeners.spawn(server::serve(http.admin_router(), listener, shutdown.subscribe(), "admin"));
    }

    if let Some(tls_config) = &config.listener.tls {
        let addr = parse_addr("listener.tls.bind_address", &tls_config.bind_address)?;
        let rustls_config = tls::load_tls_config(Path::new(&tls_config.cert_path), Path::new(&tls_config.key_path)).await?;
        listeners.spawn(server::serve_tls(
            http.proxy_router(Endpoint::Tls),
            addr,
            rustls_config,
            shutdown.subscribe(),
            Duration::from_secs(config.lifecycle.shutdown_grace_secs),
        ));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    listeners.spawn(http.run(listener, shutdown.subscribe()));

    let mut first_error = None;
    while let Some(joined) = listeners.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Listener failed, shutting down");
            shutdown.trigger();
            first_error.get_or_insert(e);
        }
    }

    tracing::info!("Shutdown complete");
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn build_store(config: &StoreConfig) -> Arc<dyn RouteStore> {
    match config.kind {
        StoreKind::File => Arc::new(FileRouteStore::new(config.path.clone())),
        StoreKind::Memory => Arc::new(MemoryRouteStore::new()),
    }
}

fn start_watcher(path: &Path, table: &RouteTable, shutdown: &Shutdown) -> Option<notify::RecommendedWatcher> {
    let (store_watcher, changes) = StoreWatcher::new(path);
    match store_watcher.run() {
        Ok(handle) => {
            tokio::spawn(watcher::reload_on_change(table.clone(), changes, shutdown.subscribe()));
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Routes file watcher unavailable");
            None
        }
    }
}

async fn refresh_periodically(table: RouteTable, every: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(every);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // failures are logged by the table
                let _ = table.reload().await;
            }
            _ = shutdown.recv() => break,
        }
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address {
        field,
        value: value.to_string(),
    })
}
