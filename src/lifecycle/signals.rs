//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, route reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads routes, not shutdown; configuration needs a restart

use crate::lifecycle::Shutdown;
use crate::routing::RouteTable;

/// Handle signals until the first shutdown signal, then trigger `shutdown`.
pub async fn handle_signals(shutdown: Shutdown, table: RouteTable) {
    imp::run(&table).await;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
}

#[cfg(unix)]
mod imp {
    use tokio::signal::unix::{signal, SignalKind};

    use crate::routing::RouteTable;

    pub(super) async fn run(table: &RouteTable) {
        let (mut terminate, mut hangup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(t), Ok(h)) => (t, h),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Unix signal handlers unavailable, only Ctrl+C stops the proxy");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return,
                _ = terminate.recv() => return,
                _ = hangup.recv() => {
                    tracing::info!("SIGHUP received, reloading routes");
                    // failures are logged by the table
                    let _ = table.reload().await;
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use crate::routing::RouteTable;

    pub(super) async fn run(_table: &RouteTable) {
        let _ = tokio::signal::ctrl_c().await;
    }
}
