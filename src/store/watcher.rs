//! Routes file watcher.
//!
//! Edits made to the routes file outside the admin API (by hand, by a deploy
//! script) are picked up by reloading the route table.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::routing::RouteTable;

/// Watches the routes file and signals changes.
pub struct StoreWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl StoreWatcher {
    /// Create a new watcher.
    ///
    /// Returns the watcher and a receiver that yields once per detected change.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching in notify's background thread.
    ///
    /// The parent directory is watched rather than the file: atomic writes replace
    /// the file and would orphan a watch on the old inode.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant && ours {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Routes file watcher started");
        Ok(watcher)
    }
}

/// Reload `table` for every change signal until shutdown.
///
/// Bursts of events (temp write + rename) collapse into the reloads that are
/// already in flight.
pub async fn reload_on_change(
    table: RouteTable,
    mut changes: mpsc::UnboundedReceiver<()>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            change = changes.recv() => {
                if change.is_none() {
                    break;
                }
                while changes.try_recv().is_ok() {}
                tracing::info!("Routes file changed, reloading");
                // failures are logged by the table
                let _ = table.reload().await;
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::lifecycle::Shutdown;
    use crate::routing::NewRoute;
    use crate::store::{MemoryRouteStore, RouteStore};

    #[tokio::test]
    async fn change_signal_reloads_table() {
        let store = Arc::new(MemoryRouteStore::new());
        let table = RouteTable::new(store.clone());
        table.reload().await.unwrap();

        let shutdown = Shutdown::new();
        let (watcher, changes) = StoreWatcher::new(Path::new("routes.json"));
        let task = tokio::spawn(reload_on_change(table.clone(), changes, shutdown.subscribe()));

        store.create(NewRoute::new("blog", "127.0.0.1", 4000)).await.unwrap();
        assert!(table.lookup("blog").is_none());
        watcher.change_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while table.lookup("blog").is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn burst_of_changes_is_one_reload() {
        let store = Arc::new(MemoryRouteStore::new());
        let table = RouteTable::new(store.clone());
        table.reload().await.unwrap();
        assert_eq!(store.fetch_count(), 1);

        let shutdown = Shutdown::new();
        let (watcher, changes) = StoreWatcher::new(Path::new("routes.json"));
        for _ in 0..5 {
            watcher.change_tx.send(()).unwrap();
        }
        let task = tokio::spawn(reload_on_change(table.clone(), changes, shutdown.subscribe()));

        tokio::time::timeout(Duration::from_secs(1), async {
            while store.fetch_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.fetch_count(), 2);

        // closing the channel ends the loop
        drop(watcher);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
