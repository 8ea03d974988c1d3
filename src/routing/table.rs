//! Route table: the published snapshot and its synchronization with the store.
//!
//! # Responsibilities
//! - Hold the current [`Snapshot`] behind an `ArcSwap` (wait-free reads)
//! - Rebuild the snapshot from the store on `reload()`
//! - Keep the previous snapshot when the store fails
//! - Coalesce concurrent reloads into one store fetch
//!
//! # Design Decisions
//! - Snapshots are immutable; every change publishes a new `Arc<Snapshot>`
//! - Duplicate active subdomains resolve to the first route in store order
//! - Writers are serialized through a single in-flight fetch slot; readers never
//!   touch it
//! - A mutation epoch prevents a reload issued after a write from joining a fetch
//!   that started before the write

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::observability::metrics;
use crate::routing::route::Route;
use crate::store::{RouteStore, StoreError};

/// An immutable, fully built view of the routes.
#[derive(Debug, Default)]
pub struct Snapshot {
    routes: Vec<Route>,
    /// subdomain -> index of the first active route with it
    index: HashMap<String, usize>,
    version: u64,
}

impl Snapshot {
    pub fn new(routes: Vec<Route>, version: u64) -> Self {
        let routes: Vec<Route> = routes.into_iter().map(Route::normalized).collect();
        let mut index = HashMap::with_capacity(routes.len());
        for (i, route) in routes.iter().enumerate() {
            if route.active {
                index.entry(route.sub_domain.clone()).or_insert(i);
            }
        }
        Self { routes, index, version }
    }

    /// First active route for `sub_domain` (already lowercase).
    pub fn lookup(&self, sub_domain: &str) -> Option<&Route> {
        self.index.get(sub_domain).map(|&i| &self.routes[i])
    }

    /// All routes, active or not, in store order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Number of distinct subdomains that resolve.
    pub fn active_count(&self) -> usize {
        self.index.len()
    }

    /// Publication counter; strictly increases with every published snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }
}

type Fetch = Shared<BoxFuture<'static, Result<usize, StoreError>>>;

struct InFlight {
    id: u64,
    /// Mutation epoch observed when the fetch started.
    epoch: u64,
    fetch: Fetch,
}

struct Inner {
    current: ArcSwap<Snapshot>,
    store: Arc<dyn RouteStore>,
    in_flight: Mutex<Option<InFlight>>,
    epoch: AtomicU64,
    next_version: AtomicU64,
    next_fetch_id: AtomicU64,
}

/// Shared handle to the route table. Cloning is cheap.
#[derive(Clone)]
pub struct RouteTable {
    inner: Arc<Inner>,
}

impl RouteTable {
    /// An empty table backed by `store`. Call [`reload`](Self::reload) to fill it.
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: ArcSwap::from_pointee(Snapshot::default()),
                store,
                in_flight: Mutex::new(None),
                epoch: AtomicU64::new(0),
                next_version: AtomicU64::new(1),
                next_fetch_id: AtomicU64::new(0),
            }),
        }
    }

    /// The store this table reads from.
    pub fn store(&self) -> &Arc<dyn RouteStore> {
        &self.inner.store
    }

    /// The snapshot published at the time of the call.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.inner.current.load_full()
    }

    /// Look up a subdomain in the current snapshot. Never blocks and never does I/O.
    pub fn lookup(&self, sub_domain: &str) -> Option<Route> {
        self.inner.current.load().lookup(sub_domain).cloned()
    }

    /// Publish `route` on top of the current snapshot without asking the store.
    ///
    /// Used right after a route is persisted so it is served before the
    /// confirming reload lands.
    pub fn append(&self, route: Route) {
        let route = route.normalized();
        self.inner.current.rcu(|current| {
            let mut routes = current.routes.clone();
            routes.push(route.clone());
            Snapshot::new(routes, self.inner.bump_version())
        });
        metrics::record_route_count(self.inner.current.load().len());
    }

    /// Record that the store changed. Reloads started after this call will not be
    /// satisfied by a fetch that began before it.
    pub fn invalidate(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Rebuild the snapshot from the store and publish it.
    ///
    /// Returns the number of routes published. On error the previous snapshot
    /// stays in place. Concurrent callers share a single store fetch.
    pub async fn reload(&self) -> Result<usize, StoreError> {
        loop {
            let wanted = self.inner.epoch.load(Ordering::Acquire);
            let (fetch, fresh) = self.join_or_start(wanted);
            let result = fetch.await;
            if fresh {
                return result;
            }
        }
    }

    /// Run `reload` on the runtime without waiting for it.
    pub fn reload_in_background(&self) {
        let table = self.clone();
        tokio::spawn(async move {
            // failures are logged in publish
            let _ = table.reload().await;
        });
    }

    fn join_or_start(&self, wanted: u64) -> (Fetch, bool) {
        let mut slot = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(in_flight) = slot.as_ref() {
            return (in_flight.fetch.clone(), in_flight.epoch >= wanted);
        }

        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let fetch = async move {
            let result = inner.fetch_and_publish().await;
            let mut slot = inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|f| f.id == id) {
                *slot = None;
            }
            result
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            epoch: wanted,
            fetch: fetch.clone(),
        });
        (fetch, true)
    }
}

impl Inner {
    fn bump_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    async fn fetch_and_publish(&self) -> Result<usize, StoreError> {
        match self.store.find_all().await {
            Ok(routes) => {
                // rcu keeps versions monotonic when an append races this publish
                self.current
                    .rcu(|_| Snapshot::new(routes.clone(), self.bump_version()));
                let published = self.current.load();
                let count = published.len();
                let version = published.version();

                metrics::record_reload(true);
                metrics::record_route_count(count);
                tracing::debug!(routes = count, version, "Route table reloaded");
                Ok(count)
            }
            Err(e) => {
                metrics::record_reload(false);
                tracing::error!(
                    error = %e,
                    routes = self.current.load().len(),
                    "Route reload failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.current.load();
        f.debug_struct("RouteTable")
            .field("version", &snapshot.version())
            .field("routes", &snapshot.len())
            .finish()
    }
}
