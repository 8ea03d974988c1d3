//! In-memory route store.
//!
//! Used for ephemeral deployments (`store.kind = "memory"`) and as the fault
//! injection point in tests: availability can be toggled and every `find_all` can
//! be delayed and counted.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_unique, RouteStore, StoreError};
use crate::routing::route::{NewRoute, Route, RouteId};

#[derive(Debug)]
pub struct MemoryRouteStore {
    routes: RwLock<Vec<Route>>,
    available: AtomicBool,
    fetches: AtomicUsize,
    fetch_latency_ms: AtomicU64,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::with_routes(Vec::new())
    }

    /// Seed the store as-is. Constraints are not checked, so duplicate active
    /// subdomains can be loaded on purpose.
    pub fn with_routes(routes: Vec<Route>) -> Self {
        Self {
            routes: RwLock::new(routes),
            available: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
            fetch_latency_ms: AtomicU64::new(0),
        }
    }

    /// Make every operation fail with `StoreError::Unavailable` while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay applied to each `find_all`.
    pub fn set_fetch_latency(&self, latency: Duration) {
        self.fetch_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `find_all` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".into()))
        }
    }
}

impl Default for MemoryRouteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn find_all(&self) -> Result<Vec<Route>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let latency = self.fetch_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.ensure_available()?;
        Ok(self.routes.read().await.clone())
    }

    async fn create(&self, new: NewRoute) -> Result<Route, StoreError> {
        self.ensure_available()?;
        let route = Route::from_new(RouteId::new(), new).normalized();
        route.validate()?;

        let mut routes = self.routes.write().await;
        check_unique(&routes, &route)?;
        routes.push(route.clone());
        Ok(route)
    }

    async fn save(&self, route: Route) -> Result<Route, StoreError> {
        self.ensure_available()?;
        let route = route.normalized();
        route.validate()?;

        let mut routes = self.routes.write().await;
        check_unique(&routes, &route)?;
        let slot = routes
            .iter_mut()
            .find(|r| r.id == route.id)
            .ok_or(StoreError::NotFound(route.id))?;
        *slot = route.clone();
        Ok(route)
    }

    async fn delete(&self, route: &Route) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut routes = self.routes.write().await;
        let before = routes.len();
        routes.retain(|r| r.id != route.id);
        if routes.len() == before {
            return Err(StoreError::NotFound(route.id));
        }
        Ok(())
    }
}
