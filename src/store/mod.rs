//! Durable route storage.
//!
//! # Data Flow
//! ```text
//! RouteAdmin (create/save/delete)
//!     → RouteStore implementation (memory.rs, file.rs)
//!     → RouteTable::reload() reads find_all()
//!
//! External edit of the routes file:
//!     watcher.rs detects change → RouteTable::reload()
//! ```
//!
//! # Design Decisions
//! - Stores own the active-subdomain uniqueness constraint; the table only tolerates
//!   violations
//! - `find_all` returns records in a stable iteration order (insertion order)
//! - Errors are `Clone` so one fetch result can be shared by coalesced reloads

pub mod file;
pub mod memory;
pub mod watcher;

use async_trait::async_trait;
use thiserror::Error;

use crate::routing::route::{NewRoute, Route, RouteId, RouteValidationError};

pub use file::FileRouteStore;
pub use memory::MemoryRouteStore;
pub use watcher::StoreWatcher;

/// Errors reported by a route store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing storage could not be reached or read.
    #[error("route store unavailable: {0}")]
    Unavailable(String),

    /// Another active route already uses this subdomain.
    #[error("an active route for subdomain {0:?} already exists")]
    Conflict(String),

    /// No route with this id.
    #[error("route {0} not found")]
    NotFound(RouteId),

    /// The record violates a field constraint.
    #[error("invalid route: {0}")]
    Invalid(#[from] RouteValidationError),

    /// Stored data could not be decoded or encoded.
    #[error("route store data is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// CRUD access to persisted routes.
#[async_trait]
pub trait RouteStore: Send + Sync + 'static {
    /// All routes, in store iteration order.
    async fn find_all(&self) -> Result<Vec<Route>, StoreError>;

    /// One route by id.
    async fn find(&self, id: RouteId) -> Result<Option<Route>, StoreError> {
        Ok(self.find_all().await?.into_iter().find(|r| r.id == id))
    }

    /// Persist a new route and assign its id.
    async fn create(&self, new: NewRoute) -> Result<Route, StoreError>;

    /// Overwrite an existing route.
    async fn save(&self, route: Route) -> Result<Route, StoreError>;

    /// Remove a route.
    async fn delete(&self, route: &Route) -> Result<(), StoreError>;
}

/// Reject `candidate` if another active route already owns its subdomain.
pub(crate) fn check_unique(existing: &[Route], candidate: &Route) -> Result<(), StoreError> {
    if !candidate.active {
        return Ok(());
    }
    let taken = existing
        .iter()
        .any(|r| r.id != candidate.id && r.active && r.sub_domain == candidate.sub_domain);
    if taken {
        return Err(StoreError::Conflict(candidate.sub_domain.clone()));
    }
    Ok(())
}
