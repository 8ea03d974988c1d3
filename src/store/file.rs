//! JSON file route store.
//!
//! # Responsibilities
//! - Persist routes as a JSON array, in insertion order
//! - Re-read the file on every `find_all` so external edits are authoritative
//! - Enforce active-subdomain uniqueness on writes
//!
//! # Design Decisions
//! - Writes go to a sibling temp file and are renamed into place
//! - A missing file is an empty store, not an error
//! - Writers are serialized by an async mutex; readers are not

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{check_unique, RouteStore, StoreError};
use crate::routing::route::{NewRoute, Route, RouteId};

#[derive(Debug)]
pub struct FileRouteStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRouteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<Route>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, routes: &[Route]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(routes)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RouteStore for FileRouteStore {
    async fn find_all(&self) -> Result<Vec<Route>, StoreError> {
        self.read().await
    }

    async fn create(&self, new: NewRoute) -> Result<Route, StoreError> {
        let route = Route::from_new(RouteId::new(), new).normalized();
        route.validate()?;

        let _guard = self.write_lock.lock().await;
        let mut routes = self.read().await?;
        check_unique(&routes, &route)?;
        routes.push(route.clone());
        self.write(&routes).await?;
        Ok(route)
    }

    async fn save(&self, route: Route) -> Result<Route, StoreError> {
        let route = route.normalized();
        route.validate()?;

        let _guard = self.write_lock.lock().await;
        let mut routes = self.read().await?;
        check_unique(&routes, &route)?;
        let slot = routes
            .iter_mut()
            .find(|r| r.id == route.id)
            .ok_or(StoreError::NotFound(route.id))?;
        *slot = route.clone();
        self.write(&routes).await?;
        Ok(route)
    }

    async fn delete(&self, route: &Route) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut routes = self.read().await?;
        let before = routes.len();
        routes.retain(|r| r.id != route.id);
        if routes.len() == before {
            return Err(StoreError::NotFound(route.id));
        }
        self.write(&routes).await
    }
}
