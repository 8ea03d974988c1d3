//! Route administration.
//!
//! Every write is persisted first. Only a successful write touches the live
//! table: an added route is appended immediately, and every write schedules a
//! background reload so the table converges on the store.

use crate::routing::{NewRoute, Route, RouteId, RouteTable};
use crate::store::StoreError;

#[derive(Clone, Debug)]
pub struct RouteAdmin {
    table: RouteTable,
}

impl RouteAdmin {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// All persisted routes, in store order.
    pub async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        self.table.store().find_all().await
    }

    pub async fn find_route(&self, id: RouteId) -> Result<Route, StoreError> {
        self.table.store().find(id).await?.ok_or(StoreError::NotFound(id))
    }

    /// Persist a new route. The route is served as soon as this returns,
    /// before the background reload confirms it.
    pub async fn add_route(&self, new: NewRoute) -> Result<Route, StoreError> {
        let new = new.normalized();
        new.validate()?;

        let route = self.table.store().create(new).await?;
        self.table.append(route.clone());
        self.converge();
        Ok(route)
    }

    /// Persist changes to an existing route.
    pub async fn edit_route(&self, route: Route) -> Result<Route, StoreError> {
        let route = route.normalized();
        route.validate()?;

        let saved = self.table.store().save(route).await?;
        self.converge();
        Ok(saved)
    }

    pub async fn remove_route(&self, route: &Route) -> Result<(), StoreError> {
        self.table.store().delete(route).await?;
        self.converge();
        Ok(())
    }

    /// Reload the table now and wait for the result.
    pub async fn reload(&self) -> Result<usize, StoreError> {
        self.table.reload().await
    }

    fn converge(&self) {
        self.table.invalidate();
        self.table.reload_in_background();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteValidationError;
    use crate::store::{MemoryRouteStore, RouteStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn admin_with(store: Arc<MemoryRouteStore>) -> RouteAdmin {
        RouteAdmin::new(RouteTable::new(store))
    }

    /// Wait for background reloads to publish.
    async fn settle(admin: &RouteAdmin) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        admin.reload().await.unwrap();
    }

    #[tokio::test]
    async fn added_route_is_served_immediately() {
        let admin = admin_with(Arc::new(MemoryRouteStore::new()));

        let route = admin.add_route(NewRoute::new("Blog", "10.0.0.5", 8080)).await.unwrap();
        assert_eq!(route.sub_domain, "blog");
        assert_eq!(admin.table().lookup("blog").unwrap().id, route.id);
    }

    #[tokio::test]
    async fn removed_route_disappears_after_reload() {
        let admin = admin_with(Arc::new(MemoryRouteStore::new()));
        let route = admin.add_route(NewRoute::new("blog", "10.0.0.5", 8080)).await.unwrap();

        admin.remove_route(&route).await.unwrap();
        settle(&admin).await;
        assert!(admin.table().lookup("blog").is_none());
    }

    #[tokio::test]
    async fn edit_is_visible_after_reload() {
        let admin = admin_with(Arc::new(MemoryRouteStore::new()));
        let mut route = admin.add_route(NewRoute::new("blog", "10.0.0.5", 8080)).await.unwrap();

        route.dest_port = 9090;
        admin.edit_route(route.clone()).await.unwrap();
        settle(&admin).await;
        assert_eq!(admin.table().lookup("blog").unwrap().dest_port, 9090);

        route.active = false;
        admin.edit_route(route).await.unwrap();
        settle(&admin).await;
        assert!(admin.table().lookup("blog").is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_table_untouched() {
        let store = Arc::new(MemoryRouteStore::new());
        let admin = admin_with(store.clone());
        let before = admin.table().current_snapshot();

        store.set_available(false);
        let err = admin.add_route(NewRoute::new("blog", "10.0.0.5", 8080)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(Arc::ptr_eq(&before, &admin.table().current_snapshot()));
    }

    #[tokio::test]
    async fn invalid_route_is_rejected_before_store() {
        let admin = admin_with(Arc::new(MemoryRouteStore::new()));

        let err = admin.add_route(NewRoute::new("", "10.0.0.5", 8080)).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(RouteValidationError::SubDomain(_))));
        assert!(admin.list_routes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_unknown_route_is_not_found() {
        let admin = admin_with(Arc::new(MemoryRouteStore::new()));
        let id = RouteId::new();
        assert_eq!(admin.find_route(id).await.unwrap_err(), StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn list_reflects_store_order() {
        let store = Arc::new(MemoryRouteStore::new());
        let admin = admin_with(store.clone());
        admin.add_route(NewRoute::new("a", "10.0.0.1", 80)).await.unwrap();
        admin.add_route(NewRoute::new("b", "10.0.0.2", 80)).await.unwrap();

        let subs: Vec<_> = admin
            .list_routes()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.sub_domain)
            .collect();
        assert_eq!(subs, vec!["a", "b"]);
        assert_eq!(store.find_all().await.unwrap().len(), 2);
    }
}
