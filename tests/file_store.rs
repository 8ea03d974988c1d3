use std::sync::Arc;
use std::time::Duration;

use subdomain_proxy::admin::RouteAdmin;
use subdomain_proxy::routing::NewRoute;
use subdomain_proxy::store::{FileRouteStore, RouteStore};
use subdomain_proxy::RouteTable;

#[tokio::test]
async fn external_edit_is_picked_up_by_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");
    let table = RouteTable::new(Arc::new(FileRouteStore::new(&path)));
    assert_eq!(table.reload().await.unwrap(), 0);

    std::fs::write(
        &path,
        r#"[
            {"id": "7d2b7f0e-5c55-4c3f-9a51-0e8f3c2c9a10", "subDomain": "blog", "destHost": "10.0.0.5", "destPort": 8080},
            {"id": "1f0e2a44-3b7c-4d7e-8f5a-2b9c6d1e0f33", "subDomain": "Shop", "destHost": "10.0.0.6", "destPort": 80, "forwardSSL": true, "active": false}
        ]"#,
    )
    .unwrap();

    assert_eq!(table.reload().await.unwrap(), 2);
    assert_eq!(table.lookup("blog").unwrap().dest_port, 8080);
    assert!(table.lookup("shop").is_none());
}

#[tokio::test]
async fn admin_writes_persist_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");

    let admin = RouteAdmin::new(RouteTable::new(Arc::new(FileRouteStore::new(&path))));
    let created = admin.add_route(NewRoute::new("blog", "10.0.0.5", 8080)).await.unwrap();

    let reopened = FileRouteStore::new(&path);
    let routes = reopened.find_all().await.unwrap();
    assert_eq!(routes, vec![created.clone()]);

    let table = RouteTable::new(Arc::new(reopened));
    table.reload().await.unwrap();
    assert_eq!(table.lookup("blog").unwrap().id, created.id);
}

#[tokio::test]
async fn corrupt_file_keeps_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");
    let table = RouteTable::new(Arc::new(FileRouteStore::new(&path)));
    RouteAdmin::new(table.clone())
        .add_route(NewRoute::new("blog", "10.0.0.5", 8080))
        .await
        .unwrap();
    // let the reload scheduled by the write finish first
    tokio::time::sleep(Duration::from_millis(50)).await;
    table.reload().await.unwrap();
    let before = table.current_snapshot();

    std::fs::write(&path, "{ not json").unwrap();
    assert!(table.reload().await.is_err());
    assert!(Arc::ptr_eq(&before, &table.current_snapshot()));
    assert!(table.lookup("blog").is_some());
}
