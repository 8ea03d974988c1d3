mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", API_KEY));
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn blog(port: u16) -> Value {
    json!({ "subDomain": "blog", "destHost": "127.0.0.1", "destPort": port })
}

#[tokio::test]
async fn requests_without_key_are_rejected() {
    let proxy = start_proxy_with(vec![]).await;
    let app = proxy.http.admin_router();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/routes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/routes")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], br#"{"err":"unauthorized"}"#);
}

#[tokio::test]
async fn route_lifecycle_through_api() {
    let proxy = start_proxy_with(vec![]).await;
    let app = proxy.http.admin_router();

    let (status, created) = call(&app, Method::POST, "/api/routes", Some(blog(8080))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["subDomain"], "blog");
    assert_eq!(created["forwardSSL"], false);
    assert_eq!(created["active"], true);
    let id = created["id"].as_str().unwrap().to_string();

    // served before any reload
    assert_eq!(proxy.table.lookup("blog").unwrap().dest_port, 8080);

    let (status, listed) = call(&app, Method::GET, "/api/routes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, fetched) = call(&app, Method::GET, &format!("/api/routes/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, updated) = call(&app, Method::PUT, &format!("/api/routes/{}", id), Some(blog(9090))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["destPort"], 9090);

    let (status, reloaded) = call(&app, Method::POST, "/api/routes/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reloaded["routes"], 1);
    assert_eq!(proxy.table.lookup("blog").unwrap().dest_port, 9090);

    let (status, removed) = call(&app, Method::DELETE, &format!("/api/routes/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["id"], id.as_str());

    tokio::time::sleep(Duration::from_millis(20)).await;
    call(&app, Method::POST, "/api/routes/reload", None).await;
    assert!(proxy.table.lookup("blog").is_none());

    let (status, _) = call(&app, Method::GET, &format!("/api/routes/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_active_subdomain_conflicts() {
    let proxy = start_proxy_with(vec![]).await;
    let app = proxy.http.admin_router();

    let (status, _) = call(&app, Method::POST, "/api/routes", Some(blog(8080))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app, Method::POST, "/api/routes", Some(blog(8081))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["err"].as_str().unwrap().contains("blog"));
}

#[tokio::test]
async fn invalid_payloads_are_400() {
    let proxy = start_proxy_with(vec![]).await;
    let app = proxy.http.admin_router();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/routes",
        Some(json!({ "subDomain": "bad.label", "destHost": "127.0.0.1", "destPort": 80 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["err"].is_string());

    let (status, body) = call(&app, Method::POST, "/api/routes", Some(json!({ "subDomain": "blog" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["err"].is_string());

    let (status, _) = call(&app, Method::GET, "/api/routes/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn store_outage_is_503_and_table_untouched() {
    let proxy = start_proxy_with(vec![]).await;
    let app = proxy.http.admin_router();
    let before = proxy.table.current_snapshot();

    proxy.store.set_available(false);
    let (status, body) = call(&app, Method::POST, "/api/routes", Some(blog(8080))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["err"].is_string());
    assert!(std::sync::Arc::ptr_eq(&before, &proxy.table.current_snapshot()));
}

#[tokio::test]
async fn status_reports_snapshot() {
    let proxy = start_proxy_with(vec![route("a", refused_addr()), route("b", refused_addr())]).await;
    let app = proxy.http.admin_router();

    let (status, body) = call(&app, Method::GET, "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["routes"], 2);
    assert_eq!(body["active_routes"], 2);
}

#[tokio::test]
async fn route_added_through_api_is_proxied_at_once() {
    let backend = start_echo_backend("fresh").await;
    let proxy = start_proxy_with(vec![]).await;
    let app = proxy.http.admin_router();

    let payload = json!({ "subDomain": "fresh", "destHost": "127.0.0.1", "destPort": backend.port() });
    let (status, _) = call(&app, Method::POST, "/api/routes", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    let client = proxy.client(&["fresh.rcdinfo.fr"]);
    let echo: Value = client
        .get(proxy.url("fresh.rcdinfo.fr", "/hello"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo["backend"], "fresh");
    assert_eq!(echo["path"], "/hello");
}
