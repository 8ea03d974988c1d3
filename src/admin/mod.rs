//! Route administration API.
//!
//! # Endpoints
//! ```text
//! GET    /api/status           snapshot summary
//! GET    /api/routes           all persisted routes
//! POST   /api/routes           create (201)
//! GET    /api/routes/{id}      one route
//! PUT    /api/routes/{id}      replace fields of an existing route
//! DELETE /api/routes/{id}      remove, returns the removed route
//! POST   /api/routes/reload    reload the table now
//! ```
//!
//! All endpoints require `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::AdminConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};

pub use routes::RouteAdmin;

#[derive(Clone)]
pub struct AdminState {
    pub admin: RouteAdmin,
    pub api_key: Arc<str>,
}

#[allow(deprecated)]
pub fn setup_admin_router(admin: RouteAdmin, config: &AdminConfig) -> Router {
    let state = AdminState {
        admin,
        api_key: Arc::from(config.api_key.as_str()),
    };

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/routes", get(list_routes).post(create_route))
        .route("/api/routes/reload", post(reload_routes))
        .route(
            "/api/routes/{id}",
            get(get_route).put(update_route).delete(delete_route),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}
