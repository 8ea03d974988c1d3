//! Error responses produced by the proxy itself.
//!
//! Every proxy-generated error is a JSON object `{"err": <message>}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Body message for a host with no active route.
pub const UNKNOWN_ROUTE: &str = "Proxy don't know your route";

/// Body message for a backend that failed or did not answer in time.
pub const BACKEND_FAILURE: &str = "An error occured";

pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "err": message }))).into_response()
}

pub fn unknown_route() -> Response {
    json_error(StatusCode::NOT_FOUND, UNKNOWN_ROUTE)
}

pub fn backend_failure() -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, BACKEND_FAILURE)
}
