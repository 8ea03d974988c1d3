use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::admin::AdminState;
use crate::http::response::json_error;
use crate::routing::{NewRoute, Route, RouteId};
use crate::store::StoreError;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub routes: usize,
    pub active_routes: usize,
    pub snapshot_version: u64,
}

/// Admin API failure, rendered as `{"err": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_error(self.status, &self.message)
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.admin.table().current_snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        routes: snapshot.len(),
        active_routes: snapshot.active_count(),
        snapshot_version: snapshot.version(),
    })
}

pub async fn list_routes(State(state): State<AdminState>) -> Result<Json<Vec<Route>>, ApiError> {
    Ok(Json(state.admin.list_routes().await?))
}

pub async fn get_route(
    State(state): State<AdminState>,
    id: Result<Path<RouteId>, PathRejection>,
) -> Result<Json<Route>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.admin.find_route(id).await?))
}

pub async fn create_route(
    State(state): State<AdminState>,
    payload: Result<Json<NewRoute>, JsonRejection>,
) -> Result<(StatusCode, Json<Route>), ApiError> {
    let Json(new) = payload?;
    let route = state.admin.add_route(new).await?;
    Ok((StatusCode::CREATED, Json(route)))
}

pub async fn update_route(
    State(state): State<AdminState>,
    id: Result<Path<RouteId>, PathRejection>,
    payload: Result<Json<NewRoute>, JsonRejection>,
) -> Result<Json<Route>, ApiError> {
    let Path(id) = id?;
    let Json(update) = payload?;
    let route = state.admin.edit_route(Route::from_new(id, update)).await?;
    Ok(Json(route))
}

pub async fn delete_route(
    State(state): State<AdminState>,
    id: Result<Path<RouteId>, PathRejection>,
) -> Result<Json<Route>, ApiError> {
    let Path(id) = id?;
    let route = state.admin.find_route(id).await?;
    state.admin.remove_route(&route).await?;
    Ok(Json(route))
}

pub async fn reload_routes(State(state): State<AdminState>) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.admin.reload().await?;
    Ok(Json(json!({ "routes": count })))
}
