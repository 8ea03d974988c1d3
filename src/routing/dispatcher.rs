//! Per-request dispatch: Host header → route → backend.
//!
//! # Data Flow
//! ```text
//! Resolving ──malformed host──▶ MalformedHost   (400)
//!     │
//!     ├──no active route──────▶ NotFound        (404)
//!     ▼
//!   Found → Forwarding ──error/timeout──▶ BackendFailed (500)
//!                 │
//!                 └──response─────────▶ Delivered (backend status)
//! ```
//!
//! # Design Decisions
//! - The route snapshot is captured once per request, so a reload that
//!   lands mid-request never changes the route chosen for it
//! - The listener the request arrived on selects the backend port
//! - Backend failures end this request only; the dispatcher keeps serving

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
};

use crate::http::forward::{ForwardError, Forwarder};
use crate::http::response;
use crate::routing::host::{self, MalformedHost};
use crate::routing::route::{Endpoint, Target};
use crate::routing::table::RouteTable;

/// Where a request is in its dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchState {
    Resolving,
    Found,
    NotFound,
    MalformedHost,
    Forwarding,
    BackendFailed,
    Delivered,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchState::NotFound
                | DispatchState::MalformedHost
                | DispatchState::BackendFailed
                | DispatchState::Delivered
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispatchState::Resolving => "resolving",
            DispatchState::Found => "found",
            DispatchState::NotFound => "not_found",
            DispatchState::MalformedHost => "malformed_host",
            DispatchState::Forwarding => "forwarding",
            DispatchState::BackendFailed => "backend_failed",
            DispatchState::Delivered => "delivered",
        }
    }
}

/// Outcome of dispatching one request.
#[derive(Debug)]
pub enum ProxyDecision {
    MalformedHost(MalformedHost),
    NotFound {
        sub_domain: String,
    },
    BackendFailed {
        sub_domain: String,
        target: Target,
        error: ForwardError,
    },
    Delivered {
        sub_domain: String,
        target: Target,
        response: Response<Body>,
    },
}

impl ProxyDecision {
    /// The terminal state this decision represents.
    pub fn state(&self) -> DispatchState {
        match self {
            ProxyDecision::MalformedHost(_) => DispatchState::MalformedHost,
            ProxyDecision::NotFound { .. } => DispatchState::NotFound,
            ProxyDecision::BackendFailed { .. } => DispatchState::BackendFailed,
            ProxyDecision::Delivered { .. } => DispatchState::Delivered,
        }
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            ProxyDecision::BackendFailed { target, .. } | ProxyDecision::Delivered { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl IntoResponse for ProxyDecision {
    fn into_response(self) -> axum::response::Response {
        match self {
            ProxyDecision::MalformedHost(e) => response::json_error(StatusCode::BAD_REQUEST, &e.to_string()),
            ProxyDecision::NotFound { .. } => response::unknown_route(),
            ProxyDecision::BackendFailed { .. } => response::backend_failure(),
            ProxyDecision::Delivered { response, .. } => response,
        }
    }
}

/// Routes requests to backends using the current route snapshot.
pub struct Dispatcher {
    table: RouteTable,
    forwarder: Arc<dyn Forwarder>,
    base_domain: String,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        table: RouteTable,
        forwarder: Arc<dyn Forwarder>,
        base_domain: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            table,
            forwarder,
            base_domain: base_domain.into().to_ascii_lowercase(),
            timeout,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Dispatch one request that arrived on `endpoint`.
    pub async fn dispatch(&self, mut request: Request<Body>, endpoint: Endpoint) -> ProxyDecision {
        let snapshot = self.table.current_snapshot();
        let mut state = DispatchState::Resolving;

        let sub_domain = match host::resolve_request(&request, &self.base_domain) {
            Ok(sub_domain) => sub_domain,
            Err(e) => {
                advance(&mut state, DispatchState::MalformedHost);
                tracing::debug!(error = %e, "Rejected request host");
                return ProxyDecision::MalformedHost(e);
            }
        };

        let Some(route) = snapshot.lookup(&sub_domain) else {
            advance(&mut state, DispatchState::NotFound);
            tracing::debug!(
                sub_domain = %sub_domain,
                snapshot_version = snapshot.version(),
                "No active route"
            );
            return ProxyDecision::NotFound { sub_domain };
        };
        advance(&mut state, DispatchState::Found);

        let target = route.target(endpoint);
        request.extensions_mut().insert(endpoint);
        advance(&mut state, DispatchState::Forwarding);
        tracing::debug!(
            sub_domain = %sub_domain,
            route_id = %route.id,
            target = %target,
            "Forwarding request"
        );

        match self.forwarder.forward(request, &target, self.timeout).await {
            Ok(response) => {
                advance(&mut state, DispatchState::Delivered);
                ProxyDecision::Delivered {
                    sub_domain,
                    target,
                    response,
                }
            }
            Err(error) => {
                advance(&mut state, DispatchState::BackendFailed);
                tracing::error!(
                    sub_domain = %sub_domain,
                    route_id = %route.id,
                    target = %target,
                    kind = error.kind(),
                    error = %error,
                    "Backend request failed"
                );
                ProxyDecision::BackendFailed {
                    sub_domain,
                    target,
                    error,
                }
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_domain", &self.base_domain)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn advance(state: &mut DispatchState, next: DispatchState) {
    debug_assert!(!state.is_terminal(), "dispatch already finished in {:?}", state);
    tracing::trace!(from = state.as_str(), to = next.as_str(), "Dispatch state");
    *state = next;
}
