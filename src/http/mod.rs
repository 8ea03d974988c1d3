//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → routing::Dispatcher (Host → route → target)
//!     → forward.rs (rewrite, connect, send, stream back)
//!         ├─ headers.rs (hop-by-hop, X-Forwarded-*)
//!         └─ websocket.rs (upgrade tunnel)
//!     → response.rs (proxy-generated JSON errors)
//!     → Send to client
//! ```

pub mod forward;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use forward::{ForwardError, Forwarder, HyperForwarder};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{HttpServer, ProxyState};
