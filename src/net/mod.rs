//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Client side:
//!     TCP accept (axum::serve) ─────────────▶ plain endpoint
//!     TCP accept → tls.rs (rustls handshake) ▶ TLS endpoint
//!
//! Backend side:
//!     TCP connect → [tls.rs insecure connector] → stream.rs BackendStream
//! ```

pub mod stream;
pub mod tls;
