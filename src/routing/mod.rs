//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (Host header, endpoint)
//!     → host.rs (Host → subdomain)
//!     → table.rs (subdomain → active Route, from the current snapshot)
//!     → dispatcher.rs (Route + endpoint → Target, forward, decide)
//!     → Return: ProxyDecision
//!
//! Route Loading:
//!     RouteStore::find_all()
//!     → Snapshot::new (normalize, index active routes)
//!     → atomic publish (ArcSwap)
//! ```
//!
//! # Design Decisions
//! - Lookups never wait on the store; they read the last published snapshot
//! - Exact label matching on the leftmost subdomain label only
//! - Deterministic: with duplicate subdomains the first route in store order wins

pub mod dispatcher;
pub mod host;
pub mod route;
pub mod table;

pub use dispatcher::{DispatchState, Dispatcher, ProxyDecision};
pub use host::MalformedHost;
pub use route::{BackendScheme, Endpoint, NewRoute, Route, RouteId, RouteValidationError, Target};
pub use table::{RouteTable, Snapshot};
