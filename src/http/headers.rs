//! Header manipulation for forwarded traffic.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//!
//! # Design Decisions
//! - Headers named in `Connection` are hop-by-hop as well
//! - Upgrade handshakes keep `Connection: upgrade` and `Upgrade`
//! - Existing X-Forwarded-For is extended, never replaced

use std::net::SocketAddr;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, UPGRADE};

use crate::routing::Endpoint;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Remove hop-by-hop headers. With `keep_upgrade`, the upgrade handshake
/// headers survive so the next hop can switch protocols.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, keep_upgrade: bool) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        if keep_upgrade && name == UPGRADE {
            continue;
        }
        headers.remove(&name);
    }

    for name in HOP_BY_HOP {
        headers.remove(name);
    }

    if keep_upgrade {
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    } else {
        headers.remove(UPGRADE);
    }
}

/// Append the client address and original request facts for the backend.
pub fn add_forwarded(
    headers: &mut HeaderMap,
    peer: Option<SocketAddr>,
    endpoint: Option<Endpoint>,
    original_host: Option<&str>,
) {
    if let Some(peer) = peer {
        let ip = peer.ip().to_string();
        let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, ip),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Some(endpoint) = endpoint {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(endpoint.scheme()));
    }

    if let Some(host) = original_host.and_then(|h| HeaderValue::from_str(h).ok()) {
        headers.insert(X_FORWARDED_HOST, host);
    }
}
