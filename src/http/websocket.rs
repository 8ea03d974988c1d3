//! WebSocket (and other HTTP/1.1 upgrade) tunnelling.
//!
//! # Data Flow
//! ```text
//! Client ──upgrade request──▶ Proxy ──upgrade request──▶ Backend
//! Client ◀──101 Switching──── Proxy ◀──101 Switching──── Backend
//! Client ◀══════ raw bytes ══▶ Proxy ◀══════ raw bytes ══▶ Backend
//! ```
//!
//! # Design Decisions
//! - The handshake goes through the normal forwarding path; only after both
//!   sides switched protocols are the two upgraded streams spliced together
//! - Byte-level copy, no frame parsing
//! - When either side closes, the other is shut down

use axum::http::{header, HeaderMap};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

/// True when the request asks the next hop to switch protocols.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && headers.contains_key(header::UPGRADE)
}

/// Splice the client and backend connections once both upgrades complete.
///
/// `guard` is held until the tunnel ends.
pub fn spawn_tunnel<G>(client: OnUpgrade, backend: OnUpgrade, guard: G)
where
    G: Send + 'static,
{
    tokio::spawn(async move {
        let _guard = guard;
        let (client, backend) = match tokio::try_join!(client, backend) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "Upgrade failed");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut backend = TokioIo::new(backend);
        match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
            Ok((to_backend, to_client)) => {
                tracing::debug!(to_backend, to_client, "Upgraded connection closed");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Upgraded connection ended with error");
            }
        }
    });
}
