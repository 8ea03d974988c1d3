//! Subdomain resolution from the Host header.
//!
//! # Grammar
//! ```text
//! host      = name [ ":" port ]
//! name      = label *( "." label )        ; compared lowercase
//! subdomain = leftmost label of `name`, when the trailing labels equal the base domain
//! ```
//!
//! # Design Decisions
//! - Label-wise comparison, no regex and no fixed offsets
//! - IP literals never resolve: a tenant is addressed by name only
//! - Resolution is pure; callers decide how to report failures

use std::net::IpAddr;

use axum::http::{header, Request};
use thiserror::Error;

/// Why a Host value could not be turned into a subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedHost {
    #[error("Host header is missing")]
    Missing,

    #[error("Host header is empty")]
    Empty,

    #[error("Host header is not valid ASCII")]
    NotAscii,

    #[error("invalid port in Host header {0:?}")]
    InvalidPort(String),

    #[error("IP literal {0:?} cannot address a subdomain")]
    IpLiteral(String),

    #[error("empty label in Host header {0:?}")]
    EmptyLabel(String),

    #[error("{host:?} is not under base domain {base:?}")]
    ForeignDomain { host: String, base: String },

    #[error("{0:?} has no subdomain label")]
    NoSubdomain(String),
}

/// Resolve `host` (a Host header value) against `base_domain`.
///
/// Returns the leftmost label left after removing the base-domain suffix.
pub fn resolve(host: &str, base_domain: &str) -> Result<String, MalformedHost> {
    let host = host.trim();
    if host.is_empty() {
        return Err(MalformedHost::Empty);
    }
    if host.starts_with('[') {
        return Err(MalformedHost::IpLiteral(host.to_string()));
    }

    let name = strip_port(host)?.to_ascii_lowercase();
    if name.parse::<IpAddr>().is_ok() {
        return Err(MalformedHost::IpLiteral(name));
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.iter().any(|l| l.is_empty()) {
        return Err(MalformedHost::EmptyLabel(name.clone()));
    }

    let base = base_domain.trim().to_ascii_lowercase();
    let base_labels: Vec<&str> = base.split('.').collect();

    if labels.len() < base_labels.len() || !labels.ends_with(&base_labels) {
        return Err(MalformedHost::ForeignDomain {
            host: name.clone(),
            base: base.clone(),
        });
    }
    if labels.len() == base_labels.len() {
        return Err(MalformedHost::NoSubdomain(name.clone()));
    }

    Ok(labels[0].to_string())
}

/// Resolve the subdomain of a request.
///
/// The Host header is authoritative; HTTP/2 requests carry the host in the URI
/// authority instead, which is used when the header is absent.
pub fn resolve_request<B>(req: &Request<B>, base_domain: &str) -> Result<String, MalformedHost> {
    match req.headers().get(header::HOST) {
        Some(value) => {
            let host = value.to_str().map_err(|_| MalformedHost::NotAscii)?;
            resolve(host, base_domain)
        }
        None => match req.uri().authority() {
            Some(authority) => resolve(authority.as_str(), base_domain),
            None => Err(MalformedHost::Missing),
        },
    }
}

fn strip_port(host: &str) -> Result<&str, MalformedHost> {
    match host.rsplit_once(':') {
        None => Ok(host),
        Some((name, port)) => {
            if name.contains(':') {
                // unbracketed IPv6
                return Err(MalformedHost::IpLiteral(host.to_string()));
            }
            if port.is_empty() || port.parse::<u16>().is_err() {
                return Err(MalformedHost::InvalidPort(host.to_string()));
            }
            Ok(name)
        }
    }
}
