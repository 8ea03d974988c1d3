//! Route records and backend targets.
//!
//! Field names serialize in camelCase (`subDomain`, `destHost`, `forwardSSL`) so
//! stored records and admin payloads share one shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque route identifier, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(Uuid);

impl RouteId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RouteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RouteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

fn default_active() -> bool {
    true
}

/// A persisted mapping from a subdomain to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: RouteId,
    pub sub_domain: String,
    pub dest_host: String,
    pub dest_port: u16,
    /// Backend port for requests received on the TLS endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_dest_port: Option<u16>,
    #[serde(default, rename = "forwardSSL")]
    pub forward_ssl: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Route {
    /// Build a route from a creation request and a store-assigned id.
    pub fn from_new(id: RouteId, new: NewRoute) -> Self {
        Self {
            id,
            sub_domain: new.sub_domain,
            dest_host: new.dest_host,
            dest_port: new.dest_port,
            tls_dest_port: new.tls_dest_port,
            forward_ssl: new.forward_ssl,
            active: new.active,
        }
    }

    /// Lowercase the routing key and trim the backend host.
    pub fn normalized(mut self) -> Self {
        self.sub_domain = self.sub_domain.trim().to_ascii_lowercase();
        self.dest_host = self.dest_host.trim().to_string();
        self
    }

    /// Check the fields a store must never persist.
    pub fn validate(&self) -> Result<(), RouteValidationError> {
        validate_fields(&self.sub_domain, &self.dest_host, self.dest_port, self.tls_dest_port)
    }

    /// Backend target for a request received on `endpoint`.
    pub fn target(&self, endpoint: Endpoint) -> Target {
        let port = match endpoint {
            Endpoint::Tls => self.tls_dest_port.unwrap_or(self.dest_port),
            Endpoint::Plain => self.dest_port,
        };
        Target {
            scheme: if self.forward_ssl { BackendScheme::Https } else { BackendScheme::Http },
            host: self.dest_host.clone(),
            port,
        }
    }
}

/// Payload for creating a route; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoute {
    pub sub_domain: String,
    pub dest_host: String,
    pub dest_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_dest_port: Option<u16>,
    #[serde(default, rename = "forwardSSL")]
    pub forward_ssl: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl NewRoute {
    /// Plain-HTTP, active route to `dest_host:dest_port`.
    pub fn new(sub_domain: impl Into<String>, dest_host: impl Into<String>, dest_port: u16) -> Self {
        Self {
            sub_domain: sub_domain.into(),
            dest_host: dest_host.into(),
            dest_port,
            tls_dest_port: None,
            forward_ssl: false,
            active: true,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.sub_domain = self.sub_domain.trim().to_ascii_lowercase();
        self.dest_host = self.dest_host.trim().to_string();
        self
    }

    pub fn validate(&self) -> Result<(), RouteValidationError> {
        validate_fields(&self.sub_domain, &self.dest_host, self.dest_port, self.tls_dest_port)
    }
}

/// Why a route record was rejected before persistence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteValidationError {
    #[error("subDomain must be a single DNS label (letters, digits, '-'), got {0:?}")]
    SubDomain(String),

    #[error("destHost must not be empty")]
    EmptyDestHost,

    #[error("port must be in 1..=65535")]
    Port,
}

fn validate_fields(
    sub_domain: &str,
    dest_host: &str,
    dest_port: u16,
    tls_dest_port: Option<u16>,
) -> Result<(), RouteValidationError> {
    if !is_dns_label(sub_domain) {
        return Err(RouteValidationError::SubDomain(sub_domain.to_string()));
    }
    if dest_host.trim().is_empty() {
        return Err(RouteValidationError::EmptyDestHost);
    }
    if dest_port == 0 || tls_dest_port == Some(0) {
        return Err(RouteValidationError::Port);
    }
    Ok(())
}

/// A single DNS label: 1-63 chars of `[a-z0-9-]`, not starting or ending with '-'.
pub(crate) fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// The listener a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Plain,
    Tls,
}

impl Endpoint {
    pub fn scheme(&self) -> &'static str {
        match self {
            Endpoint::Plain => "http",
            Endpoint::Tls => "https",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendScheme {
    Http,
    Https,
}

/// Where a dispatched request is forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: BackendScheme,
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn is_tls(&self) -> bool {
        self.scheme == BackendScheme::Https
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            BackendScheme::Http => "http",
            BackendScheme::Https => "https",
        };
        write!(f, "{}://{}", scheme, self.authority())
    }
}
