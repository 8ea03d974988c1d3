//! subdomain-proxy
//!
//! Multi-tenant HTTP(S) gateway: routes each request to a backend chosen by the
//! leftmost label of its Host header.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!   Client Request     │  ┌─────────┐   ┌────────────┐   ┌─────────┐  │
//!   ───────────────────┼─▶│  http   │──▶│  routing   │──▶│ forward │──┼──▶ Backend
//!   (plain or TLS)     │  │ server  │   │ dispatcher │   │ (hyper) │  │
//!                      │  └─────────┘   └─────┬──────┘   └─────────┘  │
//!                      │                      │ snapshot              │
//!                      │               ┌──────┴──────┐                │
//!   Admin API ─────────┼──────────────▶│ RouteTable  │◀── store ◀─────┼── routes.json
//!                      │               └─────────────┘                │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use subdomain_proxy::config::{load_config, ProxyConfig};
use subdomain_proxy::lifecycle::startup;

#[derive(Parser)]
#[command(name = "subdomain-proxy", version, about = "Subdomain-routing HTTP(S) gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    startup::run(config).await?;
    Ok(())
}
