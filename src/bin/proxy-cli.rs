use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for subdomain-proxy routes", long_about = None)]
struct Cli {
    #[arg(short, long, env = "PROXY_ADMIN_URL", default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "PROXY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy status and route snapshot
    Status,
    /// List all routes
    List,
    /// Show one route
    Get { id: String },
    /// Create a route
    Add {
        sub_domain: String,
        dest_host: String,
        dest_port: u16,
        /// Backend port for requests arriving over TLS
        #[arg(long)]
        tls_dest_port: Option<u16>,
        /// Connect to the backend over TLS
        #[arg(long)]
        forward_ssl: bool,
        /// Create the route disabled
        #[arg(long)]
        inactive: bool,
    },
    /// Replace the fields of an existing route
    Edit {
        id: String,
        sub_domain: String,
        dest_host: String,
        dest_port: u16,
        #[arg(long)]
        tls_dest_port: Option<u16>,
        #[arg(long)]
        forward_ssl: bool,
        #[arg(long)]
        inactive: bool,
    },
    /// Delete a route
    Remove { id: String },
    /// Reload routes from the store now
    Reload,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let routes = format!("{}/api/routes", cli.url);
    let request = match cli.command {
        Commands::Status => client.get(format!("{}/api/status", cli.url)),
        Commands::List => client.get(&routes),
        Commands::Get { id } => client.get(format!("{}/{}", routes, id)),
        Commands::Add {
            sub_domain,
            dest_host,
            dest_port,
            tls_dest_port,
            forward_ssl,
            inactive,
        } => client.post(&routes).json(&route_body(
            sub_domain,
            dest_host,
            dest_port,
            tls_dest_port,
            forward_ssl,
            inactive,
        )),
        Commands::Edit {
            id,
            sub_domain,
            dest_host,
            dest_port,
            tls_dest_port,
            forward_ssl,
            inactive,
        } => client.put(format!("{}/{}", routes, id)).json(&route_body(
            sub_domain,
            dest_host,
            dest_port,
            tls_dest_port,
            forward_ssl,
            inactive,
        )),
        Commands::Remove { id } => client.delete(format!("{}/{}", routes, id)),
        Commands::Reload => client.post(format!("{}/reload", routes)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await?;

    Ok(())
}

fn route_body(
    sub_domain: String,
    dest_host: String,
    dest_port: u16,
    tls_dest_port: Option<u16>,
    forward_ssl: bool,
    inactive: bool,
) -> Value {
    json!({
        "subDomain": sub_domain,
        "destHost": dest_host,
        "destPort": dest_port,
        "tlsDestPort": tls_dest_port,
        "forwardSSL": forward_ssl,
        "active": !inactive,
    })
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
