mod server;

use anyhow::Result;
use clap::Parser;
use core::net::SocketAddr;
use dotenvy::dotenv;
use server::{ApiKey, Server, Settings, UpstreamSettings};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(author, version, about, long_about)]
struct Arguments {
    /// Internet socket address that the server should be ran on.
    #[arg(
        long = "address",
        env = "EMISSIONS_PROXY_ADDRESS",
        default_value = "127.0.0.1:3001"
    )]
    address: SocketAddr,

    /// Base URL that request paths are forwarded to.
    #[arg(
        long = "upstream-base-url",
        env = "EMISSIONS_PROXY_UPSTREAM_BASE_URL",
        default_value = "https://api.emissions.dev"
    )]
    upstream_base_url: Url,

    /// API key sent to the upstream as a bearer token.
    #[arg(
        long = "upstream-api-key",
        env = "EMISSIONS_PROXY_UPSTREAM_API_KEY",
        hide_env_values = true
    )]
    upstream_api_key: String,

    /// Maximum waiting time before requests to the upstream are aborted.
    /// When left empty, upstream requests never time out on their own.
    #[arg(
        long = "upstream-request-timeout",
        env = "EMISSIONS_PROXY_UPSTREAM_REQUEST_TIMEOUT"
    )]
    upstream_request_timeout: Option<humantime::Duration>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .init();
    let args = Arguments::parse();

    Server::new(Settings {
        upstream_settings: UpstreamSettings {
            base_url: args.upstream_base_url,
            api_key: ApiKey::new(args.upstream_api_key),
            request_timeout: args.upstream_request_timeout.map(|t| *t),
        },
    })?
    .start(&args.address)
    .await
}
