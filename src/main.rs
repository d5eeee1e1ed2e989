//! Komainu - bearer-token authentication server
//!
//! Issues tokens on `POST /auth` and guards every other route with
//! key-rotating token verification.

use anyhow::Context;
use clap::Parser;
use komainu::{auth::TokenAuthenticator, config::Config, server::Server};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "komainu")]
#[command(author, version, about = "Bearer-token authentication with key rotation", long_about = None)]
struct Args {
    /// YAML file with the server address, trusted keys and sign options
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Default log filter; `RUST_LOG` takes precedence when set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Listen on this address instead of `server.address`
    #[arg(short, long)]
    address: Option<String>,

    /// Load the config and key material, then exit without serving
    #[arg(long)]
    check: bool,
}

fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .with_context(|| format!("invalid log filter {:?}", default_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(address) = args.address {
        config.server.address = address;
    }

    // Unreadable PEMs and bad sign options surface here, not on first request
    let authenticator = TokenAuthenticator::from_config(&config.auth)?;
    info!(
        version = komainu::VERSION,
        config = %args.config.display(),
        keys = authenticator.keys().len(),
        "komainu configured"
    );

    if args.check {
        return Ok(());
    }
    if !config.metrics.enabled {
        warn!("metrics disabled, /metrics is guarded like any other route");
    }

    let server = Server::with_authenticator(&config, authenticator).await?;
    info!(address = %server.local_addr(), "guarding routes");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }

    Ok(())
}
