//! Fleet hub - standalone control-plane broadcast server
//!
//! The hub provides:
//! - One registered connection per worker name
//! - Fan-out of every message to all other workers
//! - Normal closure of every connection on shutdown

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use fleet_hub::{Hub, HubError};
use libfleet_core::config::{DEFAULT_HUB_ADDR, ENV_HUB_ADDR};
use libfleet_core::shutdown_signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "fleet-hub", about = "Shardfleet control-plane hub", version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = ENV_HUB_ADDR, default_value = DEFAULT_HUB_ADDR)]
    bind: String,

    /// Allow listening on a non-loopback address
    #[arg(long)]
    allow_remote: bool,

    /// Seconds a new connection has to send its name
    #[arg(long, default_value = "10")]
    handshake_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("fleet-hub starting");

    if let Err(e) = check_bind_address(&cli.bind, cli.allow_remote) {
        error!("{}", e);
        std::process::exit(2);
    }

    let hub = match Hub::bind(&cli.bind).await {
        Ok(hub) => hub.with_handshake_timeout(Duration::from_secs(cli.handshake_timeout)),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = hub.run(shutdown_signal()).await {
        error!("Hub error: {}", e);
        std::process::exit(1);
    }

    info!("fleet-hub stopped");
}

/// Commands reach workers through the hub, so it stays on loopback unless
/// explicitly told otherwise.
fn check_bind_address(bind: &str, allow_remote: bool) -> Result<(), HubError> {
    match bind.parse::<SocketAddr>() {
        Ok(addr) if addr.ip().is_loopback() || allow_remote => Ok(()),
        Ok(_) => Err(HubError::RemoteBindRefused(bind.to_string())),
        // Hostnames are resolved at bind time; only allow them when remote is allowed
        Err(_) if allow_remote || bind.starts_with("localhost:") => Ok(()),
        Err(_) => Err(HubError::RemoteBindRefused(bind.to_string())),
    }
}
