//! Fleet launcher - partitions the gateway's shards across worker processes
//!
//! The launcher:
//! - Queries the gateway for the recommended shard count
//! - Starts one worker per shard group, sequentially
//! - Restarts crashed workers with their original shards
//! - Stops every worker on Ctrl+C or SIGTERM

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use fleet_launcher::status::render;
use fleet_launcher::{fetch_shard_count, Launcher, LauncherConfig, RunOutcome, WorkerCommand};
use libfleet_core::{partition, shutdown_signal, FleetConfig, DEFAULT_MONITOR_INTERVAL_MS};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "fleet-launcher", about = "Shardfleet process launcher", version)]
struct Cli {
    /// Worker binary (defaults to fleet-worker next to this executable)
    #[arg(long)]
    worker_bin: Option<PathBuf>,

    /// Total shard count; skips the gateway query when set
    #[arg(long)]
    shards: Option<u32>,

    /// Milliseconds between monitor passes
    #[arg(long, default_value_t = DEFAULT_MONITOR_INTERVAL_MS)]
    monitor_interval: u64,

    /// Seconds a worker has to signal readiness
    #[arg(long, default_value = "300")]
    ready_timeout: u64,

    /// Seconds a stopped worker has to exit before it is killed
    #[arg(long, default_value = "10")]
    stop_grace: u64,

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

    info!("fleet-launcher starting");

    let config = match FleetConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };
    info!(config = ?config, "Loaded configuration");

    let total_shards = match cli.shards {
        Some(shards) => shards,
        None => {
            let token = match config.token() {
                Ok(token) => token,
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(e.exit_code());
                }
            };
            match fetch_shard_count(&config.api_base, token).await {
                Ok(shards) => shards,
                Err(e) => {
                    error!("Failed to fetch shard count: {}", e);
                    std::process::exit(e.exit_code());
                }
            }
        }
    };

    let partition = match partition(total_shards, config.shards_per_cluster) {
        Ok(p) => p,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    let worker = WorkerCommand::new(cli.worker_bin.unwrap_or_else(find_worker_binary));
    let mut launcher_config = LauncherConfig::new(worker);
    launcher_config.monitor_interval = Duration::from_millis(cli.monitor_interval);
    launcher_config.ready_timeout = Duration::from_secs(cli.ready_timeout);
    launcher_config.stop_grace = Duration::from_secs(cli.stop_grace);

    let mut launcher = match Launcher::new(launcher_config, partition) {
        Ok(launcher) => launcher,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    let started = tokio::select! {
        result = launcher.start_all() => Some(result),
        _ = shutdown_signal() => None,
    };
    match started {
        Some(Ok(())) => info!("Fleet status:\n{}", render(&launcher.status())),
        Some(Err(e)) => {
            error!("Startup failed: {}", e);
            launcher.shutdown().await;
            std::process::exit(e.exit_code());
        }
        None => {
            info!("Shutdown requested during startup");
            launcher.shutdown().await;
            return;
        }
    }

    match launcher.run(shutdown_signal()).await {
        RunOutcome::ShutdownRequested => info!("fleet-launcher stopped"),
        RunOutcome::FleetDrained => {
            error!("Every cluster has exited, stopping");
            std::process::exit(1);
        }
    }
}

/// Find the fleet-worker binary
fn find_worker_binary() -> PathBuf {
    // First, try next to the current executable
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let path = dir.join("fleet-worker");
            if path.exists() {
                return path;
            }
        }
    }

    // Fall back to PATH
    PathBuf::from("fleet-worker")
}
