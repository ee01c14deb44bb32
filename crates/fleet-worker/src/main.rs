//! Fleet worker - one shard group of the fleet
//!
//! Stdout is reserved for the readiness signal; logs go to stderr.

use std::time::Duration;

use clap::Parser;
use fleet_worker::{ReadinessSender, Worker, WorkerError, WorkerOptions};
use libfleet_core::{parse_shard_ids, shutdown_signal, FleetConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "fleet-worker", about = "Shardfleet worker process", version)]
struct Cli {
    /// Name of this cluster
    #[arg(long)]
    cluster_name: String,

    /// Comma-separated shard ids owned by this worker
    #[arg(long)]
    shard_ids: String,

    /// Total number of shards in the fleet
    #[arg(long)]
    shard_count: u32,

    /// Seconds between gateway latency checks
    #[arg(long, default_value = "30")]
    heartbeat: u64,

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
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cluster = cli.cluster_name.clone();
    if let Err(e) = run(cli).await {
        error!(cluster = %cluster, "{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), WorkerError> {
    let config = FleetConfig::from_env()?;
    let shard_ids = parse_shard_ids(&cli.shard_ids)?;

    let options = WorkerOptions {
        cluster_name: cli.cluster_name,
        shard_ids,
        shard_count: cli.shard_count,
        api_base: config.api_base.clone(),
        token: config.token()?.to_string(),
        hub_url: config.hub_url(),
        allow_eval: config.allow_eval,
        ipc_timeout: Duration::from_secs(10),
        heartbeat: Duration::from_secs(cli.heartbeat),
        retry_backoff: Duration::from_secs(1),
        max_retry_backoff: Duration::from_secs(30),
    };

    info!(prefix = config.command_prefix(), development = config.development, "fleet-worker starting");

    let worker = Worker::new(options)?;
    worker.run(ReadinessSender::stdout(), shutdown_signal()).await?;

    info!("fleet-worker stopped");
    Ok(())
}
