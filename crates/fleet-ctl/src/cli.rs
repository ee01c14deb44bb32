use clap::{Parser, Subcommand};
use libfleet_core::config::{DEFAULT_HUB_ADDR, ENV_HUB_ADDR};
use libfleet_ipc::DEFAULT_COLLECT_TIMEOUT_MS;

#[derive(Parser)]
#[command(name = "fleet-ctl", about = "Broadcast diagnostics to a shardfleet", version)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Hub address
    #[arg(long, global = true, env = ENV_HUB_ADDR, default_value = DEFAULT_HUB_ADDR)]
    pub hub: String,

    /// Milliseconds to collect replies
    #[arg(long, global = true, default_value_t = DEFAULT_COLLECT_TIMEOUT_MS)]
    pub timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Ask every worker for its gateway latency
    Ping,

    /// Evaluate a diagnostic expression on every worker
    Eval {
        /// Expression (cluster, shards, shard_count, pid, uptime, latency, state, version)
        expr: String,
    },
}

impl Cli {
    pub fn hub_url(&self) -> String {
        if self.hub.starts_with("ws://") || self.hub.starts_with("wss://") {
            self.hub.clone()
        } else {
            format!("ws://{}", self.hub)
        }
    }
}
