//! Diagnostic evaluator answering control-plane commands
//!
//! `eval` never executes code. It looks up one of a fixed set of read-only
//! diagnostics and is off unless the fleet enables it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use libfleet_core::format_shard_ids;
use libfleet_ipc::ControlHandler;

use crate::gateway::GatewayClient;
use crate::state::StateCell;

/// Expressions `eval` understands
pub const DIAGNOSTICS: [&str; 8] = [
    "cluster",
    "shards",
    "shard_count",
    "pid",
    "uptime",
    "latency",
    "state",
    "version",
];

/// Reply text when the surface is turned off
pub const EVAL_DISABLED: &str = "eval is disabled";

/// Source of the worker's latency
pub trait LatencySource: Send + Sync + 'static {
    fn latency(&self) -> Option<Duration>;
}

impl LatencySource for GatewayClient {
    fn latency(&self) -> Option<Duration> {
        GatewayClient::latency(self)
    }
}

pub struct DiagnosticEvaluator<L: LatencySource = GatewayClient> {
    cluster: String,
    shard_ids: Vec<u32>,
    shard_count: u32,
    allow_eval: bool,
    started: Instant,
    state: Arc<StateCell>,
    latency: Arc<L>,
}

impl<L: LatencySource> DiagnosticEvaluator<L> {
    pub fn new(
        cluster: impl Into<String>,
        shard_ids: Vec<u32>,
        shard_count: u32,
        allow_eval: bool,
        state: Arc<StateCell>,
        latency: Arc<L>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            shard_ids,
            shard_count,
            allow_eval,
            started: Instant::now(),
            state,
            latency,
        }
    }

    fn lookup(&self, expr: &str) -> Result<String, String> {
        let value = match expr {
            "cluster" => self.cluster.clone(),
            "shards" => format_shard_ids(&self.shard_ids),
            "shard_count" => self.shard_count.to_string(),
            "pid" => std::process::id().to_string(),
            "uptime" => format!("{}s", self.started.elapsed().as_secs()),
            "latency" => match self.latency.latency() {
                Some(latency) => format!("{}ms", latency.as_millis()),
                None => "n/a".to_string(),
            },
            "state" => self.state.get().to_string(),
            "version" => env!("CARGO_PKG_VERSION").to_string(),
            other => {
                return Err(format!(
                    "unsupported expression '{}' (expected one of: {})",
                    other,
                    DIAGNOSTICS.join(", ")
                ))
            }
        };
        Ok(value)
    }
}

impl<L: LatencySource> ControlHandler for DiagnosticEvaluator<L> {
    fn latency(&self) -> Option<Duration> {
        self.latency.latency()
    }

    fn eval(&self, content: &str) -> Result<String, String> {
        if !self.allow_eval {
            return Err(EVAL_DISABLED.to_string());
        }
        self.lookup(content.trim())
    }
}
