//! Launcher - partitions shards and supervises one cluster per group
//!
//! The launcher:
//! - Names one cluster per shard group from the ordered name pool
//! - Starts clusters strictly one after another, each waiting for readiness
//! - Runs a monitor loop that restarts crashed clusters and retires clean exits.
//!   Restarts do not wait for readiness; later passes pick up the outcome.
//! - Stops every remaining cluster exactly once on shutdown

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use libfleet_core::{cluster_names, RestartDecision, RestartPolicy, ShardPartition, DEFAULT_MONITOR_INTERVAL_MS};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cluster::{Cluster, StartOutcome, StopSignal, WorkerCommand};
use crate::error::LauncherError;
use crate::status::ClusterStatus;

/// Default time a worker gets to signal readiness
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(300);

/// Default time a stopped worker gets before it is killed
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Launcher settings
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub worker: WorkerCommand,
    pub monitor_interval: Duration,
    pub ready_timeout: Duration,
    pub stop_grace: Duration,
    pub restart_policy: RestartPolicy,
}

impl LauncherConfig {
    pub fn new(worker: WorkerCommand) -> Self {
        Self {
            worker,
            monitor_interval: Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            restart_policy: RestartPolicy::default(),
        }
    }
}

/// What one monitor pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Restarted clusters that signalled readiness since the previous pass
    pub became_ready: Vec<String>,
    /// Clusters restarted on this pass
    pub restarted: Vec<String>,
    /// Clusters that exited cleanly and were retired
    pub retired: Vec<String>,
    /// Crash-looping clusters whose restart was postponed
    pub deferred: Vec<String>,
    /// No active cluster remains
    pub fleet_empty: bool,
}

/// Why [`Launcher::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The shutdown future resolved
    ShutdownRequested,
    /// Every cluster retired; the fleet has nothing left to run
    FleetDrained,
}

/// Orchestrator owning every cluster of the fleet
pub struct Launcher {
    config: LauncherConfig,
    total_shards: u32,
    /// Active cluster names in partition order
    order: Vec<String>,
    clusters: HashMap<String, Cluster>,
    retired: Vec<String>,
    stopped: bool,
}

impl Launcher {
    /// Create one cluster per shard group. Fails if the name pool is too small.
    pub fn new(config: LauncherConfig, partition: ShardPartition) -> Result<Self, LauncherError> {
        let names = cluster_names(partition.len())?;
        let total_shards = partition.total_shards;

        let mut order = Vec::with_capacity(names.len());
        let mut clusters = HashMap::with_capacity(names.len());
        for (name, shard_ids) in names.into_iter().zip(partition.into_groups()) {
            let cluster = Cluster::new(
                name,
                shard_ids,
                total_shards,
                config.worker.clone(),
                config.ready_timeout,
                config.restart_policy.clone(),
            );
            order.push(name.to_string());
            clusters.insert(name.to_string(), cluster);
        }

        Ok(Self {
            config,
            total_shards,
            order,
            clusters,
            retired: Vec::new(),
            stopped: false,
        })
    }

    pub fn total_shards(&self) -> u32 {
        self.total_shards
    }

    /// Names of clusters still under supervision, in partition order
    pub fn active(&self) -> &[String] {
        &self.order
    }

    /// Names of clusters retired after a clean exit
    pub fn retired(&self) -> &[String] {
        &self.retired
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    pub fn cluster_mut(&mut self, name: &str) -> Option<&mut Cluster> {
        self.clusters.get_mut(name)
    }

    /// Start every cluster in order. Each start waits for the previous
    /// cluster's readiness (or death) before spawning the next.
    pub async fn start_all(&mut self) -> Result<(), LauncherError> {
        info!(
            clusters = self.order.len(),
            total_shards = self.total_shards,
            "Starting fleet"
        );

        for name in self.order.clone() {
            let Some(cluster) = self.clusters.get_mut(&name) else {
                continue;
            };
            match cluster.start(false).await? {
                StartOutcome::Ready | StartOutcome::AlreadyRunning => {}
                outcome => warn!(cluster = %name, outcome = ?outcome, "Cluster did not become ready"),
            }
        }

        info!("Fleet started");
        Ok(())
    }

    /// One monitor pass over every active cluster
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for name in self.order.clone() {
            let Some(cluster) = self.clusters.get_mut(&name) else {
                continue;
            };

            if cluster.poll_readiness() == Some(StartOutcome::Ready) {
                report.became_ready.push(name.clone());
            }

            if let Some(due) = cluster.restart_due() {
                if Instant::now() >= due {
                    info!(cluster = %name, "Backoff elapsed, restarting");
                    restart(cluster).await;
                    report.restarted.push(name);
                }
                continue;
            }

            match cluster.poll_exit() {
                None => {}
                Some(0) => {
                    info!(cluster = %name, "Cluster exited cleanly, retiring");
                    report.retired.push(name);
                }
                Some(code) => {
                    let decision = cluster.record_crash();
                    error!(
                        cluster = %name,
                        code,
                        shards = ?cluster.shard_ids(),
                        consecutive = cluster.consecutive_crashes(),
                        "Cluster crashed"
                    );
                    match decision {
                        RestartDecision::Now => {
                            restart(cluster).await;
                            report.restarted.push(name);
                        }
                        RestartDecision::After(delay) => {
                            error!(
                                cluster = %name,
                                delay_ms = delay.as_millis() as u64,
                                "Cluster is crash-looping, deferring restart"
                            );
                            report.deferred.push(name);
                        }
                    }
                }
            }
        }

        for name in &report.retired {
            self.clusters.remove(name);
            self.order.retain(|n| n != name);
            self.retired.push(name.clone());
        }

        report.fleet_empty = self.order.is_empty();
        report
    }

    /// Monitor until `shutdown` resolves or the fleet drains, then stop
    /// every remaining cluster.
    pub async fn run<F>(&mut self, shutdown: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(self.config.monitor_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break RunOutcome::ShutdownRequested;
                }
                report = self.monitor_pass(&mut interval) => {
                    if report.fleet_empty {
                        error!("No active clusters remain");
                        break RunOutcome::FleetDrained;
                    }
                }
            }
        };

        self.shutdown().await;
        outcome
    }

    async fn monitor_pass(&mut self, interval: &mut Interval) -> TickReport {
        interval.tick().await;
        let report = self.tick().await;
        debug!(
            became_ready = report.became_ready.len(),
            restarted = report.restarted.len(),
            retired = report.retired.len(),
            deferred = report.deferred.len(),
            "Monitor pass"
        );
        report
    }

    /// Stop every remaining cluster. Safe to call more than once; only the
    /// first call signals.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            debug!("Shutdown already done");
            return;
        }
        self.stopped = true;

        info!(clusters = self.order.len(), "Stopping fleet");

        for name in &self.order {
            if let Some(cluster) = self.clusters.get_mut(name) {
                if let Err(e) = cluster.stop(StopSignal::Interrupt) {
                    warn!("{}", e);
                }
            }
        }

        let deadline = Instant::now() + self.config.stop_grace;
        for name in &self.order {
            if let Some(cluster) = self.clusters.get_mut(name) {
                let grace = deadline.saturating_duration_since(Instant::now());
                if let Some(code) = cluster.wait_or_kill(grace).await {
                    debug!(cluster = %name, code, "Cluster stopped");
                }
            }
        }

        info!("Fleet stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Status row per active cluster, in partition order
    pub fn status(&mut self) -> Vec<ClusterStatus> {
        let mut rows = Vec::with_capacity(self.order.len());
        for name in &self.order {
            if let Some(cluster) = self.clusters.get_mut(name) {
                rows.push(ClusterStatus::of(cluster));
            }
        }
        rows
    }
}

/// Force-launch a crashed cluster with its original shards
async fn restart(cluster: &mut Cluster) {
    match cluster.launch(true).await {
        Ok(_) => debug!(cluster = %cluster.name(), "Restart launched, readiness pending"),
        Err(e) => {
            // Retry on the next pass
            error!("{}", e);
            cluster.schedule_restart(Instant::now());
        }
    }
}
