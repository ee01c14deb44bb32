//! Shardfleet launcher
//!
//! This crate provides:
//! - The shard-count query against the gateway
//! - Cluster supervisor handles (spawn, readiness, stop)
//! - The Launcher orchestrator with its monitor loop
//! - Fleet status tables

pub mod cluster;
pub mod error;
pub mod gateway;
pub mod launcher;
pub mod readiness;
pub mod status;

pub use cluster::{Cluster, StartOutcome, StopSignal, WorkerCommand};
pub use error::LauncherError;
pub use gateway::fetch_shard_count;
pub use launcher::{Launcher, LauncherConfig, RunOutcome, TickReport};
pub use readiness::{ReadinessWait, READY_BYTE};
pub use status::ClusterStatus;
