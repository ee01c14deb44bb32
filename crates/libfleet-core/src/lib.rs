//! Core library for shardfleet
//!
//! This crate provides:
//! - Shard partitioning (ShardPartition)
//! - The ordered cluster name pool
//! - Environment-driven fleet configuration (FleetConfig)
//! - Restart policy and crash-loop tracking (RestartPolicy, RestartTracker)
//! - The Ctrl+C / SIGTERM shutdown future shared by the binaries

pub mod config;
pub mod error;
pub mod names;
pub mod partition;
pub mod restart;
pub mod signal;

pub use config::FleetConfig;
pub use error::FleetError;
pub use names::{cluster_name, cluster_names, NAME_POOL};
pub use partition::{format_shard_ids, parse_shard_ids, partition, ShardPartition};
pub use restart::{RestartDecision, RestartPolicy, RestartTracker};
pub use signal::shutdown_signal;

/// Interval between two monitor passes of the launcher, in milliseconds
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 5_000;

/// Default shard-group size when none is configured
pub const DEFAULT_SHARDS_PER_CLUSTER: u32 = 5;
