//! Shard partitioning
//!
//! The partition is computed once at startup and never renumbered while the
//! fleet is running, so a restarted worker always owns the same shards.

use serde::{Deserialize, Serialize};

use crate::error::FleetError;

/// Ordered, contiguous groups of shard ids covering `[0, total_shards)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPartition {
    /// Total number of shards reported by the gateway
    pub total_shards: u32,
    /// Maximum group size
    pub shards_per_cluster: u32,
    groups: Vec<Vec<u32>>,
}

impl ShardPartition {
    /// Shard-id groups in cluster order
    pub fn groups(&self) -> &[Vec<u32>] {
        &self.groups
    }

    /// Number of groups (one cluster per group)
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Consume the partition, yielding its groups
    pub fn into_groups(self) -> Vec<Vec<u32>> {
        self.groups
    }
}

/// Chunk `[0, total_shards)` into consecutive groups of `shards_per_cluster`.
///
/// The last group may be smaller. `total_shards == 0` yields an empty
/// partition.
pub fn partition(total_shards: u32, shards_per_cluster: u32) -> Result<ShardPartition, FleetError> {
    if shards_per_cluster == 0 {
        return Err(FleetError::InvalidPartition(
            "shards per cluster must be at least 1".to_string(),
        ));
    }

    let ids: Vec<u32> = (0..total_shards).collect();
    let groups = ids
        .chunks(shards_per_cluster as usize)
        .map(|chunk| chunk.to_vec())
        .collect();

    Ok(ShardPartition {
        total_shards,
        shards_per_cluster,
        groups,
    })
}

/// Parse a comma-separated shard list such as `"3,4,5"`
pub fn parse_shard_ids(raw: &str) -> Result<Vec<u32>, FleetError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|e| FleetError::InvalidPartition(format!("bad shard id '{}': {}", s, e)))
        })
        .collect()
}

/// Format a shard list for the worker command line
pub fn format_shard_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
