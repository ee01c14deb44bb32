//! Ordered pool of human-readable cluster names
//!
//! Clusters are named in partition order. The pool size is the upper bound
//! on how many clusters a single launcher can supervise.

use crate::error::FleetError;

/// Cluster names in assignment order
pub const NAME_POOL: [&str; 26] = [
    "Alpha", "Beta", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India", "Juliett",
    "Kilo", "Lima", "Mike", "November", "Oscar", "Papa", "Quebec", "Romeo", "Sierra", "Tango",
    "Uniform", "Victor", "Whiskey", "Xray", "Yankee", "Zulu",
];

/// Name for the cluster at `index` in partition order
pub fn cluster_name(index: usize) -> Result<&'static str, FleetError> {
    NAME_POOL
        .get(index)
        .copied()
        .ok_or(FleetError::NamePoolExhausted {
            requested: index + 1,
            available: NAME_POOL.len(),
        })
}

/// Names for the first `count` clusters, failing if the pool is too small
pub fn cluster_names(count: usize) -> Result<Vec<&'static str>, FleetError> {
    if count > NAME_POOL.len() {
        return Err(FleetError::NamePoolExhausted {
            requested: count,
            available: NAME_POOL.len(),
        });
    }
    Ok(NAME_POOL[..count].to_vec())
}
