//! Launcher-specific error types

use libfleet_core::FleetError;
use thiserror::Error;

/// Errors specific to launcher operations
#[derive(Error, Debug)]
pub enum LauncherError {
    /// Gateway refused the shard-count request
    #[error("Shard count request failed with HTTP {status}: {body}")]
    ShardCount { status: u16, body: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Worker process could not be spawned
    #[error("Failed to spawn cluster {name}: {reason}")]
    SpawnFailed { name: String, reason: String },

    /// Signal delivery failed for a reason other than the process being gone
    #[error("Failed to signal cluster {name}: {reason}")]
    SignalFailed { name: String, reason: String },

    /// Core fleet error
    #[error("Fleet error: {0}")]
    Fleet(#[from] FleetError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LauncherError {
    /// Process exit code when this error is fatal
    pub fn exit_code(&self) -> i32 {
        match self {
            LauncherError::Fleet(e) => e.exit_code(),
            LauncherError::ShardCount { .. } | LauncherError::Http(_) => 4,
            _ => 1,
        }
    }
}
