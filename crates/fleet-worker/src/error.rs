//! Worker error types

use libfleet_core::FleetError;
use libfleet_ipc::IpcError;
use thiserror::Error;

use crate::state::WorkerState;

/// Errors raised by a worker
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Gateway answered with a non-success status
    #[error("Gateway check failed with HTTP {0}")]
    GatewayStatus(u16),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// State machine was driven out of order
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },

    /// Control-plane error
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    /// Core fleet error
    #[error("Fleet error: {0}")]
    Fleet(#[from] FleetError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Process exit code when this error is fatal
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerError::Fleet(e) => e.exit_code(),
            _ => 1,
        }
    }
}
