//! Worker lifecycle state machine
//!
//! ```text
//! Booting -> GatewayReady -> IpcConnecting -> IpcActive -> IpcDisabled
//!                                          \-> IpcDisabled
//! ```
//!
//! `GatewayReady` is entered exactly once. `IpcDisabled` is terminal.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::WorkerError;

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Booting = 0,
    GatewayReady = 1,
    IpcConnecting = 2,
    IpcActive = 3,
    IpcDisabled = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Booting,
            1 => WorkerState::GatewayReady,
            2 => WorkerState::IpcConnecting,
            3 => WorkerState::IpcActive,
            _ => WorkerState::IpcDisabled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Booting => "booting",
            WorkerState::GatewayReady => "gateway_ready",
            WorkerState::IpcConnecting => "ipc_connecting",
            WorkerState::IpcActive => "ipc_active",
            WorkerState::IpcDisabled => "ipc_disabled",
        }
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_advance_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Booting, GatewayReady)
                | (GatewayReady, IpcConnecting)
                | (IpcConnecting, IpcActive)
                | (IpcConnecting, IpcDisabled)
                | (IpcActive, IpcDisabled)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free holder of the current state
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self(AtomicU8::new(WorkerState::Booting as u8))
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`, failing if the cell is not in `from` or
    /// the transition is not allowed
    pub fn advance(&self, from: WorkerState, to: WorkerState) -> Result<(), WorkerError> {
        if !from.can_advance_to(to) {
            return Err(WorkerError::InvalidTransition { from, to });
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| WorkerError::InvalidTransition {
                from: WorkerState::from_u8(actual),
                to,
            })
    }
}
