//! Shardfleet worker
//!
//! This crate provides:
//! - The worker lifecycle state machine (WorkerState)
//! - The readiness signal written to the launcher
//! - The gateway check that decides readiness and measures latency
//! - The diagnostic evaluator served over the control plane

pub mod error;
pub mod eval;
pub mod gateway;
pub mod readiness;
pub mod state;
pub mod worker;

pub use error::WorkerError;
pub use eval::{DiagnosticEvaluator, LatencySource, DIAGNOSTICS, EVAL_DISABLED};
pub use gateway::GatewayClient;
pub use readiness::ReadinessSender;
pub use state::{StateCell, WorkerState};
pub use worker::{Worker, WorkerOptions};
