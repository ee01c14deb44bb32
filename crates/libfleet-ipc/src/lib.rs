//! Control-plane types and hub client for shardfleet
//!
//! This crate provides:
//! - Wire message types (ControlMessage, ControlReply, HubMessage)
//! - Close codes and handshake constants shared by the hub and workers
//! - The worker-side hub client (IpcClient) and its handle (IpcHandle)
//! - Command dispatch for workers (ControlHandler)

pub mod client;
pub mod error;
pub mod handler;
pub mod messages;

pub use client::{IpcClient, IpcHandle};
pub use error::IpcError;
pub use handler::{respond, ControlHandler};
pub use messages::{ControlMessage, ControlReply, HubMessage};

/// Close code for an intentional, expected closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code the hub uses to reject a duplicate handshake name
pub const CLOSE_ALREADY_CONNECTED: u16 = 4001;

/// Payload the hub sends after a successful handshake
pub const HANDSHAKE_ACK: &str = "ok";

/// Reply payload for a command a worker does not understand
pub const UNKNOWN_COMMAND_REPLY: &str = "unknown command";

/// Default window for collecting fan-out replies, in milliseconds
pub const DEFAULT_COLLECT_TIMEOUT_MS: u64 = 3_000;
