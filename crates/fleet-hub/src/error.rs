//! Hub-specific error types

use thiserror::Error;

/// Errors specific to hub operations
#[derive(Error, Debug)]
pub enum HubError {
    /// Failed to bind the listening socket
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    /// Refused to listen on a non-loopback address
    #[error("Refusing to bind non-loopback address {0} without --allow-remote")]
    RemoteBindRefused(String),

    /// Registry task is gone
    #[error("Registry closed")]
    RegistryClosed,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
