//! IPC error types

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors that can occur while talking to the hub
#[derive(Error, Debug)]
pub enum IpcError {
    /// Nothing is listening at the hub address
    #[error("Hub not running")]
    HubNotRunning,

    /// Connection failed for a reason other than refusal
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Hub closed the connection instead of acknowledging the handshake
    #[error("Handshake rejected [{code}]: {reason}")]
    HandshakeRejected { code: u16, reason: String },

    /// Handshake did not complete
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Connection closed with a code other than normal closure
    #[error("Connection closed abnormally [{code}]: {reason}")]
    AbnormalClose { code: u16, reason: String },

    /// Stream ended without a close frame
    #[error("Connection lost")]
    ConnectionLost,

    /// The client task is gone
    #[error("IPC client closed")]
    ClientClosed,

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tungstenite::Error> for IpcError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Io(ref io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
                IpcError::HubNotRunning
            }
            other => IpcError::WebSocket(other.to_string()),
        }
    }
}

impl IpcError {
    /// Whether this error means the hub is simply not there
    pub fn is_hub_unavailable(&self) -> bool {
        matches!(self, IpcError::HubNotRunning)
    }
}
