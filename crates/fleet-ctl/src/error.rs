use libfleet_ipc::IpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CtlError {
    #[error("{0}")]
    Ipc(#[from] IpcError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CtlError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CtlError::Ipc(e) if e.is_hub_unavailable() => "hub_unavailable",
            CtlError::Ipc(_) => "ipc_error",
            CtlError::Json(_) => "internal_error",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CtlError::Ipc(e) if e.is_hub_unavailable() => 3,
            CtlError::Ipc(_) => 4,
            CtlError::Json(_) => 1,
        }
    }

    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            CtlError::Ipc(e) if e.is_hub_unavailable() => vec![
                "Start the hub with 'fleet-hub'",
                "Check --hub or FLEET_HUB_ADDR",
            ],
            _ => Vec::new(),
        }
    }
}
