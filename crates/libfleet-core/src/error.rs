use thiserror::Error;

/// Main error type for fleet-wide operations
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    #[error("cluster name pool exhausted: {requested} clusters requested, {available} names available")]
    NamePoolExhausted { requested: usize, available: usize },
}

impl FleetError {
    /// Get the process exit code for a fatal fleet error
    pub fn exit_code(&self) -> i32 {
        match self {
            FleetError::Config(_) | FleetError::MissingEnv(_) => 2,
            FleetError::InvalidPartition(_) | FleetError::NamePoolExhausted { .. } => 3,
        }
    }
}
