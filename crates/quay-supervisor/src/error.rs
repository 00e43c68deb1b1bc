//! Supervisor error types

use thiserror::Error;

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Process not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Timed out waiting for process {0} to exit")]
    Timeout(String),

    #[error("Supervisor rejected operation: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;
