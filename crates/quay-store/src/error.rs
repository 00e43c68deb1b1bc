//! Store error types

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether this is a durable-storage failure rather than a validation error
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serialization(_) | Self::Task(_))
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
