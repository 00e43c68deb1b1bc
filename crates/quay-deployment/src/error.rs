//! Deployment error types

use quay_store::StoreError;
use quay_supervisor::SupervisorError;
use quay_types::InvalidServiceName;
use thiserror::Error;

/// Deployment errors
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Service already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid service name: {0}")]
    InvalidServiceName(#[from] InvalidServiceName),

    #[error("Release {release} not found for service {service}")]
    ReleaseNotFound { service: String, release: String },

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Service {0} has no active release")]
    NoActiveRelease(String),

    #[error("A start of service {0} is already in progress")]
    StartInProgress(String),

    #[error("Dependency installation failed: {0}")]
    DependencyInstallFailed(String),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for DeploymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidBundle(msg) => Self::InvalidBundle(msg),
            other => Self::Storage(other),
        }
    }
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeploymentError>;
