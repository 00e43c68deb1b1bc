//! Error types for quayd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quay_deployment::DeploymentError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Engine failed to load
    #[error("Deployment engine error: {0}")]
    Engine(#[from] DeploymentError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict with current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Uploaded bundle is not a valid archive
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    /// Request body over the configured limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Missing or wrong credential
    #[error("Unauthorized")]
    Unauthorized,

    /// Process supervisor failure
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    /// Dependency installation failure
    #[error("Dependency installation failed: {0}")]
    DependencyInstall(String),

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DeploymentError> for ApiError {
    fn from(err: DeploymentError) -> Self {
        let msg = err.to_string();
        match err {
            DeploymentError::ServiceNotFound(_) | DeploymentError::ReleaseNotFound { .. } => {
                ApiError::NotFound(msg)
            }
            DeploymentError::AlreadyExists(_)
            | DeploymentError::NoActiveRelease(_)
            | DeploymentError::StartInProgress(_) => ApiError::Conflict(msg),
            DeploymentError::InvalidServiceName(_) => ApiError::BadRequest(msg),
            DeploymentError::InvalidBundle(_) => ApiError::InvalidBundle(msg),
            DeploymentError::DependencyInstallFailed(_) => ApiError::DependencyInstall(msg),
            DeploymentError::Supervisor(_) => ApiError::Supervisor(msg),
            DeploymentError::Storage(_) => ApiError::Storage(msg),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::InvalidBundle(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_BUNDLE"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Supervisor(_) => (StatusCode::BAD_GATEWAY, "SUPERVISOR_ERROR"),
            ApiError::DependencyInstall(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DEPENDENCY_INSTALL_FAILED")
            }
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
