//! Application state for API handlers

use quay_deployment::{BroadcastPublisher, DeploymentEngine};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Deployment engine
    pub engine: Arc<DeploymentEngine>,

    /// Service event stream the engine publishes to
    pub events: Arc<BroadcastPublisher>,

    /// Shared bearer token, `None` when the API is open
    pub auth_token: Option<Arc<str>>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        engine: Arc<DeploymentEngine>,
        events: Arc<BroadcastPublisher>,
        auth_token: Option<&str>,
    ) -> Self {
        Self {
            engine,
            events,
            auth_token: auth_token.map(Arc::from),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
