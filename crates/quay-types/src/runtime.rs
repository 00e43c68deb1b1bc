//! Runtime status of a service's supervised process
//!
//! Runtime status is transient: it is derived from the process supervisor,
//! cached in memory and never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse process state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    #[default]
    Stopped,
    Running,
    Errored,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Cached runtime status, also the payload of `status` events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub status: RuntimeState,

    /// Raw supervisor description of the process, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_snapshot: Option<serde_json::Value>,
}

impl RuntimeStatus {
    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn running(snapshot: Option<serde_json::Value>) -> Self {
        Self {
            status: RuntimeState::Running,
            supervisor_snapshot: snapshot,
        }
    }

    pub fn with_state(status: RuntimeState, snapshot: Option<serde_json::Value>) -> Self {
        Self {
            status,
            supervisor_snapshot: snapshot,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RuntimeState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_payload_shape() {
        let json = serde_json::to_value(RuntimeStatus::stopped()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "stopped" }));

        let running = RuntimeStatus::running(Some(serde_json::json!({ "pid": 42 })));
        let json = serde_json::to_value(running).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "status": "running", "supervisorSnapshot": { "pid": 42 } })
        );
    }
}
