//! The process supervisor capability

use crate::error::Result;
use crate::logs::LogLine;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quay_types::RuntimeState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// What to run for a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Supervisor-level process name, the service name
    pub name: String,

    /// Entry point, relative to `working_dir`
    pub entry_point: PathBuf,

    pub working_dir: PathBuf,

    /// Environment added on top of the supervisor's own
    pub env: BTreeMap<String, String>,
}

/// Handle returned by a successful start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub name: String,
    pub pid: Option<u32>,
}

/// Point-in-time description of a supervised process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDescription {
    pub name: String,
    pub state: RuntimeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub restarts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Implementation-specific details
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

impl ProcessDescription {
    /// JSON snapshot attached to status events
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Capability to run and observe one process per name
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Start a process; an existing process with the same name is replaced
    async fn start(&self, spec: ProcessSpec) -> Result<ProcessHandle>;

    /// Stop a process, keeping its entry so it can be restarted
    async fn stop(&self, name: &str) -> Result<()>;

    /// Restart a process from its stored spec
    async fn restart(&self, name: &str) -> Result<ProcessHandle>;

    /// Describe a process, `None` when the supervisor does not know it
    async fn describe(&self, name: &str) -> Option<ProcessDescription>;

    /// Stop and forget a process if it exists
    async fn remove_if_exists(&self, name: &str) -> Result<()>;

    /// Live output of a process, across restarts
    fn subscribe_logs(&self, name: &str) -> broadcast::Receiver<LogLine>;

    /// Up to `tail` most recent buffered lines, oldest first
    fn recent_logs(&self, name: &str, tail: usize) -> Vec<LogLine>;

    fn clear_logs(&self, name: &str);

    /// Stop every process, used on daemon shutdown
    async fn shutdown(&self) {}
}
