//! In-memory supervisor
//!
//! Records every intent it receives and tracks process state without
//! spawning anything. Tests use it to inject start failures and log output.

use crate::error::{Result, SupervisorError};
use crate::logs::{LogHub, LogLine, LogStream};
use crate::supervisor::{ProcessDescription, ProcessHandle, ProcessSpec, ProcessSupervisor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quay_types::RuntimeState;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// An intent received by the in-memory supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    Start(ProcessSpec),
    Stop(String),
    Restart(String),
    Remove(String),
}

#[derive(Debug, Clone)]
struct Entry {
    spec: ProcessSpec,
    state: RuntimeState,
    pid: u32,
    restarts: u32,
    started_at: DateTime<Utc>,
}

/// Supervisor that only records
pub struct InMemorySupervisor {
    processes: DashMap<String, Entry>,
    calls: Mutex<Vec<SupervisorCall>>,
    fail_starts: AtomicBool,
    next_pid: AtomicU32,
    logs: LogHub,
}

impl InMemorySupervisor {
    pub fn new() -> Self {
        Self {
            processes: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            fail_starts: AtomicBool::new(false),
            next_pid: AtomicU32::new(1000),
            logs: LogHub::new(1000),
        }
    }

    /// Make subsequent starts and restarts fail
    pub fn set_fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    /// Every intent received so far
    pub fn calls(&self) -> Vec<SupervisorCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Specs passed to `start`, in order
    pub fn started_specs(&self) -> Vec<ProcessSpec> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SupervisorCall::Start(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    /// Emit a line as if the process had written it
    pub fn emit_log(&self, name: &str, stream: LogStream, line: &str) {
        self.logs.push(name, LogLine::new(stream, line));
    }

    /// Force a process into a state, as if it had crashed or exited
    pub fn set_state(&self, name: &str, state: RuntimeState) {
        if let Some(mut entry) = self.processes.get_mut(name) {
            entry.state = state;
        }
    }

    fn record(&self, call: SupervisorCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check_fail(&self, name: &str) -> Result<()> {
        if self.fail_starts.load(Ordering::SeqCst) {
            return Err(SupervisorError::SpawnFailed(format!(
                "{}: injected failure",
                name
            )));
        }
        Ok(())
    }

    fn pid(&self) -> u32 {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for InMemorySupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSupervisor for InMemorySupervisor {
    async fn start(&self, spec: ProcessSpec) -> Result<ProcessHandle> {
        self.record(SupervisorCall::Start(spec.clone()));
        self.check_fail(&spec.name)?;

        let pid = self.pid();
        let name = spec.name.clone();
        self.processes.insert(
            name.clone(),
            Entry {
                spec,
                state: RuntimeState::Running,
                pid,
                restarts: 0,
                started_at: Utc::now(),
            },
        );
        Ok(ProcessHandle {
            name,
            pid: Some(pid),
        })
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record(SupervisorCall::Stop(name.to_string()));
        let mut entry = self
            .processes
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
        entry.state = RuntimeState::Stopped;
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<ProcessHandle> {
        self.record(SupervisorCall::Restart(name.to_string()));
        self.check_fail(name)?;

        let pid = self.pid();
        let mut entry = self
            .processes
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
        entry.state = RuntimeState::Running;
        entry.pid = pid;
        entry.restarts += 1;
        entry.started_at = Utc::now();
        Ok(ProcessHandle {
            name: name.to_string(),
            pid: Some(pid),
        })
    }

    async fn describe(&self, name: &str) -> Option<ProcessDescription> {
        let entry = self.processes.get(name)?;
        let running = entry.state == RuntimeState::Running;
        Some(ProcessDescription {
            name: name.to_string(),
            state: entry.state,
            pid: running.then_some(entry.pid),
            restarts: entry.restarts,
            started_at: Some(entry.started_at),
            exit_code: None,
            raw: serde_json::json!({
                "entryPoint": entry.spec.entry_point,
                "workingDir": entry.spec.working_dir,
            }),
        })
    }

    async fn remove_if_exists(&self, name: &str) -> Result<()> {
        self.record(SupervisorCall::Remove(name.to_string()));
        self.processes.remove(name);
        Ok(())
    }

    fn subscribe_logs(&self, name: &str) -> broadcast::Receiver<LogLine> {
        self.logs.subscribe(name)
    }

    fn recent_logs(&self, name: &str, tail: usize) -> Vec<LogLine> {
        self.logs.recent(name, tail)
    }

    fn clear_logs(&self, name: &str) {
        self.logs.clear(name)
    }

    async fn shutdown(&self) {
        self.processes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec() -> ProcessSpec {
        ProcessSpec {
            name: "web".to_string(),
            entry_point: "index.js".into(),
            working_dir: "/tmp/web".into(),
            env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_records_intents() {
        let sup = InMemorySupervisor::new();
        sup.start(spec()).await.unwrap();
        sup.restart("web").await.unwrap();
        sup.stop("web").await.unwrap();
        sup.remove_if_exists("web").await.unwrap();

        assert_eq!(
            sup.calls(),
            vec![
                SupervisorCall::Start(spec()),
                SupervisorCall::Restart("web".to_string()),
                SupervisorCall::Stop("web".to_string()),
                SupervisorCall::Remove("web".to_string()),
            ]
        );
        assert!(sup.describe("web").await.is_none());
    }

    #[tokio::test]
    async fn test_injected_start_failure() {
        let sup = InMemorySupervisor::new();
        sup.set_fail_starts(true);

        assert!(matches!(
            sup.start(spec()).await,
            Err(SupervisorError::SpawnFailed(_))
        ));
        assert!(sup.describe("web").await.is_none());
    }

    #[tokio::test]
    async fn test_describe_tracks_state() {
        let sup = InMemorySupervisor::new();
        sup.start(spec()).await.unwrap();

        let desc = sup.describe("web").await.unwrap();
        assert_eq!(desc.state, RuntimeState::Running);
        assert!(desc.pid.is_some());

        sup.set_state("web", RuntimeState::Errored);
        let desc = sup.describe("web").await.unwrap();
        assert_eq!(desc.state, RuntimeState::Errored);
        assert_eq!(desc.pid, None);
        assert_eq!(desc.snapshot()["state"], "errored");
    }

    #[tokio::test]
    async fn test_injected_logs() {
        let sup = InMemorySupervisor::new();
        sup.emit_log("web", LogStream::Out, "listening");
        sup.emit_log("web", LogStream::Err, "warning");

        let tail: Vec<String> = sup
            .recent_logs("web", 1)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(tail, vec!["[err] warning"]);
    }
}
