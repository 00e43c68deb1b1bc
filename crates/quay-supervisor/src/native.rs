//! Native process supervisor
//!
//! Runs each service as a child process of the daemon. Output is read line
//! by line into the [`LogHub`]; a monitor task per child records how it
//! exited.

use crate::error::{Result, SupervisorError};
use crate::logs::{LogHub, LogLine, LogStream};
use crate::supervisor::{ProcessDescription, ProcessHandle, ProcessSpec, ProcessSupervisor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quay_types::RuntimeState;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Native supervisor settings
#[derive(Debug, Clone)]
pub struct NativeSupervisorConfig {
    /// Program that runs the entry point; `None` executes it directly
    pub interpreter: Option<String>,

    /// How long `stop` waits for a killed child to be reaped
    pub stop_timeout: Duration,

    /// Lines of output kept per process
    pub log_buffer_lines: usize,
}

impl Default for NativeSupervisorConfig {
    fn default() -> Self {
        Self {
            interpreter: Some("node".to_string()),
            stop_timeout: Duration::from_secs(10),
            log_buffer_lines: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Exit {
    code: Option<i32>,
    requested: bool,
}

impl Exit {
    fn state(&self) -> RuntimeState {
        if self.requested || self.code == Some(0) {
            RuntimeState::Stopped
        } else {
            RuntimeState::Errored
        }
    }
}

/// One spawned child
struct Run {
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    kill: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
    exit: Arc<std::sync::Mutex<Option<Exit>>>,
}

impl Run {
    fn exit(&self) -> Option<Exit> {
        self.exit.lock().ok().and_then(|e| *e)
    }
}

struct Managed {
    spec: ProcessSpec,
    restarts: u32,
    run: Option<Run>,
    last_exit: Option<Exit>,
}

impl Managed {
    fn describe(&self, interpreter: Option<&str>) -> ProcessDescription {
        let (state, pid, started_at, exit_code) = match &self.run {
            Some(run) => match run.exit() {
                None => (RuntimeState::Running, run.pid, Some(run.started_at), None),
                Some(exit) => (exit.state(), None, Some(run.started_at), exit.code),
            },
            None => match self.last_exit {
                Some(exit) => (exit.state(), None, None, exit.code),
                None => (RuntimeState::Stopped, None, None, None),
            },
        };

        ProcessDescription {
            name: self.spec.name.clone(),
            state,
            pid,
            restarts: self.restarts,
            started_at,
            exit_code,
            raw: serde_json::json!({
                "interpreter": interpreter,
                "entryPoint": self.spec.entry_point,
                "workingDir": self.spec.working_dir,
            }),
        }
    }
}

/// Supervisor backed by `tokio::process`
pub struct NativeSupervisor {
    config: NativeSupervisorConfig,
    processes: DashMap<String, Arc<Mutex<Managed>>>,
    logs: Arc<LogHub>,
}

impl NativeSupervisor {
    pub fn new(config: NativeSupervisorConfig) -> Self {
        let logs = Arc::new(LogHub::new(config.log_buffer_lines));
        Self {
            config,
            processes: DashMap::new(),
            logs,
        }
    }

    fn entry(&self, name: &str) -> Result<Arc<Mutex<Managed>>> {
        self.processes
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    fn spawn(&self, spec: &ProcessSpec) -> Result<Run> {
        let mut cmd = match &self.config.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&spec.entry_point);
                cmd
            }
            None => Command::new(spec.working_dir.join(&spec.entry_point)),
        };

        cmd.current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed(format!("{}: {}", spec.name, e)))?;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward(self.logs.clone(), spec.name.clone(), LogStream::Out, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward(self.logs.clone(), spec.name.clone(), LogStream::Err, stderr));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let exit = Arc::new(std::sync::Mutex::new(None));
        let monitor = tokio::spawn(monitor(spec.name.clone(), child, kill_rx, exit.clone()));

        info!(process = %spec.name, pid = ?pid, "Process spawned");

        Ok(Run {
            pid,
            started_at: Utc::now(),
            kill: Some(kill_tx),
            monitor,
            exit,
        })
    }

    /// Kill a child and wait for its monitor to record the exit
    ///
    /// On timeout the run is left in place so the child stays tracked.
    async fn halt(&self, name: &str, run: &mut Run) -> Result<Exit> {
        if let Some(kill) = run.kill.take() {
            // The monitor may already be gone if the child exited on its own
            let _ = kill.send(());
        }

        match tokio::time::timeout(self.config.stop_timeout, &mut run.monitor).await {
            Ok(joined) => {
                joined.map_err(|e| SupervisorError::Io(std::io::Error::other(e.to_string())))?
            }
            Err(_) => {
                warn!(process = %name, pid = ?run.pid, "Process did not exit within the stop timeout");
                return Err(SupervisorError::Timeout(name.to_string()));
            }
        }

        Ok(run.exit().unwrap_or(Exit {
            code: None,
            requested: true,
        }))
    }

    /// Halt the current run of a managed process, if any
    async fn halt_managed(&self, name: &str, managed: &mut Managed) -> Result<()> {
        if let Some(run) = managed.run.as_mut() {
            let exit = self.halt(name, run).await?;
            managed.run = None;
            managed.last_exit = Some(exit);
        }
        Ok(())
    }
}

impl Default for NativeSupervisor {
    fn default() -> Self {
        Self::new(NativeSupervisorConfig::default())
    }
}

async fn forward<R>(logs: Arc<LogHub>, name: String, stream: LogStream, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => logs.push(&name, LogLine::new(stream, line)),
            Ok(None) => break,
            Err(e) => {
                debug!(process = %name, stream = %stream, error = %e, "Output stream closed");
                break;
            }
        }
    }
}

async fn monitor(
    name: String,
    mut child: Child,
    mut kill: oneshot::Receiver<()>,
    exit: Arc<std::sync::Mutex<Option<Exit>>>,
) {
    let (status, requested) = tokio::select! {
        status = child.wait() => (status, false),
        _ = &mut kill => {
            if let Err(e) = child.start_kill() {
                warn!(process = %name, error = %e, "Failed to kill process");
            }
            (child.wait().await, true)
        }
    };

    let code = status.as_ref().ok().and_then(|s| s.code());
    match (requested, code) {
        (true, _) => info!(process = %name, "Process stopped"),
        (false, Some(0)) => info!(process = %name, "Process exited"),
        (false, _) => warn!(process = %name, exit_code = ?code, "Process exited abnormally"),
    }

    if let Ok(mut slot) = exit.lock() {
        *slot = Some(Exit { code, requested });
    }
}

#[async_trait]
impl ProcessSupervisor for NativeSupervisor {
    #[instrument(skip(self, spec), fields(process = %spec.name))]
    async fn start(&self, spec: ProcessSpec) -> Result<ProcessHandle> {
        self.remove_if_exists(&spec.name).await?;

        let run = self.spawn(&spec)?;
        let handle = ProcessHandle {
            name: spec.name.clone(),
            pid: run.pid,
        };
        let managed = Managed {
            spec,
            restarts: 0,
            run: Some(run),
            last_exit: None,
        };
        self.processes
            .insert(handle.name.clone(), Arc::new(Mutex::new(managed)));
        Ok(handle)
    }

    #[instrument(skip(self))]
    async fn stop(&self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        let mut managed = entry.lock().await;
        self.halt_managed(name, &mut managed).await
    }

    #[instrument(skip(self))]
    async fn restart(&self, name: &str) -> Result<ProcessHandle> {
        let entry = self.entry(name)?;
        let mut managed = entry.lock().await;
        self.halt_managed(name, &mut managed).await?;

        let run = self.spawn(&managed.spec)?;
        let handle = ProcessHandle {
            name: name.to_string(),
            pid: run.pid,
        };
        managed.run = Some(run);
        managed.restarts += 1;
        Ok(handle)
    }

    async fn describe(&self, name: &str) -> Option<ProcessDescription> {
        let entry = self.entry(name).ok()?;
        let managed = entry.lock().await;
        Some(managed.describe(self.config.interpreter.as_deref()))
    }

    async fn remove_if_exists(&self, name: &str) -> Result<()> {
        let Ok(entry) = self.entry(name) else {
            return Ok(());
        };
        {
            let mut managed = entry.lock().await;
            self.halt_managed(name, &mut managed).await?;
        }

        // Forget the entry only once its child is gone
        self.processes
            .remove_if(name, |_, current| Arc::ptr_eq(current, &entry));
        debug!(process = %name, "Process removed");
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
        let names: Vec<String> = self.processes.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Err(e) = self.remove_if_exists(&name).await {
                warn!(process = %name, error = %e, "Failed to stop process on shutdown");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    fn supervisor() -> NativeSupervisor {
        NativeSupervisor::new(NativeSupervisorConfig {
            interpreter: Some("sh".to_string()),
            stop_timeout: Duration::from_secs(5),
            log_buffer_lines: 100,
        })
    }

    fn script(dir: &Path, body: &str) -> ProcessSpec {
        std::fs::write(dir.join("run.sh"), body).unwrap();
        ProcessSpec {
            name: "web".to_string(),
            entry_point: "run.sh".into(),
            working_dir: dir.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    async fn wait_until_exited(sup: &NativeSupervisor, name: &str) -> ProcessDescription {
        for _ in 0..100 {
            let desc = sup.describe(name).await.unwrap();
            if desc.state != RuntimeState::Running {
                return desc;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("process {} did not exit", name);
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_start_describe_stop() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor();

        let handle = sup.start(script(dir.path(), "sleep 30\n")).await.unwrap();
        assert!(handle.pid.is_some());

        let desc = sup.describe("web").await.unwrap();
        assert_eq!(desc.state, RuntimeState::Running);
        assert_eq!(desc.pid, handle.pid);

        sup.stop("web").await.unwrap();
        let desc = sup.describe("web").await.unwrap();
        assert_eq!(desc.state, RuntimeState::Stopped);
        assert_eq!(desc.pid, None);

        sup.remove_if_exists("web").await.unwrap();
        assert!(sup.describe("web").await.is_none());
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_nonzero_exit_is_errored() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor();

        sup.start(script(dir.path(), "exit 3\n")).await.unwrap();
        let desc = wait_until_exited(&sup, "web").await;
        assert_eq!(desc.state, RuntimeState::Errored);
        assert_eq!(desc.exit_code, Some(3));
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_output_is_captured_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor();
        let mut rx = sup.subscribe_logs("web");

        let mut spec = script(dir.path(), "echo \"hello $GREETING\"\necho oops 1>&2\n");
        spec.env.insert("GREETING".to_string(), "world".to_string());
        sup.start(spec).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(line.to_string());
        }
        assert!(seen.contains(&"[out] hello world".to_string()));
        assert!(seen.contains(&"[err] oops".to_string()));

        wait_until_exited(&sup, "web").await;
        assert_eq!(sup.recent_logs("web", 100).len(), 2);
        sup.clear_logs("web");
        assert!(sup.recent_logs("web", 100).is_empty());
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_restart_bumps_counter() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor();

        let first = sup.start(script(dir.path(), "sleep 30\n")).await.unwrap();
        let second = sup.restart("web").await.unwrap();
        assert_ne!(first.pid, second.pid);

        let desc = sup.describe("web").await.unwrap();
        assert_eq!(desc.restarts, 1);
        assert_eq!(desc.state, RuntimeState::Running);

        sup.shutdown().await;
        assert!(sup.describe("web").await.is_none());
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sup = NativeSupervisor::new(NativeSupervisorConfig {
            interpreter: Some("nonexistent_interpreter_12345".to_string()),
            ..NativeSupervisorConfig::default()
        });

        let err = sup.start(script(dir.path(), "true\n")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::SpawnFailed(_)));
        assert!(sup.describe("web").await.is_none());
    }

    #[tokio::test]
    async fn test_stop_timeout_keeps_process_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let sup = NativeSupervisor::new(NativeSupervisorConfig {
            interpreter: None,
            stop_timeout: Duration::from_millis(50),
            log_buffer_lines: 10,
        });

        // A child whose exit is never observed
        let (kill, _kill_rx) = oneshot::channel();
        let run = Run {
            pid: Some(4242),
            started_at: Utc::now(),
            kill: Some(kill),
            monitor: tokio::spawn(std::future::pending::<()>()),
            exit: Arc::new(std::sync::Mutex::new(None)),
        };
        let managed = Managed {
            spec: script(dir.path(), "true\n"),
            restarts: 0,
            run: Some(run),
            last_exit: None,
        };
        sup.processes
            .insert("web".to_string(), Arc::new(Mutex::new(managed)));

        assert!(matches!(
            sup.remove_if_exists("web").await,
            Err(SupervisorError::Timeout(_))
        ));
        let desc = sup.describe("web").await.unwrap();
        assert_eq!(desc.state, RuntimeState::Running);
        assert_eq!(desc.pid, Some(4242));

        assert!(matches!(
            sup.stop("web").await,
            Err(SupervisorError::Timeout(_))
        ));
        assert!(sup.describe("web").await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_process() {
        let sup = supervisor();
        assert!(sup.describe("ghost").await.is_none());
        assert!(matches!(
            sup.stop("ghost").await,
            Err(SupervisorError::NotFound(_))
        ));
        sup.remove_if_exists("ghost").await.unwrap();
    }
}
