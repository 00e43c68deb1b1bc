//! Dependency installation for extracted releases
//!
//! Installation is an opaque external command run inside the release's
//! working directory, `npm install --omit=dev` by default.

use crate::error::{DeploymentError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Installs a release's dependencies before it is started
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(&self, working_dir: &Path) -> Result<()>;
}

/// Installer that does nothing
pub struct NoopInstaller;

#[async_trait]
impl DependencyInstaller for NoopInstaller {
    async fn install(&self, _working_dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// Runs a fixed command in the working directory
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    /// Build from `[program, args...]`; `None` for an empty command
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl DependencyInstaller for CommandInstaller {
    #[instrument(skip(self), fields(command = %self.describe()))]
    async fn install(&self, working_dir: &Path) -> Result<()> {
        // Dropping the future (timeout) kills the child
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                DeploymentError::DependencyInstallFailed(format!("failed to run {}: {}", self.program, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(stdout = %stdout.trim_end(), stderr = %stderr.trim_end(), "Installer output");

        if !output.status.success() {
            return Err(DeploymentError::DependencyInstallFailed(format!(
                "{} exited with {}: {}",
                self.describe(),
                output.status,
                last_line(&stderr)
            )));
        }

        info!("Dependencies installed");
        Ok(())
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> CommandInstaller {
        let parts: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        CommandInstaller::from_command(&parts).unwrap()
    }

    #[test]
    fn test_empty_command() {
        assert!(CommandInstaller::from_command(&[]).is_none());
    }

    #[cfg(unix)]
    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_success_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        cmd(&["sh", "-c", "touch installed"])
            .install(dir.path())
            .await
            .unwrap();
        assert!(dir.path().join("installed").exists());
    }

    #[cfg(unix)]
    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd(&["sh", "-c", "echo 'registry unreachable' >&2; exit 1"])
            .install(dir.path())
            .await
            .unwrap_err();

        match err {
            DeploymentError::DependencyInstallFailed(msg) => assert!(msg.contains("registry unreachable")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd(&["nonexistent_installer_12345"])
            .install(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::DependencyInstallFailed(_)));
    }
}
