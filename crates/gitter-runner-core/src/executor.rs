//! multi-gitter invocation and outcome capture.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Arguments of one tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInvocation {
    /// Staged script artifact.
    pub script: PathBuf,
    /// Staged configuration artifact.
    pub config: PathBuf,
    /// Preview changes without pushing.
    pub dry_run: bool,
}

/// Outcome of a tool run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether the tool exited with status 0.
    pub succeeded: bool,

    /// Exit code; `None` when the tool never ran, was killed, or timed out.
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr, or the spawn/timeout reason.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the run was cut off by the timeout.
    pub timed_out: bool,
}

impl RunResult {
    /// A run that never started, e.g. because staging failed.
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            exit_code: None,
            stdout: String::new(),
            stderr: reason.into(),
            duration_ms: 0,
            timed_out: false,
        }
    }
}

/// Runs the external batch-mutation tool.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion. Failures are reported in the result, never raised.
    async fn run(&self, invocation: &RunInvocation) -> RunResult;
}

/// `multi-gitter run <script> --config <config> [--dry-run]`.
#[derive(Debug, Clone)]
pub struct MultiGitter {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl MultiGitter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill the tool if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command-line arguments for `invocation`.
    pub fn args(&self, invocation: &RunInvocation) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "run".into(),
            invocation.script.clone().into_os_string(),
            "--config".into(),
            invocation.config.clone().into_os_string(),
        ];
        if invocation.dry_run {
            args.push("--dry-run".into());
        }
        args
    }
}

#[async_trait]
impl ToolRunner for MultiGitter {
    async fn run(&self, invocation: &RunInvocation) -> RunResult {
        let start = Instant::now();

        let child = Command::new(&self.program)
            .args(self.args(invocation))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return RunResult::not_started(format!(
                    "failed to spawn {}: {e}",
                    self.program.display()
                ))
            }
        };

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    // The child is dropped with the future and killed.
                    return RunResult {
                        succeeded: false,
                        exit_code: None,
                        stdout: String::new(),
                        stderr: format!("timed out after {} seconds", limit.as_secs()),
                        duration_ms: start.elapsed().as_millis() as u64,
                        timed_out: true,
                    };
                }
            },
            None => child.wait_with_output().await,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match waited {
            Ok(output) => RunResult {
                succeeded: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration_ms,
                timed_out: false,
            },
            Err(e) => RunResult {
                duration_ms,
                ..RunResult::not_started(format!("failed to wait for tool: {e}"))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(dry_run: bool) -> RunInvocation {
        RunInvocation {
            script: PathBuf::from("/stage/script.sh"),
            config: PathBuf::from("/stage/config.yaml"),
            dry_run,
        }
    }

    #[test]
    fn test_args_dry_run() {
        let args = MultiGitter::new("multi-gitter").args(&invocation(true));
        assert_eq!(
            args,
            vec![
                OsString::from("run"),
                OsString::from("/stage/script.sh"),
                OsString::from("--config"),
                OsString::from("/stage/config.yaml"),
                OsString::from("--dry-run"),
            ]
        );
    }

    #[test]
    fn test_args_real_run_has_no_dry_run_flag() {
        let args = MultiGitter::new("multi-gitter").args(&invocation(false));
        assert!(!args.contains(&OsString::from("--dry-run")));
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_not_started() {
        let result = RunResult::not_started("no binary");
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, None);
        assert_eq!(result.stderr, "no binary");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_succeeds() {
        let result = MultiGitter::new("true").run(&invocation(true)).await;
        assert!(result.succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let result = MultiGitter::new("false").run(&invocation(false)).await;
        assert!(!result.succeeded);
        assert_ne!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_captured() {
        let result = MultiGitter::new("/nonexistent/multi-gitter")
            .run(&invocation(true))
            .await;
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, None);
        assert!(result.stderr.contains("failed to spawn"));
    }
}
