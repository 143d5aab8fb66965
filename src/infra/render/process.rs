use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use metrics::histogram;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

pub(crate) const METRIC_STAGE_MS: &str = "mdpress_stage_ms";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} is not installed or not on PATH: {source}")]
    NotFound {
        tool: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{tool} failed: {stderr}")]
    Failed {
        tool: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{tool} did not finish within {} seconds", timeout.as_secs())]
    TimedOut {
        tool: &'static str,
        timeout: Duration,
    },
    #[error("failed to prepare {tool} workspace: {source}")]
    Io {
        tool: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    pub(crate) fn io(tool: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| ToolError::Io { tool, source }
    }
}

/// One external executable invocation with captured stderr and a hard deadline.
#[derive(Debug)]
pub(crate) struct ToolInvocation {
    tool: &'static str,
    command: Command,
    timeout: Duration,
}

impl ToolInvocation {
    pub(crate) fn new(tool: &'static str, program: &Path, timeout: Duration) -> Self {
        let mut command = Command::new(program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Self {
            tool,
            command,
            timeout,
        }
    }

    pub(crate) fn arg(&mut self, value: impl AsRef<std::ffi::OsStr>) -> &mut Self {
        self.command.arg(value);
        self
    }

    pub(crate) fn current_dir(&mut self, dir: &Path) -> &mut Self {
        self.command.current_dir(dir);
        self
    }

    pub(crate) fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.command.env(key, value);
        self
    }

    pub(crate) async fn run(mut self) -> Result<(), ToolError> {
        let tool = self.tool;
        let started_at = Instant::now();

        let child = self.command.spawn().map_err(|err| {
            warn!(
                target = "mdpress::render",
                op = tool,
                result = "error",
                error_code = "spawn",
                error = %err,
                "Failed to spawn external tool"
            );
            if err.kind() == ErrorKind::NotFound {
                ToolError::NotFound { tool, source: err }
            } else {
                ToolError::Spawn { tool, source: err }
            }
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Spawn { tool, source })?,
            Err(_) => {
                warn!(
                    target = "mdpress::render",
                    op = tool,
                    result = "timeout",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    timeout_secs = self.timeout.as_secs(),
                    "External tool exceeded its deadline"
                );
                return Err(ToolError::TimedOut {
                    tool,
                    timeout: self.timeout,
                });
            }
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!(METRIC_STAGE_MS, "stage" => tool).record(elapsed_ms as f64);

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            warn!(
                target = "mdpress::render",
                op = tool,
                result = "error",
                elapsed_ms,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                error_code = "exit_status",
                stderr = %stderr,
                "External tool invocation failed"
            );
            return Err(ToolError::Failed {
                tool,
                exit_code,
                stderr,
            });
        }

        info!(
            target = "mdpress::render",
            op = tool,
            result = "ok",
            elapsed_ms,
            "External tool finished"
        );
        Ok(())
    }
}

/// Create the parent directory of `path` when it is missing.
pub(crate) async fn ensure_parent(tool: &'static str, path: &Path) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(ToolError::io(tool))?;
    }
    Ok(())
}

pub(crate) fn output_path(dir: &Path, basename: &str, extension: &str) -> PathBuf {
    dir.join(format!("{basename}.{extension}"))
}
