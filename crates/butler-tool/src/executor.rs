//! Tool executor for running processors via subprocess.
//!
//! This module provides the [`ToolInvoker`] seam used by the step executor
//! and [`ProcessInvoker`], its implementation over `tokio::process`.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::ToolError;
use crate::invocation::ToolInvocation;

/// Number of trailing stderr lines kept as failure diagnostic.
const DIAGNOSTIC_LINES: usize = 20;

/// Result of a successful tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    /// Exit code of the tool.
    pub exit_code: i32,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Runs one processing tool to completion.
///
/// Implementations block (asynchronously) until the tool has exited; a
/// non-zero exit is reported as [`ToolError::ProcessError`].
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Run the invocation.
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<InvocationResult, ToolError>;
}

/// Invokes tools as child processes.
///
/// # Example
///
/// ```rust,no_run
/// use butler_tool::{ProcessInvoker, ToolInvocation, ToolInvoker};
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let invoker = ProcessInvoker::new();
///     let invocation = ToolInvocation::new("ocrd-dummy", "mets.xml", "IN", "OUT");
///     invoker.invoke(&invocation).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker;

impl ProcessInvoker {
    /// Create a new invoker.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<InvocationResult, ToolError> {
        let working_dir = invocation.effective_working_dir();
        info!(
            executable = %invocation.executable,
            working_dir = %working_dir.display(),
            input_file_grp = %invocation.input_file_group,
            output_file_grp = %invocation.output_file_group,
            "Spawning tool process"
        );

        let mut cmd = Command::new(&invocation.executable);
        cmd.args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(working_dir);

        debug!("Full command: {:?}", cmd);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            error!(executable = %invocation.executable, error = %e, "Failed to spawn tool process");
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound(invocation.executable.clone())
            } else {
                ToolError::SpawnError(e)
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::ProtocolError("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::ProtocolError("Failed to get stderr".to_string()))?;

        // stderr is logged and its tail kept for the failure diagnostic
        let executable = invocation.executable.clone();
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            let mut tail = VecDeque::with_capacity(DIAGNOSTIC_LINES);
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim_end();
                        if trimmed.is_empty() {
                            continue;
                        }
                        warn!(tool = %executable, stderr = %trimmed, "Tool stderr");
                        if tail.len() == DIAGNOSTIC_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(trimmed.to_string());
                    }
                    Err(e) => {
                        error!(error = %e, "Error reading tool stderr");
                        break;
                    }
                }
            }
            tail
        });

        let executable = invocation.executable.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => debug!(tool = %executable, stdout = %line, "Tool stdout"),
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Error reading tool stdout");
                        break;
                    }
                }
            }
        });

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let tail = stderr_task.await.unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            executable = %invocation.executable,
            exit_code = exit_code,
            duration_ms = duration_ms,
            success = status.success(),
            "Tool process exited"
        );

        if !status.success() {
            let diagnostic = if tail.is_empty() {
                "no output on stderr".to_string()
            } else {
                Vec::from(tail).join("\n")
            };
            return Err(ToolError::ProcessError {
                executable: invocation.executable.clone(),
                code: exit_code,
                diagnostic,
            });
        }

        Ok(InvocationResult {
            exit_code,
            duration_ms,
        })
    }
}
