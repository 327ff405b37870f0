//! Tool description introspection.

use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::error::ToolError;

/// Ask a processor for its tool description (`<executable> -J`).
pub async fn dump_tool_json(executable: &str) -> Result<Value, ToolError> {
    debug!(executable = %executable, "Dumping tool description");

    let output = Command::new(executable)
        .arg("-J")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound(executable.to_string())
            } else {
                ToolError::SpawnError(e)
            }
        })?;

    if !output.status.success() {
        return Err(ToolError::ProcessError {
            executable: executable.to_string(),
            code: output.status.code().unwrap_or(-1),
            diagnostic: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool() {
        let err = dump_tool_json("butler-no-such-tool-on-path").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_non_json_output() {
        // echo prints "-J" back, which is not a JSON document
        let err = dump_tool_json("echo").await.unwrap_err();
        assert!(matches!(err, ToolError::JsonError(_)));
    }

    #[tokio::test]
    async fn test_failing_tool() {
        let err = dump_tool_json("false").await.unwrap_err();
        assert!(matches!(err, ToolError::ProcessError { code: 1, .. }));
    }
}
