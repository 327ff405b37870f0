//! Error types for tool invocation.

use thiserror::Error;

/// Errors that can occur while running a processing tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool executable not found.
    #[error("Tool '{0}' not found. Ensure it is installed and on PATH.")]
    NotFound(String),

    /// Failed to spawn the tool process.
    #[error("Failed to spawn tool process: {0}")]
    SpawnError(#[from] std::io::Error),

    /// Tool exited abnormally.
    #[error("Tool '{executable}' exited with code {code}: {diagnostic}")]
    ProcessError {
        executable: String,
        code: i32,
        diagnostic: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Tool output did not follow the expected protocol.
    #[error("Protocol error: {0}")]
    ProtocolError(String),
}
