//! Task status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a Task.
///
/// `Pending -> Running -> {Success, Failure}`. A new run of the same task
/// starts over from `Running` and overwrites the previous terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task created, never run.
    #[default]
    Pending,
    /// A run of this task is in progress.
    Running,
    /// Every step of the last run succeeded.
    Success,
    /// The last run failed.
    Failure,
}

impl TaskStatus {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
