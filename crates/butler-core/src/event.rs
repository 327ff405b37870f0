//! Lifecycle events emitted by a task run.

use crate::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal payload of a run, stored as the task's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Task the run belongs to.
    pub task_id: TaskId,

    /// Working directory holding the step outputs, once it exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_dir: Option<PathBuf>,

    /// Terminal status of the run.
    pub status: TaskStatus,

    /// Failure cause, if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,

    /// Processor of the failing step, if a step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_processor: Option<String>,
}

impl RunReport {
    /// Report of a run whose steps all succeeded.
    pub fn success(task_id: TaskId, result_dir: PathBuf) -> Self {
        Self {
            task_id,
            result_dir: Some(result_dir),
            status: TaskStatus::Success,
            cause: None,
            failed_processor: None,
        }
    }

    /// Report of a failed run.
    pub fn failure(task_id: TaskId, cause: impl Into<String>) -> Self {
        Self {
            task_id,
            result_dir: None,
            status: TaskStatus::Failure,
            cause: Some(cause.into()),
            failed_processor: None,
        }
    }

    /// Builder method to record the working directory.
    pub fn with_result_dir(mut self, result_dir: PathBuf) -> Self {
        self.result_dir = Some(result_dir);
        self
    }

    /// Builder method to record the failing processor.
    pub fn with_failed_processor(mut self, processor: impl Into<String>) -> Self {
        self.failed_processor = Some(processor.into());
        self
    }

    /// Returns true if the run succeeded.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// A lifecycle event of one run attempt.
///
/// Every attempt emits `RunStarted`, then `RunFinished`, then exactly one of
/// `Succeeded` or `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Run execution begins.
    RunStarted { task_id: TaskId },
    /// Run execution ended, successfully or not.
    RunFinished { task_id: TaskId },
    /// Every step succeeded.
    Succeeded(RunReport),
    /// The run failed.
    Failed(RunReport),
}

impl LifecycleEvent {
    /// Task the event belongs to.
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::RunStarted { task_id } | Self::RunFinished { task_id } => task_id,
            Self::Succeeded(report) | Self::Failed(report) => &report.task_id,
        }
    }

    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_report_wire_format() {
        let report = RunReport::success(TaskId::new("1"), PathBuf::from("/tmp/results/abc"));
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"task_id": "1", "result_dir": "/tmp/results/abc", "status": "SUCCESS"})
        );
        assert!(report.is_success());
    }

    #[test]
    fn test_failure_report() {
        let report = RunReport::failure(TaskId::new("2"), "tool exited with code 1")
            .with_failed_processor("ocrd-tesserocr-segment-line");

        assert!(!report.is_success());
        assert_eq!(report.status, TaskStatus::Failure);
        assert!(report.result_dir.is_none());
        assert_eq!(
            report.failed_processor.as_deref(),
            Some("ocrd-tesserocr-segment-line")
        );
    }

    #[test]
    fn test_event_task_id_and_terminal() {
        let started = LifecycleEvent::RunStarted {
            task_id: TaskId::new("1"),
        };
        let failed = LifecycleEvent::Failed(RunReport::failure(TaskId::new("1"), "boom"));

        assert_eq!(started.task_id().as_str(), "1");
        assert_eq!(failed.task_id().as_str(), "1");
        assert!(!started.is_terminal());
        assert!(failed.is_terminal());
    }
}
