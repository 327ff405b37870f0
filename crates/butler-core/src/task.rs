//! Task type.

use crate::{ChainId, ParameterOverrides, RunReport, RunUid, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// File group a task starts from when none is given.
pub const DEFAULT_FILE_GROUP: &str = "DEFAULT";

/// A Task is one run request of a chain against a source resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Run identifier, names the task's working directory.
    pub uid: RunUid,

    /// Location of the source manifest (path or URL).
    pub src: String,

    /// File group the first step reads.
    #[serde(default = "default_file_group")]
    pub default_file_group: String,

    /// Chain to run.
    pub chain_id: ChainId,

    /// Task-level parameter overrides, keyed by processor name.
    #[serde(default)]
    pub parameters: ParameterOverrides,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Current task status.
    #[serde(default)]
    pub status: TaskStatus,

    /// Payload of the last terminal event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<RunReport>,

    /// When the task was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_file_group() -> String {
    DEFAULT_FILE_GROUP.to_string()
}

impl Task {
    /// Create a new pending Task.
    pub fn new(chain_id: ChainId, src: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            uid: RunUid::generate(),
            src: src.into(),
            default_file_group: default_file_group(),
            chain_id,
            parameters: ParameterOverrides::new(),
            description: String::new(),
            status: TaskStatus::Pending,
            results: None,
            created_at: Utc::now(),
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder method to set the run uid.
    pub fn with_uid(mut self, uid: RunUid) -> Self {
        self.uid = uid;
        self
    }

    /// Builder method to set the default file group.
    pub fn with_default_file_group(mut self, group: impl Into<String>) -> Self {
        self.default_file_group = group.into();
        self
    }

    /// Builder method to override one parameter of one processor.
    pub fn with_parameter(
        mut self,
        processor: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.parameters
            .entry(processor.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new(ChainId::new("1"), "http://foo.bar/mets.xml");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.default_file_group, DEFAULT_FILE_GROUP);
        assert!(task.results.is_none());
        assert!(task.uid.is_path_safe());
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_task_deserialize_defaults() {
        let task: Task = serde_json::from_value(json!({
            "id": "1",
            "uid": "abc",
            "src": "/data/mets.xml",
            "chain_id": "1",
            "parameters": {"ocrd-calamari-recognize": {"checkpoint": "/models/*.ckpt.json"}}
        }))
        .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.default_file_group, "DEFAULT");
        assert_eq!(
            task.parameters["ocrd-calamari-recognize"]["checkpoint"],
            json!("/models/*.ckpt.json")
        );
    }
}
