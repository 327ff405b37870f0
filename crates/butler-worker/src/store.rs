//! Chain and task storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use butler_core::{ChainDefinition, ChainId, LifecycleEvent, Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::sink::StatusSink;

/// Errors while reading or writing a store file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on store '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid store '{path}': {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to stored chains and tasks.
#[async_trait]
pub trait TaskCatalog: Send + Sync {
    /// Look up a task by id.
    async fn get_task(&self, id: &TaskId) -> Option<Task>;

    /// Look up a chain by id.
    async fn get_chain(&self, id: &ChainId) -> Option<ChainDefinition>;
}

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub chains: Vec<ChainDefinition>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// In-memory chain and task store.
///
/// Serves as the catalog a coordinator reads from and as the status sink
/// that records run outcomes on the stored tasks.
#[derive(Default)]
pub struct MemoryStore {
    /// Chains indexed by ChainId.
    chains: RwLock<HashMap<ChainId, ChainDefinition>>,

    /// Tasks indexed by TaskId.
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl MemoryStore {
    /// Create an empty store wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a store holding the snapshot's chains and tasks.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Arc<Self> {
        let chains = snapshot
            .chains
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let tasks = snapshot.tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Arc::new(Self {
            chains: RwLock::new(chains),
            tasks: RwLock::new(tasks),
        })
    }

    /// Load a store from a JSON snapshot file.
    pub async fn load(path: &Path) -> Result<Arc<Self>, StoreError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: StoreSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Current contents, chains and tasks sorted by id.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let mut chains: Vec<_> = self.chains.read().await.values().cloned().collect();
        chains.sort_by(|a, b| a.id.cmp(&b.id));
        let mut tasks: Vec<_> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        StoreSnapshot { chains, tasks }
    }

    /// Write the current contents to a JSON snapshot file.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.snapshot().await).map_err(|source| {
            StoreError::Format {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Add or replace a chain.
    pub async fn insert_chain(&self, chain: ChainDefinition) {
        self.chains.write().await.insert(chain.id.clone(), chain);
    }

    /// Add or replace a task.
    pub async fn insert_task(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    async fn update_task(&self, id: &TaskId, update: impl FnOnce(&mut Task)) {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(id) {
            Some(task) => update(task),
            None => warn!(task_id = %id, "Lifecycle event for unknown task"),
        }
    }
}

#[async_trait]
impl TaskCatalog for MemoryStore {
    async fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    async fn get_chain(&self, id: &ChainId) -> Option<ChainDefinition> {
        self.chains.read().await.get(id).cloned()
    }
}

#[async_trait]
impl StatusSink for MemoryStore {
    async fn on_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::RunStarted { task_id } => {
                self.update_task(&task_id, |task| {
                    task.status = TaskStatus::Running;
                    task.results = None;
                })
                .await;
            }
            LifecycleEvent::RunFinished { .. } => {}
            LifecycleEvent::Succeeded(report) => {
                let task_id = report.task_id.clone();
                self.update_task(&task_id, |task| {
                    task.status = TaskStatus::Success;
                    task.results = Some(report);
                })
                .await;
                info!(task_id = %task_id, "Success on task");
            }
            LifecycleEvent::Failed(report) => {
                let task_id = report.task_id.clone();
                self.update_task(&task_id, |task| {
                    task.status = TaskStatus::Failure;
                    task.results = Some(report);
                })
                .await;
                info!(task_id = %task_id, "Failure on task");
            }
        }
    }
}
