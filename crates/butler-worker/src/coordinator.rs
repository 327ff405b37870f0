//! Task run coordination.
//!
//! A run looks up its task and chain, resolves the chain into steps,
//! prepares the task workspace once and then executes the steps in order,
//! stopping at the first failure. Every run that finds its task is bracketed
//! by `RunStarted`/`RunFinished` and ends with exactly one of `Succeeded` or
//! `Failed`, in that order, on the injected [`StatusSink`].

use std::path::PathBuf;
use std::sync::Arc;

use butler_core::{
    ChainId, ChainResolver, CoreError, LifecycleEvent, ProcessorRegistry, RunReport, Task, TaskId,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::executor::{StepError, StepExecutor};
use crate::sink::StatusSink;
use crate::store::TaskCatalog;
use crate::workspace::{WorkspaceError, WorkspaceManager};

/// Why a run did not succeed.
#[derive(Debug, Error)]
pub enum RunError {
    /// No task with this id exists. No events are emitted.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// The task's chain does not exist.
    #[error("Chain {chain_id} of task {task_id} not found")]
    ChainNotFound { task_id: TaskId, chain_id: ChainId },

    /// The chain could not be resolved against the registry.
    #[error("Task {task_id}: {source}")]
    Resolve {
        task_id: TaskId,
        #[source]
        source: CoreError,
    },

    /// The workspace could not be materialized. No step ran.
    #[error("Task {task_id}: workspace preparation failed: {source}")]
    Workspace {
        task_id: TaskId,
        #[source]
        source: WorkspaceError,
    },

    /// A step failed; the remaining steps were not run.
    #[error("Task {task_id}: {source}")]
    Step {
        task_id: TaskId,
        result_dir: PathBuf,
        #[source]
        source: StepError,
    },
}

impl RunError {
    /// Task the failed run belongs to.
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::TaskNotFound(task_id)
            | Self::ChainNotFound { task_id, .. }
            | Self::Resolve { task_id, .. }
            | Self::Workspace { task_id, .. }
            | Self::Step { task_id, .. } => task_id,
        }
    }

    /// True when steps were executing, false when the run could not even
    /// start.
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::Step { .. })
    }

    /// Processor of the failing step, when a step failed.
    pub fn failed_processor(&self) -> Option<&str> {
        match self {
            Self::Step { source, .. } => Some(source.processor()),
            _ => None,
        }
    }

    /// Failure payload handed to the status sink.
    pub fn report(&self) -> RunReport {
        let mut report = RunReport::failure(self.task_id().clone(), self.to_string());
        if let Self::Step {
            result_dir, source, ..
        } = self
        {
            report = report
                .with_result_dir(result_dir.clone())
                .with_failed_processor(source.processor());
        }
        report
    }
}

/// Runs tasks from a catalog and reports their lifecycle to a sink.
pub struct TaskRunCoordinator {
    registry: Arc<ProcessorRegistry>,
    catalog: Arc<dyn TaskCatalog>,
    sink: Arc<dyn StatusSink>,
    workspaces: WorkspaceManager,
    executor: StepExecutor,
}

impl TaskRunCoordinator {
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        catalog: Arc<dyn TaskCatalog>,
        sink: Arc<dyn StatusSink>,
        workspaces: WorkspaceManager,
        executor: StepExecutor,
    ) -> Self {
        Self {
            registry,
            catalog,
            sink,
            workspaces,
            executor,
        }
    }

    /// Run a task to completion.
    ///
    /// Returns the success payload, or the error that ended the run. Both
    /// are also delivered to the sink as the terminal event.
    pub async fn run_task(&self, task_id: &TaskId) -> Result<RunReport, RunError> {
        let task = self
            .catalog
            .get_task(task_id)
            .await
            .ok_or_else(|| RunError::TaskNotFound(task_id.clone()))?;

        info!(task_id = %task.id, chain_id = %task.chain_id, uid = %task.uid, "Run started");
        self.emit(LifecycleEvent::RunStarted {
            task_id: task.id.clone(),
        })
        .await;

        let outcome = self.execute_run(&task).await;

        self.emit(LifecycleEvent::RunFinished {
            task_id: task.id.clone(),
        })
        .await;

        match outcome {
            Ok(report) => {
                info!(task_id = %task.id, result_dir = ?report.result_dir, "Run succeeded");
                self.emit(LifecycleEvent::Succeeded(report.clone())).await;
                Ok(report)
            }
            Err(e) => {
                if e.is_step_failure() {
                    error!(task_id = %task.id, processor = ?e.failed_processor(), error = %e, "Run failed");
                } else {
                    warn!(task_id = %task.id, error = %e, "Run could not start");
                }
                self.emit(LifecycleEvent::Failed(e.report())).await;
                Err(e)
            }
        }
    }

    /// Run a task on its own tokio task.
    pub fn spawn_run(self: Arc<Self>, task_id: TaskId) -> JoinHandle<Result<RunReport, RunError>> {
        tokio::spawn(async move { self.run_task(&task_id).await })
    }

    async fn execute_run(&self, task: &Task) -> Result<RunReport, RunError> {
        let chain = self
            .catalog
            .get_chain(&task.chain_id)
            .await
            .ok_or_else(|| RunError::ChainNotFound {
                task_id: task.id.clone(),
                chain_id: task.chain_id.clone(),
            })?;

        let steps = ChainResolver::new(&self.registry)
            .resolve(&chain, &task.parameters, &task.default_file_group)
            .map_err(|source| RunError::Resolve {
                task_id: task.id.clone(),
                source,
            })?;

        let mut workspace = self
            .workspaces
            .prepare(&task.src, &task.uid, &task.default_file_group)
            .await
            .map_err(|source| RunError::Workspace {
                task_id: task.id.clone(),
                source,
            })?;

        info!(task_id = %task.id, chain = %chain.name, steps = steps.len(), "Executing chain");

        for step in &steps {
            self.executor
                .execute(step, &mut workspace)
                .await
                .map_err(|source| RunError::Step {
                    task_id: task.id.clone(),
                    result_dir: workspace.dir().to_path_buf(),
                    source,
                })?;
        }

        Ok(RunReport::success(
            task.id.clone(),
            workspace.dir().to_path_buf(),
        ))
    }

    async fn emit(&self, event: LifecycleEvent) {
        self.sink.on_event(event).await;
    }
}
