//! Step execution.
//!
//! Runs one resolved step against the task workspace: hands the step's
//! groups and parameters to the processing tool, then reloads the manifest
//! so the next step sees the group this one produced.

use std::sync::Arc;

use butler_core::StepSpec;
use butler_tool::{InvocationResult, ToolError, ToolInvocation, ToolInvoker};
use thiserror::Error;
use tracing::{error, info};

use crate::workspace::{ResourceWorkspace, WorkspaceError};

/// Errors that end a run at a specific step.
#[derive(Debug, Error)]
pub enum StepError {
    /// The tool could not be run or exited abnormally.
    #[error("Step {index} ({processor}) failed: {source}")]
    Execution {
        index: usize,
        processor: String,
        #[source]
        source: ToolError,
    },

    /// The manifest could not be reloaded after the tool ran.
    #[error("Manifest reload after step {index} ({processor}) failed: {source}")]
    ManifestReload {
        index: usize,
        processor: String,
        #[source]
        source: WorkspaceError,
    },
}

impl StepError {
    /// Processor of the failing step.
    pub fn processor(&self) -> &str {
        match self {
            Self::Execution { processor, .. } | Self::ManifestReload { processor, .. } => {
                processor
            }
        }
    }

    /// Position of the failing step in the chain.
    pub fn index(&self) -> usize {
        match self {
            Self::Execution { index, .. } | Self::ManifestReload { index, .. } => *index,
        }
    }
}

/// Executes single steps with a tool invoker.
#[derive(Clone)]
pub struct StepExecutor {
    invoker: Arc<dyn ToolInvoker>,
    log_level: String,
}

impl StepExecutor {
    /// Create an executor handing `log_level` to every tool.
    pub fn new(invoker: Arc<dyn ToolInvoker>, log_level: impl Into<String>) -> Self {
        Self {
            invoker,
            log_level: log_level.into(),
        }
    }

    /// Build the invocation for a step in a workspace.
    pub fn invocation(&self, step: &StepSpec, workspace: &ResourceWorkspace) -> ToolInvocation {
        ToolInvocation::new(
            step.executable.clone(),
            workspace.manifest_path(),
            step.input_file_group.clone(),
            step.output_file_group.clone(),
        )
        .with_working_dir(workspace.dir())
        .with_parameters(step.parameter_payload())
        .with_log_level(self.log_level.clone())
    }

    /// Run a step to completion and reload the workspace manifest.
    pub async fn execute(
        &self,
        step: &StepSpec,
        workspace: &mut ResourceWorkspace,
    ) -> Result<InvocationResult, StepError> {
        let previous_version = workspace.version();
        info!(
            step = step.index,
            processor = %step.processor_name,
            input_file_grp = %step.input_file_group,
            output_file_grp = %step.output_file_group,
            manifest_version = previous_version,
            "Executing step"
        );

        let invocation = self.invocation(step, workspace);
        let result = self.invoker.invoke(&invocation).await.map_err(|source| {
            error!(step = step.index, processor = %step.processor_name, error = %source, "Step failed");
            StepError::Execution {
                index: step.index,
                processor: step.processor_name.clone(),
                source,
            }
        })?;

        let version = workspace
            .reload()
            .await
            .map_err(|source| StepError::ManifestReload {
                index: step.index,
                processor: step.processor_name.clone(),
                source,
            })?;

        info!(
            step = step.index,
            processor = %step.processor_name,
            duration_ms = result.duration_ms,
            manifest_version = version,
            produced = workspace.manifest().find_files(&step.output_file_group).len(),
            "Step finished"
        );
        Ok(result)
    }
}
