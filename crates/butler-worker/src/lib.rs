//! Butler worker.
//!
//! Runs the processing chain of a stored task: resolves the chain against
//! the processor registry, materializes the task workspace, executes each
//! step with an external tool and reports the run lifecycle to a
//! [`StatusSink`].

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod manifest;
pub mod registry;
pub mod sink;
pub mod store;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use config::{Config, Profile};
pub use coordinator::{RunError, TaskRunCoordinator};
pub use executor::{StepError, StepExecutor};
pub use manifest::{Manifest, ManifestError, ManifestFile};
pub use registry::load_registry;
pub use sink::{ChannelStatusSink, SinkSet, StatusSink};
pub use store::{MemoryStore, StoreError, StoreSnapshot, TaskCatalog};
pub use workspace::{ResourceWorkspace, WorkspaceError, WorkspaceManager};
