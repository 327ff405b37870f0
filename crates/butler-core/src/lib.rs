//! Butler Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Process spawning
//! - Network/file fetching
//! - Runtime specifics
//!
//! It also holds the chain resolver, which turns a stored chain plus
//! per-task parameter overrides into the ordered steps of a run.

pub mod chain;
pub mod error;
pub mod event;
pub mod ids;
pub mod processor;
pub mod resolver;
pub mod status;
pub mod step;
pub mod task;

// Re-export commonly used types
pub use chain::{ChainDefinition, ParameterOverrides};
pub use error::CoreError;
pub use event::{LifecycleEvent, RunReport};
pub use ids::{ChainId, RunUid, TaskId};
pub use processor::{Parameters, ProcessorDefinition, ProcessorRegistry};
pub use resolver::{ChainResolver, BINPAGE_FILE_GROUP, PINNED_BINARIZERS};
pub use status::TaskStatus;
pub use step::StepSpec;
pub use task::Task;
