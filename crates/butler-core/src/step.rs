//! Resolved steps of a chain run.

use serde::{Deserialize, Serialize};

use crate::Parameters;

/// One fully-resolved, order-positioned invocation of a processor.
///
/// Produced fresh by the chain resolver for every run and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Position of the step in the chain, starting at 0.
    pub index: usize,

    /// Registry name of the processor.
    pub processor_name: String,

    /// Executable to invoke.
    pub executable: String,

    /// Defaults merged with chain and task overrides.
    pub effective_parameters: Parameters,

    /// File group the step reads.
    pub input_file_group: String,

    /// File group the step writes.
    pub output_file_group: String,
}

impl StepSpec {
    /// Serialize the effective parameters into the payload handed to tools.
    pub fn parameter_payload(&self) -> String {
        serde_json::Value::Object(self.effective_parameters.clone()).to_string()
    }
}
