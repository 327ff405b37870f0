//! Chain resolution.
//!
//! Turns a stored chain plus task-level overrides into the ordered list of
//! [`StepSpec`]s a run executes. Resolution is pure: the same chain,
//! overrides and registry snapshot always yield the same steps.

use crate::{
    ChainDefinition, CoreError, ParameterOverrides, Parameters, ProcessorRegistry, StepSpec,
};

/// Output group every binarization tool writes, regardless of its declaration.
pub const BINPAGE_FILE_GROUP: &str = "OCR-D-IMG-BINPAGE";

/// Processors whose output group is pinned to [`BINPAGE_FILE_GROUP`].
pub const PINNED_BINARIZERS: [&str; 2] = ["ocrd-olena-binarize", "ocrd-sbb-binarize"];

/// Resolves chains against a registry snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ChainResolver<'a> {
    registry: &'a ProcessorRegistry,
}

impl<'a> ChainResolver<'a> {
    /// Create a resolver over the given registry snapshot.
    pub fn new(registry: &'a ProcessorRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `chain` into its steps.
    ///
    /// Parameters merge key by key, later layers winning:
    /// registry defaults < chain overrides < task overrides.
    /// The first step reads `default_file_group`, every later step reads the
    /// output group of the step before it.
    pub fn resolve(
        &self,
        chain: &ChainDefinition,
        task_overrides: &ParameterOverrides,
        default_file_group: &str,
    ) -> Result<Vec<StepSpec>, CoreError> {
        let mut steps: Vec<StepSpec> = Vec::with_capacity(chain.processors.len());

        for (index, name) in chain.processors.iter().enumerate() {
            let processor = self
                .registry
                .get(name)
                .ok_or_else(|| CoreError::UnknownProcessor {
                    name: name.clone(),
                    chain: chain.id.to_string(),
                })?;

            let mut effective_parameters = processor.default_parameters.clone();
            overlay(&mut effective_parameters, chain.parameters.get(name));
            overlay(&mut effective_parameters, task_overrides.get(name));

            let input_file_group = match steps.last() {
                Some(previous) => previous.output_file_group.clone(),
                None => default_file_group.to_string(),
            };

            let output_file_group = if PINNED_BINARIZERS.contains(&name.as_str()) {
                BINPAGE_FILE_GROUP.to_string()
            } else {
                processor.output_file_group.clone()
            };

            steps.push(StepSpec {
                index,
                processor_name: name.clone(),
                executable: processor.executable.clone(),
                effective_parameters,
                input_file_group,
                output_file_group,
            });
        }

        Ok(steps)
    }
}

/// Shallow merge: every key of `layer` replaces the one in `base`.
fn overlay(base: &mut Parameters, layer: Option<&Parameters>) {
    if let Some(layer) = layer {
        for (key, value) in layer {
            base.insert(key.clone(), value.clone());
        }
    }
}
