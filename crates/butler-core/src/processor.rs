//! Processor definitions and the registry snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::CoreError;

/// Parameter bundle handed to a processor.
///
/// Keys are kept sorted so that serialized payloads are stable.
pub type Parameters = serde_json::Map<String, Value>;

/// A processing tool known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorDefinition {
    /// Registry name (usually the executable name).
    pub name: String,

    /// Executable invoked for a step of this processor.
    pub executable: String,

    /// Declared default parameter values.
    #[serde(default)]
    pub default_parameters: Parameters,

    /// Declared input file group(s), comma-separated.
    #[serde(default)]
    pub input_file_group: String,

    /// Declared output file group(s), comma-separated.
    #[serde(default)]
    pub output_file_group: String,

    /// Raw tool description this definition was built from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
}

impl ProcessorDefinition {
    /// Create a definition whose executable is its name.
    pub fn new(
        name: impl Into<String>,
        input_file_group: impl Into<String>,
        output_file_group: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            executable: name.clone(),
            name,
            default_parameters: Parameters::new(),
            input_file_group: input_file_group.into(),
            output_file_group: output_file_group.into(),
            description: None,
        }
    }

    /// Builder method to set a default parameter.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_parameters.insert(key.into(), value.into());
        self
    }

    /// Builder method to set the executable.
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Build a definition from a tool description document.
    ///
    /// Understands the `ocrd-tool` layout: `executable`, `parameters` with a
    /// `default` per parameter, and `input_file_grp`/`output_file_grp` given
    /// either as a string or a list of group names.
    pub fn from_tool_json(name: &str, tool: &Value) -> Result<Self, CoreError> {
        let obj = tool.as_object().ok_or_else(|| {
            CoreError::InvalidInput(format!("tool description of '{}' is not an object", name))
        })?;

        let executable = obj
            .get("executable")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();

        let mut default_parameters = Parameters::new();
        if let Some(params) = obj.get("parameters").and_then(Value::as_object) {
            for (key, spec) in params {
                if let Some(default) = spec.get("default") {
                    default_parameters.insert(key.clone(), default.clone());
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            executable,
            default_parameters,
            input_file_group: file_groups(obj.get("input_file_grp"), name)?,
            output_file_group: file_groups(obj.get("output_file_grp"), name)?,
            description: Some(tool.clone()),
        })
    }
}

fn file_groups(value: Option<&Value>, name: &str) -> Result<String, CoreError> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Array(items)) => {
            let groups = items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        CoreError::InvalidInput(format!(
                            "file group of '{}' is not a string: {}",
                            name, item
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(groups.join(","))
        }
        Some(other) => Err(CoreError::InvalidInput(format!(
            "unexpected file group declaration of '{}': {}",
            name, other
        ))),
    }
}

/// Immutable snapshot of the known processors.
///
/// Built once before any chain is resolved and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, ProcessorDefinition>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a processor. A later definition of the same
    /// name replaces the earlier one.
    pub fn with_processor(mut self, definition: ProcessorDefinition) -> Self {
        self.processors.insert(definition.name.clone(), definition);
        self
    }

    /// Look up a processor by name.
    pub fn get(&self, name: &str) -> Option<&ProcessorDefinition> {
        self.processors.get(name)
    }

    /// Returns true if the registry knows the processor.
    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Returns true if no processor is registered.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Iterate processors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessorDefinition> {
        self.processors.values()
    }
}

impl FromIterator<ProcessorDefinition> for ProcessorRegistry {
    fn from_iter<I: IntoIterator<Item = ProcessorDefinition>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |registry, def| registry.with_processor(def))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_tool_json() {
        let tool = json!({
            "executable": "ocrd-tesserocr-recognize",
            "input_file_grp": ["OCR-D-SEG-WORD"],
            "output_file_grp": ["OCR-D-OCR-TESS"],
            "parameters": {
                "model": {"type": "string", "default": "eng"},
                "textequiv_level": {"type": "string", "default": "word"},
                "overwrite_words": {"type": "boolean"}
            }
        });

        let def = ProcessorDefinition::from_tool_json("ocrd-tesserocr-recognize", &tool).unwrap();
        assert_eq!(def.executable, "ocrd-tesserocr-recognize");
        assert_eq!(def.input_file_group, "OCR-D-SEG-WORD");
        assert_eq!(def.output_file_group, "OCR-D-OCR-TESS");
        assert_eq!(def.default_parameters.get("model"), Some(&json!("eng")));
        assert_eq!(def.default_parameters.len(), 2);
        assert!(!def.default_parameters.contains_key("overwrite_words"));
        assert_eq!(def.description, Some(tool));
    }

    #[test]
    fn test_from_tool_json_multiple_groups_and_missing_fields() {
        let tool = json!({"output_file_grp": ["OCR-D-IMG-BIN", "OCR-D-SEG-PAGE"]});
        let def = ProcessorDefinition::from_tool_json("ocrd-olena-binarize", &tool).unwrap();
        assert_eq!(def.executable, "ocrd-olena-binarize");
        assert_eq!(def.input_file_group, "");
        assert_eq!(def.output_file_group, "OCR-D-IMG-BIN,OCR-D-SEG-PAGE");
        assert!(def.default_parameters.is_empty());
    }

    #[test]
    fn test_from_tool_json_rejects_garbage() {
        assert!(ProcessorDefinition::from_tool_json("x", &json!([1, 2])).is_err());
        let bad_group = json!({"output_file_grp": [1]});
        assert!(ProcessorDefinition::from_tool_json("x", &bad_group).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry: ProcessorRegistry = vec![
            ProcessorDefinition::new("b", "IN", "OUT-B"),
            ProcessorDefinition::new("a", "IN", "OUT-A").with_default("k", "v"),
        ]
        .into_iter()
        .collect();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert!(registry.get("missing").is_none());
        let names: Vec<_> = registry.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
