//! Chain definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{ChainId, Parameters};

/// Per-processor parameter overrides, keyed by processor name.
pub type ParameterOverrides = BTreeMap<String, Parameters>;

/// A named, reusable, ordered sequence of processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinition {
    /// Unique chain identifier.
    pub id: ChainId,

    /// Human-readable name.
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Processor names in execution order. Names may repeat.
    pub processors: Vec<String>,

    /// Chain-level parameter overrides.
    #[serde(default)]
    pub parameters: ParameterOverrides,

    /// When the chain was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChainDefinition {
    /// Create a new chain over the given processors.
    pub fn new<I, S>(name: impl Into<String>, processors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: ChainId::generate(),
            name: name.into(),
            description: String::new(),
            processors: processors.into_iter().map(Into::into).collect(),
            parameters: ParameterOverrides::new(),
            created_at: Utc::now(),
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: impl Into<ChainId>) -> Self {
        self.id = id.into();
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
}
