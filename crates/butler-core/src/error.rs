//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Butler.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A chain references a processor the registry does not know.
    #[error("Unknown processor '{name}' in chain '{chain}'")]
    UnknownProcessor { name: String, chain: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
