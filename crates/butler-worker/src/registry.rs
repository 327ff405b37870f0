//! Processor registry construction.

use std::path::{Path, PathBuf};

use butler_core::{ProcessorDefinition, ProcessorRegistry};
use butler_tool::dump_tool_json;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
enum SpecFileError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Build the registry from the configured processors.
///
/// Each processor is asked for its tool description. When that fails the
/// description is read from `<specs_dir>/<processor>.json`; processors with
/// neither are left out.
pub async fn load_registry<S: AsRef<str>>(
    processors: &[S],
    specs_dir: Option<&Path>,
) -> ProcessorRegistry {
    let mut definitions = Vec::with_capacity(processors.len());

    for name in processors {
        let name = name.as_ref();
        let Some(tool) = describe(name, specs_dir).await else {
            warn!(processor = %name, "No tool description found, skipping processor");
            continue;
        };

        match ProcessorDefinition::from_tool_json(name, &tool) {
            Ok(definition) => definitions.push(definition),
            Err(e) => warn!(processor = %name, error = %e, "Invalid tool description, skipping processor"),
        }
    }

    let registry: ProcessorRegistry = definitions.into_iter().collect();
    info!(processors = registry.len(), "Processor registry loaded");
    registry
}

async fn describe(name: &str, specs_dir: Option<&Path>) -> Option<Value> {
    match dump_tool_json(name).await {
        Ok(tool) => return Some(tool),
        Err(e) => debug!(processor = %name, error = %e, "Introspection failed"),
    }

    let path = specs_dir?.join(format!("{}.json", name));
    match read_spec_file(&path).await {
        Ok(tool) => {
            debug!(processor = %name, path = %path.display(), "Using tool description file");
            Some(tool)
        }
        Err(e) => {
            debug!(processor = %name, error = %e, "Tool description file unusable");
            None
        }
    }
}

async fn read_spec_file(path: &Path) -> Result<Value, SpecFileError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| SpecFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|source| SpecFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}
