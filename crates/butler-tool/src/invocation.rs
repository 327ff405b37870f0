//! Description of one tool invocation.

use std::path::{Path, PathBuf};

/// Log level handed to tools when none is configured.
pub const DEFAULT_LOG_LEVEL: &str = "DEBUG";

/// Everything needed to run one processing tool once.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Executable to run (PATH lookup or full path).
    pub executable: String,

    /// Location of the shared manifest.
    pub manifest_path: PathBuf,

    /// Working directory; defaults to the manifest's directory.
    pub working_dir: Option<PathBuf>,

    /// File group the tool reads.
    pub input_file_group: String,

    /// File group the tool writes.
    pub output_file_group: String,

    /// Encoded parameter payload (a JSON object).
    pub parameters: String,

    /// Log level for the tool.
    pub log_level: String,
}

impl ToolInvocation {
    /// Create an invocation with an empty parameter payload.
    pub fn new(
        executable: impl Into<String>,
        manifest_path: impl Into<PathBuf>,
        input_file_group: impl Into<String>,
        output_file_group: impl Into<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            manifest_path: manifest_path.into(),
            working_dir: None,
            input_file_group: input_file_group.into(),
            output_file_group: output_file_group.into(),
            parameters: "{}".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Set the parameter payload.
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Directory the tool runs in.
    pub fn effective_working_dir(&self) -> &Path {
        match &self.working_dir {
            Some(dir) => dir.as_path(),
            None => self
                .manifest_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new(".")),
        }
    }

    /// Command line arguments, in processor CLI order.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--working-dir".to_string(),
            self.effective_working_dir().display().to_string(),
            "--mets".to_string(),
            self.manifest_path.display().to_string(),
            "--input-file-grp".to_string(),
            self.input_file_group.clone(),
            "--output-file-grp".to_string(),
            self.output_file_group.clone(),
            "--parameter".to_string(),
            self.parameters.clone(),
            "--log-level".to_string(),
            self.log_level.clone(),
        ]
    }
}
