//! Worker configuration.

use std::fmt;
use std::path::PathBuf;

use butler_tool::DEFAULT_LOG_LEVEL;
use tracing::{debug, info, warn};

/// Processors the registry is built from unless configured otherwise.
pub const DEFAULT_PROCESSORS: &[&str] = &[
    "ocrd-calamari-recognize",
    "ocrd-olena-binarize",
    "ocrd-sbb-textline-detector",
    "ocrd-sbb-binarize",
    "ocrd-fileformat-transform",
    "ocrd-tesserocr-binarize",
    "ocrd-tesserocr-recognize",
    "ocrd-tesserocr-segment-table",
    "ocrd-tesserocr-crop",
    "ocrd-tesserocr-segment-line",
    "ocrd-tesserocr-segment-word",
    "ocrd-tesserocr-deskew",
    "ocrd-tesserocr-segment-region",
    "ocrd-keraslm-rate",
    "ocrd-segment-evaluate",
    "ocrd-segment-extract-regions",
    "ocrd-segment-repair",
    "ocrd-segment-extract-lines",
    "ocrd-segment-from-coco",
    "ocrd-segment-replace-original",
    "ocrd-segment-extract-pages",
    "ocrd-segment-from-masks",
    "ocrd-anybaseocr-binarize",
    "ocrd-dinglehopper",
    "ocrd-pagetopdf",
    "ocrd-pc-segmentation",
    "ocrd-preprocess-image",
    "ocrd-repair-inconsistencies",
];

/// Basename of the manifest inside a workspace.
pub const MANIFEST_BASENAME: &str = "mets.xml";

/// Deployment profile, selected by the `PROFILE` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Dev,
    Test,
    Prod,
}

impl Profile {
    /// Parse a profile name case-insensitively. Empty or unknown names
    /// select `Dev`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "TEST" => Profile::Test,
            "PROD" => Profile::Prod,
            "DEV" | "" => Profile::Dev,
            other => {
                warn!(profile = other, "Unknown profile, using DEV");
                Profile::Dev
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Dev => "DEV",
            Profile::Test => "TEST",
            Profile::Prod => "PROD",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Selected profile.
    pub profile: Profile,

    /// Root under which every run gets its own workspace directory.
    pub results_dir: PathBuf,

    /// Log level handed to every processing tool.
    pub tool_log_level: String,

    /// Directory of `<processor>.json` descriptions used when a processor
    /// cannot be introspected.
    pub processor_specs_dir: Option<PathBuf>,

    /// Processor executables the registry is built from.
    pub processors: Vec<String>,

    /// Basename of the workspace manifest.
    pub manifest_basename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_profile(Profile::Dev)
    }
}

impl Config {
    /// Defaults of a profile.
    pub fn for_profile(profile: Profile) -> Self {
        let (results_dir, processor_specs_dir) = match profile {
            Profile::Test => (
                "/tmp/ocrd_butler_results_testing",
                Some(PathBuf::from("tests/files/processor_specs")),
            ),
            Profile::Dev | Profile::Prod => ("/tmp/ocrd_butler_results", None),
        };
        Self {
            profile,
            results_dir: PathBuf::from(results_dir),
            tool_log_level: DEFAULT_LOG_LEVEL.to_string(),
            processor_specs_dir,
            processors: DEFAULT_PROCESSORS.iter().map(|p| p.to_string()).collect(),
            manifest_basename: MANIFEST_BASENAME.to_string(),
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from a variable lookup.
    ///
    /// Reads `PROFILE`, `BUTLER_RESULTS_DIR`, `BUTLER_TOOL_LOG_LEVEL` and
    /// `BUTLER_PROCESSOR_SPECS_DIR`. Empty values count as unset.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let profile = match lookup("PROFILE") {
            Some(value) => {
                debug!(profile = %value, "Selecting config from PROFILE");
                Profile::parse(&value)
            }
            None => {
                warn!("Environment variable PROFILE not set, defaulting to DEV");
                Profile::Dev
            }
        };

        let mut config = Self::for_profile(profile);
        if let Some(dir) = var("BUTLER_RESULTS_DIR") {
            config.results_dir = PathBuf::from(dir);
        }
        if let Some(level) = var("BUTLER_TOOL_LOG_LEVEL") {
            config.tool_log_level = level;
        }
        if let Some(dir) = var("BUTLER_PROCESSOR_SPECS_DIR") {
            config.processor_specs_dir = Some(PathBuf::from(dir));
        }

        info!(profile = %config.profile, results_dir = %config.results_dir.display(), "Selected config");
        config
    }
}
