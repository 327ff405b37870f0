//! Processing tool invocation for Butler
//!
//! This crate runs external document-processing tools as subprocesses,
//! following the command line convention of OCR-D processors:
//! a manifest location, an input and an output file group, a JSON
//! parameter payload and a log level.
//!
//! # Example
//!
//! ```rust,no_run
//! use butler_tool::{ProcessInvoker, ToolInvocation, ToolInvoker};
//!
//! async fn run_step() -> Result<(), Box<dyn std::error::Error>> {
//!     let invocation = ToolInvocation::new(
//!         "ocrd-tesserocr-segment-region",
//!         "/tmp/results/abc/mets.xml",
//!         "OCR-D-IMG",
//!         "OCR-D-SEG-REGION",
//!     )
//!     .with_parameters(r#"{"overwrite_regions": true}"#);
//!
//!     let result = ProcessInvoker::new().invoke(&invocation).await?;
//!     println!("exit code: {}", result.exit_code);
//!     Ok(())
//! }
//! ```

mod error;
mod executor;
mod introspect;
mod invocation;

// Re-export main types
pub use error::ToolError;
pub use executor::{InvocationResult, ProcessInvoker, ToolInvoker};
pub use introspect::dump_tool_json;
pub use invocation::{ToolInvocation, DEFAULT_LOG_LEVEL};
