//! apkdock: run containerized APK scanners and normalize what they report.
//!
//! The crate has two halves. [`orchestrator`] stages an upload, runs the
//! scanner's container and returns the result file. [`parser`] turns a
//! scanner's text output into typed findings.

pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod parser;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod staging;
pub mod timeout;

pub use error::{ApkDockError, Result};
pub use orchestrator::{AnalysisOutcome, JobOrchestrator, JobReport, Upload};
pub use parser::{parse, DialectKind, ParsedFindings, Severity, Vulnerability};
pub use registry::{ToolDescriptor, ToolRegistry};
