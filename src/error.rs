//! Error types for the apkdock job service.
//!
//! This module provides structured error handling using thiserror. Every
//! variant maps onto an HTTP status so the server layer can report failures
//! without inspecting messages.

use std::fmt;
use thiserror::Error;

/// Main error type for apkdock operations.
#[derive(Debug, Error)]
pub enum ApkDockError {
    /// Bad upload: wrong extension, oversize, unsafe name or missing file
    #[error("{0}")]
    Validation(String),

    /// No descriptor registered under this id
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Container run failed for a reason other than the tolerated overflow
    #[error("Failed to analyze APK with {tool}: {reason}")]
    Execution { tool: String, reason: String },

    /// A run reported success but the expected result file is absent
    #[error("Result file not found for {tool}: {path}")]
    ResultMissing { tool: String, path: String },

    /// The result file exists but holds nothing
    #[error("Result file is empty for {tool}: {path}")]
    EmptyResult { tool: String, path: String },

    /// Container run exceeded its wall-clock budget
    #[error("Analysis timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// Invalid service configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApkDockError {
    /// HTTP status code reported for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApkDockError::Validation(_) => 400,
            ApkDockError::UnknownTool(_) => 404,
            _ => 500,
        }
    }

    /// Whether the caller can fix the request and resubmit.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

/// Result type alias for apkdock operations
pub type Result<T> = std::result::Result<T, ApkDockError>;

/// Resource budget applied to a single analysis job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobBudget {
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: u64,
    /// Maximum combined stdout+stderr captured from the container
    pub max_capture_bytes: usize,
    /// Maximum container run time in seconds
    pub max_run_seconds: u64,
}

impl Default for JobBudget {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024, // 100MB
            max_capture_bytes: 10 * 1024 * 1024, // 10MB
            max_run_seconds: crate::timeout::DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl fmt::Display for JobBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Budget: {}B upload, {}B capture, {}s run",
            self.max_upload_bytes, self.max_capture_bytes, self.max_run_seconds
        )
    }
}
