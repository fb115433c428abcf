//! Timeout utilities for bounding container runs.
//!
//! A scanner that hangs must not pin a worker forever, so every container
//! invocation goes through [`with_timeout`].

use crate::error::{ApkDockError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Default container run timeout in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 1800; // 30 minutes

/// Timeout for short housekeeping commands such as `docker kill`
pub const FAST_TIMEOUT_SECONDS: u64 = 10;

/// Timeout configuration for one operation
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the operation
    pub duration: Duration,
    /// Whether to log timeout errors
    pub log_errors: bool,
    /// Operation name for logging
    pub operation_name: String,
}

impl TimeoutConfig {
    /// Create a new timeout configuration
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            duration: Duration::from_secs(seconds),
            log_errors: true,
            operation_name: operation.into(),
        }
    }

    /// Create a fast timeout configuration (10 seconds)
    pub fn fast(operation: impl Into<String>) -> Self {
        Self::new(FAST_TIMEOUT_SECONDS, operation)
    }

    /// Override the duration with sub-second precision.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(
        "Starting operation '{}' with timeout of {}s",
        config.operation_name,
        config.duration.as_secs()
    );

    match timeout(config.duration, future).await {
        Ok(result) => {
            debug!("Operation '{}' finished", config.operation_name);
            result
        }
        Err(_) => {
            if config.log_errors {
                error!(
                    "Operation '{}' timed out after {}s",
                    config.operation_name,
                    config.duration.as_secs()
                );
            }

            Err(ApkDockError::Timeout {
                seconds: config.duration.as_secs(),
            })
        }
    }
}
