//! Configuration for the apkdock service.
//!
//! Centralized configuration for every component with sensible defaults.
//! Values come from `Default`, then an optional JSON file, then the `PORT`
//! environment variable, then command line overrides.

use crate::error::{ApkDockError, JobBudget, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "PORT";

/// Master configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener configuration.
    pub server: ServerConfig,
    /// Staging directory configuration.
    pub staging: StagingConfig,
    /// Per-job resource limits.
    pub limits: LimitsConfig,
    /// Container runtime configuration.
    pub docker: DockerConfig,
}

impl ServiceConfig {
    /// Load configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration file");
        let raw = std::fs::read_to_string(path)?;
        let config: ServiceConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Build the effective configuration: file (if any) then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        info!(
            port = config.server.port,
            staging_root = %config.staging.root.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(PORT_ENV) {
            self.server.port = raw.trim().parse().map_err(|_| {
                ApkDockError::Config(format!("{} must be a port number, got '{}'", PORT_ENV, raw))
            })?;
        }
        Ok(())
    }

    /// Reject values that would make every job fail.
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_upload_bytes == 0 {
            return Err(ApkDockError::Config("limits.max_upload_bytes must be > 0".into()));
        }
        if self.limits.max_capture_bytes == 0 {
            return Err(ApkDockError::Config("limits.max_capture_bytes must be > 0".into()));
        }
        if self.limits.container_timeout_secs == 0 {
            return Err(ApkDockError::Config(
                "limits.container_timeout_secs must be > 0".into(),
            ));
        }
        if self.limits.max_concurrent_jobs == 0 {
            return Err(ApkDockError::Config("limits.max_concurrent_jobs must be > 0".into()));
        }
        if self.docker.binary.trim().is_empty() {
            return Err(ApkDockError::Config("docker.binary must not be empty".into()));
        }
        if let Some(arch) = &self.docker.arch {
            if arch != "arm64" && arch != "amd64" {
                return Err(ApkDockError::Config(format!(
                    "docker.arch must be 'arm64' or 'amd64', got '{}'",
                    arch
                )));
            }
        }
        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0).
    pub host: String,
    /// Listen port (default: 3000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Staging directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StagingConfig {
    /// Root under which every tool gets its own directory (default: ./tools).
    pub root: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tools"),
        }
    }
}

/// Per-job resource limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size (default: 104857600 = 100MB).
    pub max_upload_bytes: u64,
    /// Combined stdout+stderr capture bound (default: 10485760 = 10MB).
    pub max_capture_bytes: usize,
    /// Container run timeout (default: 1800 = 30 minutes).
    pub container_timeout_secs: u64,
    /// Containers allowed to run at once across all tools (default: 4).
    pub max_concurrent_jobs: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let budget = JobBudget::default();
        Self {
            max_upload_bytes: budget.max_upload_bytes,
            max_capture_bytes: budget.max_capture_bytes,
            container_timeout_secs: budget.max_run_seconds,
            max_concurrent_jobs: 4,
        }
    }
}

impl LimitsConfig {
    /// Per-job budget derived from these limits.
    pub fn budget(&self) -> JobBudget {
        JobBudget {
            max_upload_bytes: self.max_upload_bytes,
            max_capture_bytes: self.max_capture_bytes,
            max_run_seconds: self.container_timeout_secs,
        }
    }
}

/// Container runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DockerConfig {
    /// Container CLI to invoke (default: docker).
    pub binary: String,
    /// Force the image tag instead of detecting the host architecture.
    pub arch: Option<String>,
    /// Pass `--rm` so finished containers are removed (default: true).
    pub remove_containers: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            arch: None,
            remove_containers: true,
        }
    }
}
