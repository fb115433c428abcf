//! Container runtime seam.
//!
//! The orchestrator describes a run as a [`ContainerInvocation`] and hands
//! it to a [`ContainerRuntime`]. Production uses [`DockerRuntime`]; tests
//! substitute a scripted runtime that writes result files directly.

pub mod capture;
pub mod docker;

pub use docker::DockerRuntime;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Mount point of the job's input directory inside the container.
pub const CONTAINER_INPUT: &str = "/input";
/// Mount point of the job's output directory inside the container.
pub const CONTAINER_OUTPUT: &str = "/output";

/// CPU architecture used as the image tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostArch {
    Arm64,
    Amd64,
}

impl HostArch {
    /// Architecture of the running host; anything that is not 64-bit ARM
    /// maps to `amd64`.
    pub fn detect() -> Self {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    pub fn from_rust_arch(arch: &str) -> Self {
        match arch {
            "aarch64" | "arm64" => HostArch::Arm64,
            _ => HostArch::Amd64,
        }
    }

    /// Configured override if present, host detection otherwise.
    pub fn resolve(configured: Option<&str>) -> Self {
        match configured {
            Some("arm64") => HostArch::Arm64,
            Some("amd64") => HostArch::Amd64,
            _ => Self::detect(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            HostArch::Arm64 => "arm64",
            HostArch::Amd64 => "amd64",
        }
    }
}

impl fmt::Display for HostArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Everything needed to start one scanner container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInvocation {
    /// Unique container name, used to kill a run that times out.
    pub name: String,
    /// Image reference including the architecture tag.
    pub image: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub args: Vec<String>,
    /// Remove the container once it exits.
    pub remove: bool,
}

impl ContainerInvocation {
    /// Arguments for `docker`, in order.
    pub fn docker_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if self.remove {
            args.push("--rm".to_string());
        }
        args.push("--name".to_string());
        args.push(self.name.clone());
        args.push("-v".to_string());
        args.push(format!("{}:{}", self.input_dir.display(), CONTAINER_INPUT));
        args.push("-v".to_string());
        args.push(format!("{}:{}", self.output_dir.display(), CONTAINER_OUTPUT));
        args.push(self.image.clone());
        args.extend(self.args.iter().cloned());
        args
    }
}

/// How a container run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Combined output crossed the capture bound and the run was killed.
    OutputOverflow,
    Failed { exit_code: Option<i32> },
}

/// Outcome of a run plus what was observed along the way.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub captured_bytes: u64,
    /// End of the captured output, for error messages.
    pub output_tail: String,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn success() -> Self {
        Self {
            status: RunStatus::Success,
            captured_bytes: 0,
            output_tail: String::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_status(status: RunStatus) -> Self {
        Self {
            status,
            ..Self::success()
        }
    }
}

/// Executes container invocations.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Run to completion, capturing at most `max_capture_bytes` of output.
    ///
    /// Errors are reserved for failures to run at all (missing binary,
    /// spawn failure); a container exiting non-zero is a [`RunStatus`].
    async fn run(
        &self,
        invocation: &ContainerInvocation,
        max_capture_bytes: usize,
    ) -> Result<RunReport>;

    /// Stop a run that is still going, e.g. after a timeout.
    async fn kill(&self, invocation: &ContainerInvocation) -> Result<()>;

    fn name(&self) -> &str;
}
