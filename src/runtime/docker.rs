//! `docker run` backed runtime.

use super::capture::capture_bounded;
use super::{ContainerInvocation, ContainerRuntime, RunReport, RunStatus};
use crate::error::{ApkDockError, Result};
use crate::timeout::{with_timeout, TimeoutConfig};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs scanners through the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Shell-style rendering of the command, for logs.
    pub fn command_line(&self, invocation: &ContainerInvocation) -> String {
        let mut parts = vec![self.binary.clone()];
        parts.extend(invocation.docker_args());
        parts.join(" ")
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(
        &self,
        invocation: &ContainerInvocation,
        max_capture_bytes: usize,
    ) -> Result<RunReport> {
        info!(command = %self.command_line(invocation), "Starting container");
        let mut cmd = Command::new(&self.binary);
        cmd.args(invocation.docker_args());

        let captured = capture_bounded(cmd, max_capture_bytes).await?;
        let status = if captured.overflowed {
            RunStatus::OutputOverflow
        } else {
            match captured.status {
                Some(s) if s.success() => RunStatus::Success,
                Some(s) => RunStatus::Failed { exit_code: s.code() },
                None => RunStatus::Failed { exit_code: None },
            }
        };
        debug!(?status, captured = captured.total_bytes, elapsed = ?captured.elapsed, "Container finished");

        Ok(RunReport {
            status,
            captured_bytes: captured.total_bytes,
            output_tail: captured.tail,
            elapsed: captured.elapsed,
        })
    }

    async fn kill(&self, invocation: &ContainerInvocation) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("kill").arg(&invocation.name);
        let output = with_timeout(TimeoutConfig::fast("docker kill"), async {
            cmd.output().await.map_err(ApkDockError::from)
        })
        .await?;
        if !output.status.success() {
            // Already gone is the common case after a kill races the exit.
            warn!(
                container = %invocation.name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "docker kill did not succeed"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "docker"
    }
}
