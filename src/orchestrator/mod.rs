//! Job orchestration: stage an upload, run the tool's container, pick the
//! result file and hand back its content.
//!
//! Every job gets its own staging directories, so jobs on the same tool run
//! side by side. A semaphore bounds how many containers run at once.

pub mod job;
pub mod upload;

pub use job::{AnalysisOutcome, Job, JobReport};
pub use upload::{accepts_part, validate_upload, Upload, APK_EXTENSION, APK_MIME};

use crate::config::ServiceConfig;
use crate::error::{ApkDockError, JobBudget, Result};
use crate::parser::DialectRegistry;
use crate::registry::{ToolDescriptor, ToolRegistry};
use crate::runtime::{ContainerInvocation, ContainerRuntime, HostArch, RunStatus};
use crate::staging::{JobDirs, StagingArea};
use crate::timeout::{with_timeout, TimeoutConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};

pub struct JobOrchestrator {
    registry: ToolRegistry,
    dialects: DialectRegistry,
    staging: StagingArea,
    runtime: Arc<dyn ContainerRuntime>,
    budget: JobBudget,
    run_timeout: Duration,
    arch: HostArch,
    remove_containers: bool,
    permits: Arc<Semaphore>,
}

impl JobOrchestrator {
    pub fn new(config: &ServiceConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let registry = ToolRegistry::builtin();
        let budget = config.limits.budget();
        Self {
            dialects: DialectRegistry::from_tools(&registry),
            registry,
            staging: StagingArea::new(config.staging.root.clone()),
            runtime,
            run_timeout: Duration::from_secs(budget.max_run_seconds),
            budget,
            arch: HostArch::resolve(config.docker.arch.as_deref()),
            remove_containers: config.docker.remove_containers,
            permits: Arc::new(Semaphore::new(config.limits.max_concurrent_jobs)),
        }
    }

    /// Replace the tool table; dialects follow the new descriptors.
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.dialects = DialectRegistry::from_tools(&registry);
        self.registry = registry;
        self
    }

    /// Override the container run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn dialects(&self) -> &DialectRegistry {
        &self.dialects
    }

    pub fn budget(&self) -> &JobBudget {
        &self.budget
    }

    pub fn arch(&self) -> HostArch {
        self.arch
    }

    /// Create per-tool directories. Safe while other processes share the
    /// staging root.
    pub async fn prepare(&self) -> Result<()> {
        for tool in self.registry.iter() {
            self.staging.prepare_tool(tool.id).await?;
            info!(tool = tool.id, dir = %self.staging.jobs_dir(tool.id).display(), "Tool staging ready");
        }
        Ok(())
    }

    /// Remove job directories left by an earlier process. Call once at
    /// server startup, before any job is accepted.
    pub async fn sweep_stale(&self) -> Result<usize> {
        let mut removed = 0;
        for tool in self.registry.iter() {
            removed += self.staging.sweep_tool(tool.id).await?;
        }
        if removed > 0 {
            info!(removed, "Swept stale job directories");
        }
        Ok(removed)
    }

    /// Run one upload through a tool and return the raw outcome.
    pub async fn run(&self, tool_id: &str, upload: Upload) -> Result<AnalysisOutcome> {
        self.run_job(tool_id, upload).await.map(|(_, outcome)| outcome)
    }

    /// Run one upload and parse the result with the tool's dialect.
    pub async fn analyze(&self, tool_id: &str, upload: Upload) -> Result<JobReport> {
        let (job, outcome) = self.run_job(tool_id, upload).await?;
        let findings = self.dialects.parse_for(tool_id, &outcome.raw_text);
        Ok(JobReport::new(&job, outcome, findings))
    }

    async fn run_job(&self, tool_id: &str, upload: Upload) -> Result<(Job, AnalysisOutcome)> {
        let tool = self
            .registry
            .get(tool_id)
            .ok_or_else(|| ApkDockError::UnknownTool(tool_id.to_string()))?;
        validate_upload(&upload, self.budget.max_upload_bytes)?;

        let job = Job::new(tool.id, &upload);
        let span = crate::job_span!(job);
        let outcome = self.run_staged(tool, &job, &upload).instrument(span).await?;
        Ok((job, outcome))
    }

    async fn run_staged(
        &self,
        tool: &ToolDescriptor,
        job: &Job,
        upload: &Upload,
    ) -> Result<AnalysisOutcome> {
        info!(size_bytes = job.size_bytes, sha256 = %job.sha256, "Job accepted");
        if !infer::archive::is_zip(&upload.data) {
            warn!("Upload does not carry a zip signature");
        }

        let dirs = self.staging.allocate(tool.id, job.id).await?;
        let result = self.execute(tool, job, &dirs, upload).await;
        if let Err(e) = dirs.remove().await {
            warn!(error = %e, dir = %dirs.root.display(), "Failed to remove job directory");
        }
        match &result {
            Ok(outcome) => info!(
                completed = outcome.completed,
                result_bytes = outcome.raw_text.len(),
                "Job finished"
            ),
            Err(e) => error!(error = %e, "Job failed"),
        }
        result
    }

    async fn execute(
        &self,
        tool: &ToolDescriptor,
        job: &Job,
        dirs: &JobDirs,
        upload: &Upload,
    ) -> Result<AnalysisOutcome> {
        dirs.purge_output().await?;
        dirs.write_upload(&job.uploaded_filename, &upload.data).await?;

        let invocation = ContainerInvocation {
            name: job.container_name(),
            image: tool.image_ref(self.arch.tag()),
            input_dir: fs::canonicalize(&dirs.input).await?,
            output_dir: fs::canonicalize(&dirs.output).await?,
            args: tool.extra_args(&job.uploaded_filename),
            remove: self.remove_containers,
        };
        let completed = self.run_container(tool, &invocation).await?;

        let result_file = tool.expected_result_file(completed).ok_or_else(|| {
            ApkDockError::Internal(format!("{} has no fallback result file", tool.name))
        })?;
        let path = tool.resolve_result_path(&dirs.output, &job.uploaded_filename, result_file);
        let raw_text = read_result(tool, &path).await?;

        if let Err(e) = dirs.purge_input().await {
            warn!(error = %e, "Error during input cleanup");
        }
        Ok(AnalysisOutcome {
            completed,
            raw_text,
        })
    }

    /// Returns whether the run completed; `false` means the partial path.
    async fn run_container(
        &self,
        tool: &ToolDescriptor,
        invocation: &ContainerInvocation,
    ) -> Result<bool> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ApkDockError::Internal("job gate closed".into()))?;

        let capture = self.budget.max_capture_bytes;
        let config = TimeoutConfig::new(self.run_timeout.as_secs(), format!("{} container", tool.name))
            .with_duration(self.run_timeout);
        let report = match with_timeout(config, self.runtime.run(invocation, capture)).await {
            Ok(report) => report,
            Err(ApkDockError::Timeout { seconds }) => {
                self.kill_container(invocation, "timeout").await;
                return Err(ApkDockError::Timeout { seconds });
            }
            Err(e) => {
                return Err(crate::log_error!(
                    ApkDockError::Execution {
                        tool: tool.name.to_string(),
                        reason: e.to_string(),
                    },
                    self.runtime.name()
                ));
            }
        };
        debug!(status = ?report.status, captured = report.captured_bytes, elapsed = ?report.elapsed, "Container run ended");

        // Killing the CLI does not stop the container; it must be gone
        // before the permit drops and its mounts are removed or read.
        if report.status == RunStatus::OutputOverflow {
            self.kill_container(invocation, "output overflow").await;
        }

        match report.status {
            RunStatus::Success => Ok(true),
            RunStatus::OutputOverflow if tool.supports_partial_results() => {
                warn!(
                    "Buffer exceeded for {}, falling back to partial results",
                    tool.name
                );
                Ok(false)
            }
            RunStatus::OutputOverflow => Err(ApkDockError::Execution {
                tool: tool.name.to_string(),
                reason: format!("output exceeded the {} byte capture bound", capture),
            }),
            RunStatus::Failed { exit_code } => {
                error!(exit_code = ?exit_code, output = %report.output_tail, "Error running {}", tool.name);
                let reason = match exit_code {
                    Some(code) => format!("container exited with status {}", code),
                    None => "container terminated by signal".to_string(),
                };
                Err(ApkDockError::Execution {
                    tool: tool.name.to_string(),
                    reason,
                })
            }
        }
    }

    async fn kill_container(&self, invocation: &ContainerInvocation, cause: &str) {
        info!(container = %invocation.name, cause, "Killing container");
        if let Err(e) = self.runtime.kill(invocation).await {
            warn!(error = %e, container = %invocation.name, cause, "Failed to kill container");
        }
    }
}

async fn read_result(tool: &ToolDescriptor, path: &Path) -> Result<String> {
    if !fs::try_exists(path).await? {
        return Err(ApkDockError::ResultMissing {
            tool: tool.name.to_string(),
            path: path.display().to_string(),
        });
    }
    let bytes = fs::read(path).await?;
    let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(&bytes);
    if had_errors {
        warn!(path = %path.display(), "Result file is not valid UTF-8, replaced invalid sequences");
    }
    if text.trim().is_empty() {
        return Err(ApkDockError::EmptyResult {
            tool: tool.name.to_string(),
            path: path.display().to_string(),
        });
    }
    Ok(text.into_owned())
}
