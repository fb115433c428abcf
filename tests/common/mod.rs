//! Common test utilities and helpers.
//!
//! Provides a scripted container runtime that plays the scanner's part by
//! writing result files straight into the mounted output directory.

#![allow(dead_code)]

use apkdock::config::ServiceConfig;
use apkdock::error::Result;
use apkdock::orchestrator::{JobOrchestrator, Upload, APK_MIME};
use apkdock::runtime::{ContainerInvocation, ContainerRuntime, RunReport, RunStatus};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Files found in the input directory when a run started.
pub type InputSnapshot = Vec<(String, Vec<u8>)>;

pub type Script = Arc<dyn Fn(&ContainerInvocation, &InputSnapshot) -> RunStatus + Send + Sync>;

/// Container runtime driven by a closure.
pub struct ScriptedRuntime {
    script: Script,
    delay: Duration,
    pub invocations: Mutex<Vec<ContainerInvocation>>,
    pub kills: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ScriptedRuntime {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&ContainerInvocation, &InputSnapshot) -> RunStatus + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            delay: Duration::ZERO,
            invocations: Mutex::new(Vec::new()),
            kills: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Sleep between snapshotting the input and running the script.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn last_invocation(&self) -> ContainerInvocation {
        self.invocations
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("runtime was invoked")
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn run(
        &self,
        invocation: &ContainerInvocation,
        _max_capture_bytes: usize,
    ) -> Result<RunReport> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let snapshot = input_files(&invocation.input_dir);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let status = (self.script)(invocation, &snapshot);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RunReport::with_status(status))
    }

    async fn kill(&self, _invocation: &ContainerInvocation) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Read every regular file directly under `dir`, sorted by name.
pub fn input_files(dir: &Path) -> InputSnapshot {
    let mut files: InputSnapshot = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| {
                    let name = e.file_name().to_string_lossy().to_string();
                    let data = std::fs::read(e.path()).unwrap_or_default();
                    (name, data)
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

/// Write `content` to `relative` under the invocation's output directory.
pub fn write_output(invocation: &ContainerInvocation, relative: &str, content: &str) {
    let path = invocation.output_dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Configuration rooted in a scratch directory with a fixed image tag.
pub fn test_config(root: &Path) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.staging.root = root.to_path_buf();
    config.docker.arch = Some("amd64".to_string());
    config
}

pub fn orchestrator(config: &ServiceConfig, runtime: Arc<ScriptedRuntime>) -> JobOrchestrator {
    JobOrchestrator::new(config, runtime)
}

/// A small upload that starts with a zip signature.
pub fn apk_upload(filename: &str, marker: &str) -> Upload {
    let mut data = b"PK\x03\x04".to_vec();
    data.extend_from_slice(marker.as_bytes());
    Upload::new(filename, Some(APK_MIME.to_string()), data)
}

/// Directory holding the per-job directories of `tool`.
pub fn jobs_dir(root: &Path, tool: &str) -> PathBuf {
    root.join(tool).join("jobs")
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|e| e.count()).unwrap_or(0)
}

/// Sample scanner outputs shipped with the repository.
pub mod samples {
    pub const SECUREAPK_RESULT: &str = "samples/results/secureapk/vulnerabilities.txt";
    pub const RECONIZEX_RESULT: &str = "samples/results/reconizex/non-info.txt";

    pub fn read(path: &str) -> String {
        std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e))
    }
}

/// Hand-built multipart bodies.
pub mod multipart {
    pub const BOUNDARY: &str = "apkdock-test-boundary";

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    /// One file part.
    pub fn file_part(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
        body
    }

    pub fn finish(mut body: Vec<u8>) -> Vec<u8> {
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }
}
