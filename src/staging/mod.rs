//! Per-job filesystem staging.
//!
//! Layout: `<root>/<tool>/jobs/<job id>/{input,output}`. Each job owns its
//! own pair, so concurrent jobs on the same tool never touch each other's
//! files and a purge only ever affects the job that issued it.

use crate::error::{ApkDockError, Result};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Staging root shared by all tools.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every job directory of one tool.
    pub fn jobs_dir(&self, tool_id: &str) -> PathBuf {
        self.root.join(tool_id).join("jobs")
    }

    /// Create the per-tool directories. Existing job directories are left
    /// alone; another process may be running them.
    pub async fn prepare_tool(&self, tool_id: &str) -> Result<()> {
        fs::create_dir_all(self.jobs_dir(tool_id)).await?;
        Ok(())
    }

    /// Drop job directories left behind by a previous process.
    ///
    /// Only safe while no other process stages under the same root.
    /// Returns how many directories were removed.
    pub async fn sweep_tool(&self, tool_id: &str) -> Result<usize> {
        let jobs = self.jobs_dir(tool_id);
        let mut entries = match fs::read_dir(&jobs).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            warn!(path = %path.display(), "Removing stale job directory");
            match remove_path(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale job directory")
                }
            }
        }
        Ok(removed)
    }

    /// Create a fresh, empty input/output pair for one job.
    pub async fn allocate(&self, tool_id: &str, job_id: Uuid) -> Result<JobDirs> {
        let root = self.jobs_dir(tool_id).join(job_id.to_string());
        let dirs = JobDirs {
            input: root.join("input"),
            output: root.join("output"),
            root,
        };
        fs::create_dir_all(&dirs.input).await?;
        fs::create_dir_all(&dirs.output).await?;
        // A reused id must never surface an older run's result.
        purge_dir(&dirs.output).await?;
        debug!(dir = %dirs.root.display(), "Allocated job staging");
        Ok(dirs)
    }
}

/// The input/output pair mounted into one container run.
#[derive(Debug, Clone)]
pub struct JobDirs {
    pub root: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl JobDirs {
    /// Write the upload into the input directory under its original name.
    /// An existing file with the same name is overwritten.
    pub async fn write_upload(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        if !is_plain_filename(filename) {
            return Err(ApkDockError::Validation(format!(
                "Invalid upload filename: {}",
                filename
            )));
        }
        let path = self.input.join(filename);
        fs::write(&path, data).await?;
        debug!(path = %path.display(), size = data.len(), "Staged upload");
        Ok(path)
    }

    pub async fn purge_input(&self) -> io::Result<()> {
        purge_dir(&self.input).await
    }

    pub async fn purge_output(&self) -> io::Result<()> {
        purge_dir(&self.output).await
    }

    /// Remove the whole job directory. Missing directories are fine.
    pub async fn remove(&self) -> io::Result<()> {
        remove_path(&self.root).await
    }
}

/// True when `name` is a single path component safe to join under a directory.
pub fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Delete everything inside `dir`, keeping `dir` itself.
///
/// A directory that does not exist is already clean.
pub async fn purge_dir(dir: &Path) -> io::Result<()> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        // file_type does not follow symlinks, so a link to a directory is
        // unlinked rather than descended into.
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}
