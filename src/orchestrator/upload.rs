//! Uploaded packages and their validation.

use crate::error::{ApkDockError, Result};
use crate::staging::is_plain_filename;
use bytes::Bytes;
use std::path::Path;

/// Declared MIME type of Android packages.
pub const APK_MIME: &str = "application/vnd.android.package-archive";

/// Extension every accepted upload must carry.
pub const APK_EXTENSION: &str = ".apk";

/// A package received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original filename; staging keeps it verbatim.
    pub filename: String,
    /// Declared content type, if the client sent one.
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            data: data.into(),
        }
    }

    /// Load an upload from disk, guessing the content type from the name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ApkDockError::Validation(format!("Invalid upload path: {}", path.display()))
            })?
            .to_string();
        let content_type = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string());
        let data = tokio::fs::read(path).await?;
        Ok(Self::new(filename, content_type, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Multipart filter: a part is dropped only when it neither declares the
/// Android package type nor carries an `.apk` name.
pub fn accepts_part(filename: Option<&str>, content_type: Option<&str>) -> bool {
    let mime_ok = content_type.map(|c| c == APK_MIME).unwrap_or(false);
    let name_ok = filename.map(|n| n.ends_with(APK_EXTENSION)).unwrap_or(false);
    mime_ok || name_ok
}

/// Preconditions checked before anything is staged.
pub fn validate_upload(upload: &Upload, max_bytes: u64) -> Result<()> {
    if !upload.filename.ends_with(APK_EXTENSION) {
        return Err(ApkDockError::Validation(format!(
            "Only .apk files are accepted, got '{}'",
            upload.filename
        )));
    }
    if !is_plain_filename(&upload.filename) {
        return Err(ApkDockError::Validation(format!(
            "Invalid upload filename: {}",
            upload.filename
        )));
    }
    if upload.size() > max_bytes {
        return Err(ApkDockError::Validation(format!(
            "File size of {} bytes exceeds the maximum allowed size of {} bytes",
            upload.size(),
            max_bytes
        )));
    }
    Ok(())
}
