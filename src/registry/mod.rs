//! Tool descriptors and the registry that selects them by id.
//!
//! A descriptor is a capability record: how to invoke one containerized
//! scanner, where its result lands and which log dialect it writes. The
//! pipeline never branches on a tool id; it asks the descriptor.

use crate::parser::DialectKind;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where a tool writes its result file relative to the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultLayout {
    /// `<output>/<result>`
    Flat,
    /// `<output>/<uploaded name without .apk>/<result>`
    NestedByStem,
}

/// Extra arguments appended after the image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgStyle {
    None,
    /// The uploaded filename verbatim; the scanner finds it under `/input`.
    UploadedFilename,
}

/// Static invocation contract for one scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub container_image: &'static str,
    pub result_file: &'static str,
    pub fallback_result_file: Option<&'static str>,
    pub args: ArgStyle,
    pub layout: ResultLayout,
    pub dialect: DialectKind,
}

impl ToolDescriptor {
    /// Whether a capture overflow can still produce a usable partial result.
    pub fn supports_partial_results(&self) -> bool {
        self.fallback_result_file.is_some()
    }

    /// Image reference with the architecture tag applied.
    pub fn image_ref(&self, arch: &str) -> String {
        format!("{}:{}", self.container_image, arch)
    }

    /// Additional container arguments for this upload.
    pub fn extra_args(&self, uploaded_filename: &str) -> Vec<String> {
        match self.args {
            ArgStyle::None => Vec::new(),
            ArgStyle::UploadedFilename => vec![uploaded_filename.to_string()],
        }
    }

    /// Filename to look for given whether the run completed.
    ///
    /// Returns `None` for an incomplete run on a tool without a fallback.
    pub fn expected_result_file(&self, completed: bool) -> Option<&'static str> {
        if completed {
            Some(self.result_file)
        } else {
            self.fallback_result_file
        }
    }

    /// Concrete path of `result_file` inside `output_dir`.
    pub fn resolve_result_path(
        &self,
        output_dir: &Path,
        uploaded_filename: &str,
        result_file: &str,
    ) -> PathBuf {
        match self.layout {
            ResultLayout::Flat => output_dir.join(result_file),
            ResultLayout::NestedByStem => output_dir
                .join(upload_stem(uploaded_filename))
                .join(result_file),
        }
    }
}

/// Uploaded filename with a trailing `.apk` removed.
pub fn upload_stem(uploaded_filename: &str) -> &str {
    uploaded_filename
        .strip_suffix(".apk")
        .unwrap_or(uploaded_filename)
}

/// Ordered table of known tools.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    /// Registry from an explicit table. Later duplicates of an id are ignored.
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let mut unique: Vec<ToolDescriptor> = Vec::with_capacity(tools.len());
        for tool in tools {
            if !unique.iter().any(|t| t.id == tool.id) {
                unique.push(tool);
            }
        }
        Self { tools: unique }
    }

    /// The scanners shipped with apkdock.
    pub fn builtin() -> Self {
        Self::new(vec![
            ToolDescriptor {
                id: "reconizex",
                name: "ReconizeX",
                container_image: "devrvk/reconizerx-docker",
                result_file: "non-info.txt",
                fallback_result_file: Some("nuk.txt"),
                args: ArgStyle::UploadedFilename,
                layout: ResultLayout::NestedByStem,
                dialect: DialectKind::TaggedLine,
            },
            ToolDescriptor {
                id: "secureapk",
                name: "SecureApk",
                container_image: "devrvk/secureapk",
                result_file: "vulnerabilities.txt",
                fallback_result_file: None,
                args: ArgStyle::None,
                layout: ResultLayout::Flat,
                dialect: DialectKind::Narrative,
            },
        ])
    }

    pub fn get(&self, id: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
