//! Normalization of scanner output into typed findings.
//!
//! Every scanner writes its own text format. A [`LogDialect`] turns one such
//! format into [`ParsedFindings`]; parsing is pure, deterministic and never
//! fails. Malformed lines are either kept as `unknown` records or skipped,
//! depending on the dialect.

pub mod narrative;
pub mod severity;
pub mod tagged;

pub use narrative::NarrativeDialect;
pub use severity::infer_severity;
pub use tagged::TaggedLineDialect;

use crate::registry::ToolRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Finding severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Unknown,
}

impl Severity {
    /// All severities in presentation order.
    pub const ALL: [Severity; 6] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
        Severity::Unknown,
    ];

    /// Parse a scanner label. Unrecognized labels map to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "info" => Severity::Info,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported issue inside the decompiled package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    /// Classification label, vocabulary is scanner specific.
    #[serde(rename = "type")]
    pub kind: String,
    /// File category reported by tagged scanners (`java`, `xml`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Path within the decompiled package.
    pub file: String,
    /// Line number when the reported reference is numeric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Line reference exactly as reported, e.g. `12`, `12-14` or `?`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_text: Option<String>,
    #[serde(default)]
    pub details: String,
    /// Exploitation-impact note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    pub severity: Severity,
    /// Severity label as the scanner printed it, for scanners that print one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_label: Option<String>,
}

/// One issue found in a shared object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
    pub severity: Severity,
}

/// Issues for one analyzed `.so` file, in report order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeLibraryReport {
    pub file: String,
    pub issues: Vec<NativeIssue>,
}

impl NativeLibraryReport {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            issues: Vec::new(),
        }
    }
}

/// Structured output of one dialect run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFindings {
    pub dialect: String,
    pub vulnerabilities: Vec<Vulnerability>,
    pub native_reports: Vec<NativeLibraryReport>,
}

impl ParsedFindings {
    pub fn empty(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            vulnerabilities: Vec::new(),
            native_reports: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vulnerabilities.is_empty() && self.native_reports.is_empty()
    }

    /// Vulnerabilities grouped by severity in presentation order. Empty
    /// groups are omitted; order within a group follows the input.
    pub fn by_severity(&self) -> Vec<(Severity, Vec<&Vulnerability>)> {
        Severity::ALL
            .iter()
            .filter_map(|sev| {
                let group: Vec<&Vulnerability> = self
                    .vulnerabilities
                    .iter()
                    .filter(|v| v.severity == *sev)
                    .collect();
                (!group.is_empty()).then_some((*sev, group))
            })
            .collect()
    }

    /// Vulnerabilities grouped by type, groups in first-seen order.
    pub fn by_type(&self) -> Vec<(&str, Vec<&Vulnerability>)> {
        let mut groups: Vec<(&str, Vec<&Vulnerability>)> = Vec::new();
        for v in &self.vulnerabilities {
            match groups.iter_mut().find(|(kind, _)| *kind == v.kind) {
                Some((_, group)) => group.push(v),
                None => groups.push((v.kind.as_str(), vec![v])),
            }
        }
        groups
    }

    /// Vulnerabilities grouped by the label the scanner printed, groups in
    /// first-seen order. Records without a label group under their
    /// normalized severity.
    pub fn by_severity_label(&self) -> Vec<(&str, Vec<&Vulnerability>)> {
        let mut groups: Vec<(&str, Vec<&Vulnerability>)> = Vec::new();
        for v in &self.vulnerabilities {
            let label = v.severity_label.as_deref().unwrap_or(v.severity.as_str());
            match groups.iter_mut().find(|(l, _)| *l == label) {
                Some((_, group)) => group.push(v),
                None => groups.push((label, vec![v])),
            }
        }
        groups
    }

    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for v in &self.vulnerabilities {
            *counts.entry(v.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn native_issue_count(&self) -> usize {
        self.native_reports.iter().map(|r| r.issues.len()).sum()
    }
}

/// A scanner output grammar.
pub trait LogDialect: Send + Sync {
    /// Stable name, reported in [`ParsedFindings::dialect`].
    fn name(&self) -> &'static str;

    /// Parse raw scanner output. Must not panic on any input.
    fn parse(&self, raw: &str) -> ParsedFindings;
}

/// Built-in dialects, selectable from tool descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DialectKind {
    /// `[type] [fileType] [severity] path` per line.
    TaggedLine,
    /// Free-form log with alert, risk and native-library sections.
    Narrative,
}

static TAGGED_LINE: TaggedLineDialect = TaggedLineDialect;
static NARRATIVE: NarrativeDialect = NarrativeDialect;

impl DialectKind {
    pub fn dialect(&self) -> &'static dyn LogDialect {
        match self {
            DialectKind::TaggedLine => &TAGGED_LINE,
            DialectKind::Narrative => &NARRATIVE,
        }
    }
}

/// Parse `raw` with a built-in dialect.
pub fn parse(raw: &str, kind: DialectKind) -> ParsedFindings {
    kind.dialect().parse(raw)
}

/// Dialect lookup keyed by tool id.
#[derive(Clone, Default)]
pub struct DialectRegistry {
    by_tool: HashMap<String, Arc<dyn LogDialect>>,
}

impl DialectRegistry {
    /// One entry per registered tool, using the descriptor's dialect.
    pub fn from_tools(tools: &ToolRegistry) -> Self {
        let mut registry = Self::default();
        for tool in tools.iter() {
            registry.register_kind(tool.id, tool.dialect);
        }
        registry
    }

    pub fn register(&mut self, tool_id: impl Into<String>, dialect: Arc<dyn LogDialect>) {
        self.by_tool.insert(tool_id.into(), dialect);
    }

    pub fn register_kind(&mut self, tool_id: impl Into<String>, kind: DialectKind) {
        let dialect: Arc<dyn LogDialect> = match kind {
            DialectKind::TaggedLine => Arc::new(TaggedLineDialect),
            DialectKind::Narrative => Arc::new(NarrativeDialect),
        };
        self.register(tool_id, dialect);
    }

    pub fn get(&self, tool_id: &str) -> Option<&dyn LogDialect> {
        self.by_tool.get(tool_id).map(|d| d.as_ref())
    }

    /// Parse output of `tool_id`; `None` when the tool has no dialect.
    pub fn parse_for(&self, tool_id: &str, raw: &str) -> Option<ParsedFindings> {
        self.get(tool_id).map(|d| d.parse(raw))
    }
}

impl fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&String, &'static str)> =
            self.by_tool.iter().map(|(k, v)| (k, v.name())).collect();
        entries.sort();
        f.debug_struct("DialectRegistry")
            .field("by_tool", &entries)
            .finish()
    }
}
