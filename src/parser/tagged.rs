//! Tagged-line dialect: `[<type>] [<fileType>] [<severity>] <path>`.
//!
//! The severity in the line is authoritative. Lines that do not match are
//! kept as `unknown` records so nothing the scanner printed is lost.

use super::{LogDialect, ParsedFindings, Severity, Vulnerability};
use once_cell::sync::Lazy;
use regex::Regex;

pub static RE_TAGGED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(.*?)\] \[(.*?)\] \[(.*?)\] (.*)").expect("valid tagged line regex")
});

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedLineDialect;

impl TaggedLineDialect {
    /// Parse one non-empty line.
    pub fn parse_line(line: &str) -> Vulnerability {
        match RE_TAGGED_LINE.captures(line) {
            Some(caps) => Vulnerability {
                kind: caps[1].to_string(),
                file_type: Some(caps[2].to_string()),
                file: caps[4].to_string(),
                line: None,
                line_text: None,
                details: String::new(),
                risk: None,
                severity: Severity::from_label(&caps[3]),
                severity_label: Some(caps[3].to_string()),
            },
            None => Vulnerability {
                kind: UNKNOWN.to_string(),
                file_type: Some(UNKNOWN.to_string()),
                file: line.to_string(),
                line: None,
                line_text: None,
                details: String::new(),
                risk: None,
                severity: Severity::Unknown,
                severity_label: None,
            },
        }
    }
}

impl LogDialect for TaggedLineDialect {
    fn name(&self) -> &'static str {
        "tagged-line"
    }

    fn parse(&self, raw: &str) -> ParsedFindings {
        let mut findings = ParsedFindings::empty(self.name());
        findings.vulnerabilities = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse_line)
            .collect();
        findings
    }
}
