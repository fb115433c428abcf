//! Narrative dialect: a free-form scanner log.
//!
//! Relevant line shapes:
//!
//! ```text
//! [+] Analyzing libnative.so...
//! [⚠] Stack Canary: not found
//! [✓] NX: enabled
//! [!] Hardcoded API Key detected in assets/config.json (line 12): plaintext key
//! └ Exploitation Risk: key exposure
//! ```
//!
//! Parsing is a single pass over a three-state machine. An alert is held
//! until its risk line arrives; anything else that shows up first flushes
//! it unchanged so a finding is never dropped.

use super::severity::infer_severity;
use super::{LogDialect, NativeIssue, NativeLibraryReport, ParsedFindings, Severity, Vulnerability};

const NATIVE_HEADER: &str = "[+] Analyzing ";
const ALERT: &str = "[!]";
const RISK: &str = "└ Exploitation Risk:";
const WARNING_GLYPH: &str = "[⚠]";
const CHECK_GLYPHS: [&str; 2] = ["[✓]", "[✔]"];
const DETECTED_IN: &str = " detected in ";
const LINE_MARKER: &str = " (line ";
const SCHEMA_URL: &str = "http://schemas.android.com/";

#[derive(Debug, Clone, Copy, Default)]
pub struct NarrativeDialect;

impl LogDialect for NarrativeDialect {
    fn name(&self) -> &'static str {
        "narrative"
    }

    fn parse(&self, raw: &str) -> ParsedFindings {
        let mut machine = Machine::new(self.name());
        for line in raw.lines() {
            machine.feed(line);
        }
        machine.finish()
    }
}

#[derive(Debug)]
enum State {
    Idle,
    /// Index of the report receiving glyph lines.
    InNativeSection(usize),
    /// Alert parsed, waiting for its risk line.
    InVulnerability(Vulnerability),
}

/// What a line opens, if anything.
enum Opening {
    Native(usize),
    Vulnerability(Vulnerability),
    /// An alert that is a known false positive or does not fit the grammar.
    DiscardedAlert,
    Nothing,
}

struct Machine {
    state: State,
    out: ParsedFindings,
}

impl Machine {
    fn new(dialect: &str) -> Self {
        Self {
            state: State::Idle,
            out: ParsedFindings::empty(dialect),
        }
    }

    fn feed(&mut self, line: &str) {
        let line = line.trim();
        if is_noise(line) {
            return;
        }
        let state = std::mem::replace(&mut self.state, State::Idle);
        self.state = match state {
            State::Idle => self.on_idle(line),
            State::InNativeSection(index) => self.on_native(index, line),
            State::InVulnerability(pending) => self.on_vulnerability(pending, line),
        };
    }

    fn finish(mut self) -> ParsedFindings {
        if let State::InVulnerability(pending) = std::mem::replace(&mut self.state, State::Idle) {
            self.out.vulnerabilities.push(pending);
        }
        self.out
    }

    fn on_idle(&mut self, line: &str) -> State {
        match self.open(line) {
            Opening::Native(index) => State::InNativeSection(index),
            Opening::Vulnerability(v) => State::InVulnerability(v),
            Opening::DiscardedAlert | Opening::Nothing => State::Idle,
        }
    }

    fn on_native(&mut self, index: usize, line: &str) -> State {
        if let Some(issue) = parse_native_issue(line) {
            if let Some(issue) = issue {
                self.out.native_reports[index].issues.push(issue);
            }
            return State::InNativeSection(index);
        }
        match self.open(line) {
            Opening::Native(next) => State::InNativeSection(next),
            Opening::Vulnerability(v) => State::InVulnerability(v),
            Opening::DiscardedAlert | Opening::Nothing => State::InNativeSection(index),
        }
    }

    fn on_vulnerability(&mut self, mut pending: Vulnerability, line: &str) -> State {
        if let Some(risk) = line.strip_prefix(RISK) {
            pending.risk = Some(risk.trim().to_string());
            self.out.vulnerabilities.push(pending);
            return State::Idle;
        }
        self.out.vulnerabilities.push(pending);
        self.on_idle(line)
    }

    fn open(&mut self, line: &str) -> Opening {
        if let Some(rest) = line.strip_prefix(NATIVE_HEADER) {
            if line.contains(".so") {
                let file = rest.replacen("...", "", 1).trim().to_string();
                self.out.native_reports.push(NativeLibraryReport::new(file));
                return Opening::Native(self.out.native_reports.len() - 1);
            }
        }
        if line.starts_with(ALERT) {
            return match parse_alert(line) {
                Some(v) => Opening::Vulnerability(v),
                None => Opening::DiscardedAlert,
            };
        }
        Opening::Nothing
    }
}

fn is_noise(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("---")
        || line.contains("Searching for vulnerabilities")
        || line.contains("Analysis completed in")
        || line.contains("Analysis finished in")
        || (line.starts_with("[+] Found") && line.contains(".so files"))
}

/// `None` when the line is not a glyph line, `Some(None)` for a glyph line
/// that only reports completion.
fn parse_native_issue(line: &str) -> Option<Option<NativeIssue>> {
    let (severity, body) = if let Some(body) = line.strip_prefix(WARNING_GLYPH) {
        (Severity::Medium, body)
    } else {
        let body = CHECK_GLYPHS.iter().find_map(|g| line.strip_prefix(g))?;
        (Severity::Info, body)
    };

    let details = body.trim();
    if line.contains("Analysis complete") || details.contains("Analysis finished") {
        return Some(None);
    }
    let kind = details.split(':').next().unwrap_or_default().trim();
    Some(Some(NativeIssue {
        kind: kind.to_string(),
        details: details.to_string(),
        severity,
    }))
}

/// Parse `[!] <type> detected in <file>[ (line <n>): <details>]`.
fn parse_alert(line: &str) -> Option<Vulnerability> {
    if line.contains(SCHEMA_URL) {
        return None;
    }
    let body = line.strip_prefix(ALERT)?.trim();
    let (kind, location) = body.split_once(DETECTED_IN)?;
    let kind = kind.trim();

    let (file, line_text, details) = match location.split_once(LINE_MARKER) {
        Some((file, rest)) => {
            let (number, details) = match rest.split_once("): ") {
                Some((number, details)) => (number, details.trim()),
                None => (rest.trim_end_matches(')'), ""),
            };
            (file, Some(number.trim()), details)
        }
        None => (location, None, ""),
    };

    Some(Vulnerability {
        kind: kind.to_string(),
        file_type: None,
        file: file.trim().to_string(),
        line: line_text.and_then(|t| t.parse::<u32>().ok()),
        line_text: line_text.map(str::to_string),
        details: details.to_string(),
        risk: None,
        severity: infer_severity(kind),
        severity_label: None,
    })
}
