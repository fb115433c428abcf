//! Severity inference for scanners whose output carries no severity.
//!
//! Keyword tiers are checked in priority order; a type matching keywords of
//! several tiers takes the most severe one.

use super::Severity;
use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

const TIERS: &[(Severity, &[&str])] = &[
    (
        Severity::Critical,
        &["private key", "password", "token", "sql injection"],
    ),
    (Severity::High, &["hardcoded", "insecure", "weak"]),
    (Severity::Medium, &["debug", "obfuscated"]),
    (Severity::Low, &["http url"]),
];

/// Severity of a type that matches no keyword.
pub const DEFAULT_SEVERITY: Severity = Severity::Medium;

struct KeywordMatcher {
    automaton: AhoCorasick,
    severities: Vec<Severity>,
}

static MATCHER: Lazy<KeywordMatcher> = Lazy::new(|| {
    let mut patterns = Vec::new();
    let mut severities = Vec::new();
    for (severity, keywords) in TIERS {
        for keyword in *keywords {
            patterns.push(*keyword);
            severities.push(*severity);
        }
    }
    let automaton = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&patterns)
        .expect("valid severity keywords");
    KeywordMatcher {
        automaton,
        severities,
    }
});

/// Infer a severity from a vulnerability type label.
pub fn infer_severity(kind: &str) -> Severity {
    MATCHER
        .automaton
        .find_overlapping_iter(kind)
        .map(|m| MATCHER.severities[m.pattern().as_usize()])
        .min()
        .unwrap_or(DEFAULT_SEVERITY)
}
