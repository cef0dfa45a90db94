use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::DiagnosticsResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Error,
    Warning,
    Info,
    Debug,
    Network,
    Other,
}

impl LogKind {
    pub const ALL: [LogKind; 6] = [
        LogKind::Error,
        LogKind::Warning,
        LogKind::Info,
        LogKind::Debug,
        LogKind::Network,
        LogKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Error => "error",
            LogKind::Warning => "warning",
            LogKind::Info => "info",
            LogKind::Debug => "debug",
            LogKind::Network => "network",
            LogKind::Other => "other",
        }
    }
}

/// One entry of the classification table. `tag` rules match bracketed
/// prefixes such as `[ERROR]`, keyword rules match anywhere in the line.
pub struct ClassifyRule {
    pub kind: LogKind,
    pub needles: &'static [&'static str],
    pub tag: bool,
}

/// Ordered: the first matching rule wins, so explicit tags are listed
/// before keyword fallbacks. Needles are lowercase.
pub static CLASSIFY_RULES: &[ClassifyRule] = &[
    ClassifyRule {
        kind: LogKind::Error,
        needles: &["[error]", "[page_error]"],
        tag: true,
    },
    ClassifyRule {
        kind: LogKind::Warning,
        needles: &["[warning]", "[warn]"],
        tag: true,
    },
    ClassifyRule {
        kind: LogKind::Info,
        needles: &["[info]", "[log]"],
        tag: true,
    },
    ClassifyRule {
        kind: LogKind::Debug,
        needles: &["[debug]"],
        tag: true,
    },
    ClassifyRule {
        kind: LogKind::Network,
        needles: &["network", "fetch", "xhr"],
        tag: false,
    },
];

/// Classify a raw console line. Case-insensitive; unmatched input is `Other`.
pub fn classify(raw: &str) -> LogKind {
    let lower = raw.to_lowercase();
    CLASSIFY_RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|needle| lower.contains(needle)))
        .map(|rule| rule.kind)
        .unwrap_or(LogKind::Other)
}

/// Remove a leading recognised `[TAG]` from a line, leaving other text alone.
pub fn strip_tag(raw: &str) -> &str {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('[') {
        return raw;
    }
    let Some(end) = trimmed.find(']') else {
        return raw;
    };
    let tag = trimmed[..=end].to_lowercase();
    let known = CLASSIFY_RULES
        .iter()
        .filter(|rule| rule.tag)
        .any(|rule| rule.needles.contains(&tag.as_str()));
    if known {
        trimmed[end + 1..].trim_start()
    } else {
        raw
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl LogEntry {
    /// Classify `raw`. The text is stored as given, so reclassifying it
    /// always yields the same kind.
    pub fn parse(raw: &str) -> Self {
        Self::parse_at(raw, Utc::now())
    }

    pub fn parse_at(raw: &str, timestamp: DateTime<Utc>) -> Self {
        LogEntry {
            kind: classify(raw),
            text: raw.to_string(),
            timestamp,
            location: None,
        }
    }

    /// The text without its leading tag.
    pub fn message(&self) -> &str {
        strip_tag(&self.text)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Ordered console log collection for one page run.
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    entries: Vec<LogEntry>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, raw: &str) -> LogKind {
        let entry = LogEntry::parse(raw);
        let kind = entry.kind;
        self.entries.push(entry);
        kind
    }

    pub fn add_all<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.add(line.as_ref());
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    pub fn by_kind(&self, kind: LogKind) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    pub fn errors(&self) -> Vec<&LogEntry> {
        self.by_kind(LogKind::Error).collect()
    }

    pub fn warnings(&self) -> Vec<&LogEntry> {
        self.by_kind(LogKind::Warning).collect()
    }

    pub fn network(&self) -> Vec<&LogEntry> {
        self.by_kind(LogKind::Network).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.by_kind(LogKind::Error).next().is_some()
    }

    pub fn has_warnings(&self) -> bool {
        self.by_kind(LogKind::Warning).next().is_some()
    }

    /// Count per kind. Every kind is present, zero when unseen.
    pub fn summary(&self) -> BTreeMap<LogKind, usize> {
        let mut counts: BTreeMap<LogKind, usize> = LogKind::ALL.iter().map(|k| (*k, 0)).collect();
        for entry in &self.entries {
            *counts.entry(entry.kind).or_default() += 1;
        }
        counts
    }

    /// Regex search over entry text.
    pub fn search(&self, pattern: &str, case_sensitive: bool) -> DiagnosticsResult<Vec<&LogEntry>> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(self
            .entries
            .iter()
            .filter(|e| regex.is_match(&e.text))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_explicit_tags() {
        assert_eq!(classify("[ERROR] boom"), LogKind::Error);
        assert_eq!(classify("[page_error] Uncaught"), LogKind::Error);
        assert_eq!(classify("[WARNING] deprecated API"), LogKind::Warning);
        assert_eq!(classify("[warn] slow"), LogKind::Warning);
        assert_eq!(classify("[INFO] ready"), LogKind::Info);
        assert_eq!(classify("[log] hello"), LogKind::Info);
        assert_eq!(classify("[Debug] state=1"), LogKind::Debug);
    }

    #[test]
    fn test_classify_network_keywords() {
        assert_eq!(classify("Fetch finished loading: GET"), LogKind::Network);
        assert_eq!(classify("XHR failed"), LogKind::Network);
        assert_eq!(classify("network idle"), LogKind::Network);
    }

    #[test]
    fn test_tag_wins_over_keyword() {
        assert_eq!(classify("[ERROR] network request to /api failed"), LogKind::Error);
        assert_eq!(classify("[WARNING] fetch retry"), LogKind::Warning);
    }

    #[test]
    fn test_unmatched_is_other() {
        assert_eq!(classify(""), LogKind::Other);
        assert_eq!(classify("just some text"), LogKind::Other);
        assert_eq!(classify("[custom] tag"), LogKind::Other);
    }

    #[test]
    fn test_classify_is_idempotent() {
        for line in ["[ERROR] x", "fetch", "plain", "[warn] y", "[DEBUG] network"] {
            let first = classify(line);
            for _ in 0..5 {
                assert_eq!(classify(line), first);
            }
        }
    }

    #[test]
    fn test_rule_table_order() {
        let kinds: Vec<LogKind> = CLASSIFY_RULES.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LogKind::Error,
                LogKind::Warning,
                LogKind::Info,
                LogKind::Debug,
                LogKind::Network
            ]
        );
        // Keyword rules come after every tag rule
        let first_keyword = CLASSIFY_RULES.iter().position(|r| !r.tag).unwrap();
        assert!(CLASSIFY_RULES[first_keyword..].iter().all(|r| !r.tag));
    }

    #[test]
    fn test_message_strips_leading_tag() {
        let entry = LogEntry::parse("[ERROR] TypeError: x is undefined");
        assert_eq!(entry.kind, LogKind::Error);
        assert_eq!(entry.text, "[ERROR] TypeError: x is undefined");
        assert_eq!(entry.message(), "TypeError: x is undefined");

        let entry = LogEntry::parse("  [warn]   slow frame");
        assert_eq!(entry.message(), "slow frame");
    }

    #[test]
    fn test_message_keeps_unknown_tag_and_inner_tag() {
        assert_eq!(LogEntry::parse("[custom] x").message(), "[custom] x");
        let entry = LogEntry::parse("oops [ERROR] inline");
        assert_eq!(entry.kind, LogKind::Error);
        assert_eq!(entry.message(), "oops [ERROR] inline");
    }

    #[test]
    fn test_kind_matches_reclassified_text() {
        for line in [
            "[ERROR] fetch failed",
            "[WARNING] network slow",
            "[info] xhr done",
            "[DEBUG] fetch",
            "XHR failed",
            "plain",
        ] {
            let entry = LogEntry::parse(line);
            assert_eq!(classify(&entry.text), entry.kind, "{}", line);
        }
    }

    #[test]
    fn test_console_log_summary_has_all_kinds() {
        let mut log = ConsoleLog::new();
        log.add_all(["[ERROR] a", "[ERROR] b", "[warn] c", "fetch d"]);
        let summary = log.summary();
        assert_eq!(summary.len(), LogKind::ALL.len());
        assert_eq!(summary[&LogKind::Error], 2);
        assert_eq!(summary[&LogKind::Warning], 1);
        assert_eq!(summary[&LogKind::Network], 1);
        assert_eq!(summary[&LogKind::Debug], 0);
        assert!(log.has_errors());
        assert!(log.has_warnings());
        assert_eq!(log.network().len(), 1);
    }

    #[test]
    fn test_console_log_search() {
        let mut log = ConsoleLog::new();
        log.add_all(["[ERROR] TypeError: a", "[info] loaded", "[ERROR] typeerror: b"]);

        assert_eq!(log.search("typeerror", false).unwrap().len(), 2);
        assert_eq!(log.search("TypeError", true).unwrap().len(), 1);
        assert!(log.search("(unclosed", false).is_err());
    }

    #[test]
    fn test_console_log_clear() {
        let mut log = ConsoleLog::new();
        log.add("[ERROR] a");
        log.clear();
        assert!(log.is_empty());
        assert!(!log.has_errors());
    }
}
