use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{ACCESSIBILITY_MARKER, SLOW_REQUEST_MS};
use crate::error::DiagnosticsResult;
use crate::log_capture::{ConsoleLog, LogEntry, LogKind};
use crate::metrics::PerformanceSnapshot;

/// Outcome of a sub-check: its payload, or a description of why it failed.
pub type CheckResult<T> = Result<T, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkEntry {
    pub url: String,
    pub method: String,
    pub status: Option<u16>,
    #[serde(rename = "duration")]
    pub duration_ms: Option<f64>,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NetworkEntry {
    pub fn completed(
        url: impl Into<String>,
        method: impl Into<String>,
        status: u16,
        duration_ms: f64,
        size_bytes: u64,
    ) -> Self {
        NetworkEntry {
            url: url.into(),
            method: method.into(),
            status: Some(status),
            duration_ms: Some(duration_ms),
            size_bytes,
            failed: false,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, method: impl Into<String>, error: impl Into<String>) -> Self {
        NetworkEntry {
            url: url.into(),
            method: method.into(),
            status: None,
            duration_ms: None,
            size_bytes: 0,
            failed: true,
            error: Some(error.into()),
        }
    }

    pub fn is_slow(&self) -> bool {
        self.duration_ms.is_some_and(|d| d > SLOW_REQUEST_MS)
    }

    /// Transport failure or an HTTP error status.
    pub fn is_failure(&self) -> bool {
        self.failed || self.status.is_some_and(|s| s >= 400)
    }
}

/// Result of one diagnostic run. Built once by [`ReportBuilder`]; the verdict
/// is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticReport {
    #[serde(alias = "target")]
    url: String,
    timestamp: DateTime<Utc>,
    passed: bool,
    console_logs: Vec<LogEntry>,
    network_requests: Vec<NetworkEntry>,
    performance: Option<PerformanceSnapshot>,
    errors: Vec<String>,
    warnings: Vec<String>,
    security_issues: Vec<String>,
    screenshots: BTreeMap<String, String>,
    recommendations: Vec<String>,
}

impl DiagnosticReport {
    pub fn target(&self) -> &str {
        &self.url
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn console_logs(&self) -> &[LogEntry] {
        &self.console_logs
    }

    pub fn network_requests(&self) -> &[NetworkEntry] {
        &self.network_requests
    }

    pub fn performance(&self) -> Option<&PerformanceSnapshot> {
        self.performance.as_ref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn security_issues(&self) -> &[String] {
        &self.security_issues
    }

    pub fn screenshots(&self) -> &BTreeMap<String, String> {
        &self.screenshots
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn console_count(&self, kind: LogKind) -> usize {
        self.console_logs.iter().filter(|e| e.kind == kind).count()
    }

    pub fn failed_requests(&self) -> Vec<&NetworkEntry> {
        self.network_requests
            .iter()
            .filter(|r| r.is_failure())
            .collect()
    }

    pub fn to_json(&self) -> DiagnosticsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> DiagnosticsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Write `report` as `diagnostics_report_<timestamp>.json` under `dir`.
pub fn save_report(dir: &Path, report: &DiagnosticReport) -> DiagnosticsResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "diagnostics_report_{}.json",
        report.timestamp.format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(name);
    std::fs::write(&path, report.to_json()?)?;
    info!("Report saved to {:?}", path);
    Ok(path)
}

pub fn load_report(path: &Path) -> DiagnosticsResult<DiagnosticReport> {
    let content = std::fs::read_to_string(path)?;
    DiagnosticReport::from_json(&content)
}

fn messages(entries: Vec<&LogEntry>) -> Vec<String> {
    entries.iter().map(|e| e.message().to_string()).collect()
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

/// Fixed-order recommendation rules. Each appends at most one line and none
/// suppresses another.
fn recommend(
    console_errors: usize,
    network: &[NetworkEntry],
    warnings: &[String],
    security_issues: &[String],
) -> Vec<String> {
    let mut recommendations = Vec::new();

    let slow = network.iter().filter(|r| r.is_slow()).count();
    if slow > 0 {
        recommendations.push(format!("Optimize {}", plural(slow, "slow network request")));
    }

    if console_errors > 0 {
        recommendations.push(format!("Fix {}", plural(console_errors, "console error")));
    }

    if !security_issues.is_empty() {
        recommendations.push("Address security issues immediately".to_string());
    }

    let marker = ACCESSIBILITY_MARKER.to_lowercase();
    if warnings.iter().any(|w| w.to_lowercase().contains(&marker)) {
        recommendations.push("Improve accessibility for better user experience".to_string());
    }

    recommendations
}

/// Collects the inputs of one run and folds sub-check failures into the
/// error list.
pub struct ReportBuilder {
    target: String,
    timestamp: DateTime<Utc>,
    console: ConsoleLog,
    network: Vec<NetworkEntry>,
    performance: Option<PerformanceSnapshot>,
    errors: Vec<String>,
    warnings: Vec<String>,
    security_issues: Vec<String>,
    screenshots: BTreeMap<String, String>,
}

impl ReportBuilder {
    pub fn new(target: impl Into<String>) -> Self {
        ReportBuilder {
            target: target.into(),
            timestamp: Utc::now(),
            console: ConsoleLog::new(),
            network: Vec::new(),
            performance: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            security_issues: Vec::new(),
            screenshots: BTreeMap::new(),
        }
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Raw console lines, classified on entry.
    pub fn logs<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.console.add_all(lines);
        self
    }

    pub fn log_entries(mut self, entries: impl IntoIterator<Item = LogEntry>) -> Self {
        for entry in entries {
            self.console.push(entry);
        }
        self
    }

    pub fn network(mut self, entries: impl IntoIterator<Item = NetworkEntry>) -> Self {
        self.network.extend(entries);
        self
    }

    pub fn performance(mut self, result: CheckResult<Option<PerformanceSnapshot>>) -> Self {
        match result {
            Ok(snapshot) => self.performance = snapshot,
            Err(e) => self
                .errors
                .push(format!("Failed to get performance metrics: {}", e)),
        }
        self
    }

    /// Findings from out-of-band checks, kept verbatim.
    pub fn security_issues<I, S>(mut self, issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security_issues
            .extend(issues.into_iter().map(Into::into));
        self
    }

    pub fn security_check(self, result: CheckResult<Vec<String>>) -> Self {
        match result {
            Ok(issues) => self.security_issues(issues),
            Err(e) => self.check_failed("Security check", &e),
        }
    }

    pub fn accessibility_check(mut self, result: CheckResult<Vec<String>>) -> Self {
        match result {
            Ok(issues) => {
                self.warnings.extend(
                    issues
                        .into_iter()
                        .map(|i| format!("{}: {}", ACCESSIBILITY_MARKER, i)),
                );
                self
            }
            Err(e) => self.check_failed("Accessibility check", &e),
        }
    }

    pub fn check_failed(mut self, check: &str, reason: &str) -> Self {
        self.errors.push(format!("{} failed: {}", check, reason));
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.errors.push(message.into());
        self
    }

    pub fn warning(mut self, message: impl Into<String>) -> Self {
        self.warnings.push(message.into());
        self
    }

    pub fn screenshot(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.screenshots.insert(name.into(), path.into());
        self
    }

    pub fn build(self) -> DiagnosticReport {
        let console_errors = self.console.errors();
        let error_count = console_errors.len();
        let mut errors = messages(console_errors);
        errors.extend(self.errors);

        let mut warnings = messages(self.console.warnings());
        warnings.extend(self.warnings);

        let passed = errors.is_empty() && self.security_issues.is_empty();
        let recommendations = recommend(
            error_count,
            &self.network,
            &warnings,
            &self.security_issues,
        );

        debug!(
            "Report for {}: {} errors, {} warnings, {} security issues",
            self.target,
            errors.len(),
            warnings.len(),
            self.security_issues.len()
        );

        DiagnosticReport {
            url: self.target,
            timestamp: self.timestamp,
            passed,
            console_logs: self.console.into_entries(),
            network_requests: self.network,
            performance: self.performance,
            errors,
            warnings,
            security_issues: self.security_issues,
            screenshots: self.screenshots,
            recommendations,
        }
    }
}

/// Build a report from already-collected inputs.
pub fn build_report<S: AsRef<str>>(
    target: &str,
    logs: &[S],
    network: Vec<NetworkEntry>,
    performance: Option<PerformanceSnapshot>,
    security_issues: Vec<String>,
) -> DiagnosticReport {
    ReportBuilder::new(target)
        .logs(logs)
        .network(network)
        .performance(Ok(performance))
        .security_issues(security_issues)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_LOGS: &[&str] = &[];

    #[test]
    fn test_verdict_clean_run_passes() {
        let report = build_report("/", &["[info] ready"], vec![], None, vec![]);
        assert!(report.passed());
        assert!(report.errors().is_empty());
        assert!(report.recommendations().is_empty());
    }

    #[test]
    fn test_verdict_one_error_fails() {
        let report = build_report("/", &["[ERROR] boom"], vec![], None, vec![]);
        assert!(!report.passed());
    }

    #[test]
    fn test_verdict_security_issue_fails() {
        let report = build_report("/", NO_LOGS, vec![], None, vec!["CORS error detected".into()]);
        assert!(!report.passed());
        assert_eq!(report.security_issues(), ["CORS error detected"]);
        assert_eq!(
            report.recommendations(),
            ["Address security issues immediately"]
        );
    }

    #[test]
    fn test_warnings_and_network_failures_do_not_fail() {
        let report = build_report(
            "/",
            &["[WARNING] deprecated"],
            vec![NetworkEntry::failed("/api/x", "GET", "net::ERR_FAILED")],
            None,
            vec![],
        );
        assert!(report.passed());
        assert_eq!(report.failed_requests().len(), 1);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let report = build_report(
            "http://localhost:3000/",
            &["[ERROR] TypeError: x is undefined", "[WARNING] deprecated API"],
            vec![NetworkEntry::completed("/api/x", "GET", 200, 1500.0, 512)],
            None,
            vec![],
        );
        assert_eq!(report.errors(), ["TypeError: x is undefined"]);
        assert_eq!(report.warnings(), ["deprecated API"]);
        assert_eq!(report.console_logs()[0].text, "[ERROR] TypeError: x is undefined");
        assert!(!report.passed());
        assert_eq!(
            report.recommendations(),
            ["Optimize 1 slow network request", "Fix 1 console error"]
        );
    }

    #[test]
    fn test_recommendation_order_is_fixed() {
        let report = ReportBuilder::new("/")
            .logs(["[ERROR] a", "[ERROR] b"])
            .network(vec![
                NetworkEntry::completed("/a", "GET", 200, 1001.0, 0),
                NetworkEntry::completed("/b", "GET", 200, 2000.0, 0),
                NetworkEntry::completed("/c", "GET", 200, 1000.0, 0),
            ])
            .security_issues(["Mixed content"])
            .accessibility_check(Ok(vec!["Image missing alt text: logo.png".into()]))
            .build();

        assert_eq!(
            report.recommendations(),
            [
                "Optimize 2 slow network requests",
                "Fix 2 console errors",
                "Address security issues immediately",
                "Improve accessibility for better user experience",
            ]
        );
        assert_eq!(
            report.warnings(),
            ["Accessibility: Image missing alt text: logo.png"]
        );
    }

    #[test]
    fn test_check_failures_fold_into_errors() {
        let report = ReportBuilder::new("/")
            .performance(Err("evaluate timed out".into()))
            .accessibility_check(Err("page closed".into()))
            .security_check(Err("page closed".into()))
            .build();

        assert!(!report.passed());
        assert!(report.performance().is_none());
        assert_eq!(
            report.errors(),
            [
                "Failed to get performance metrics: evaluate timed out",
                "Accessibility check failed: page closed",
                "Security check failed: page closed",
            ]
        );
        // Collection failures are not console errors
        assert!(report.recommendations().is_empty());
    }

    #[test]
    fn test_tagged_network_error_stays_an_error() {
        let report = build_report("/", &["[ERROR] fetch failed"], vec![], None, vec![]);
        let entry = &report.console_logs()[0];
        assert_eq!(entry.kind, LogKind::Error);
        assert_eq!(crate::log_capture::classify(&entry.text), LogKind::Error);
        assert_eq!(report.errors(), ["fetch failed"]);
        assert_eq!(report.recommendations(), ["Fix 1 console error"]);
    }

    #[test]
    fn test_failed_entry_has_no_status_or_duration() {
        let entry = NetworkEntry::failed("/x", "POST", "refused");
        assert!(entry.status.is_none());
        assert!(entry.duration_ms.is_none());
        assert!(!entry.is_slow());
        assert!(entry.is_failure());
    }

    #[test]
    fn test_export_field_names() {
        let report = ReportBuilder::new("/")
            .logs(["[ERROR] x"])
            .network(vec![NetworkEntry::completed("/a", "GET", 404, 10.0, 3)])
            .screenshot("initial_load", "screenshots/initial_load.png")
            .build();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        for key in [
            "url",
            "timestamp",
            "passed",
            "console_logs",
            "network_requests",
            "performance",
            "errors",
            "warnings",
            "security_issues",
            "screenshots",
            "recommendations",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["console_logs"][0]["type"], "error");
        assert_eq!(value["network_requests"][0]["duration"], 10.0);
        assert_eq!(value["network_requests"][0]["size"], 3);
        assert!(value["network_requests"][0].get("error").is_none());
        assert!(value["performance"].is_null());
    }
}
