use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub fn from_outcome(passed: bool) -> Self {
        if passed {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    /// Seconds
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Sum of the recorded test durations
    pub duration: f64,
    /// Wall time since the reporter was created
    pub session_duration: f64,
}

/// Named test outcomes collected over one diagnostics session.
#[derive(Debug, Clone)]
pub struct TestReporter {
    results: Vec<TestResult>,
    session_start: DateTime<Utc>,
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TestReporter {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(session_start: DateTime<Utc>) -> Self {
        TestReporter {
            results: Vec::new(),
            session_start,
        }
    }

    pub fn add_result(
        &mut self,
        name: impl Into<String>,
        status: TestStatus,
        duration: f64,
        details: BTreeMap<String, serde_json::Value>,
    ) {
        self.results.push(TestResult {
            name: name.into(),
            status,
            duration,
            timestamp: Utc::now(),
            details,
        });
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn summary(&self) -> TestSummary {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> TestSummary {
        let count = |status: TestStatus| self.results.iter().filter(|r| r.status == status).count();
        TestSummary {
            total: self.results.len(),
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            skipped: count(TestStatus::Skipped),
            duration: self.results.iter().map(|r| r.duration).sum(),
            session_duration: (now - self.session_start).num_milliseconds() as f64 / 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_empty_summary() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let reporter = TestReporter::started_at(start);
        let summary = reporter.summary_at(start);
        assert_eq!(summary, TestSummary::default());
    }

    #[test]
    fn test_summary_counts_statuses() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut reporter = TestReporter::started_at(start);
        reporter.add_result("server_running", TestStatus::Passed, 0.25, BTreeMap::new());
        reporter.add_result("api_responding", TestStatus::Failed, 1.5, BTreeMap::new());
        reporter.add_result("full_diagnostics", TestStatus::Skipped, 0.0, BTreeMap::new());
        reporter.add_result("interaction", TestStatus::Passed, 0.75, BTreeMap::new());

        let summary = reporter.summary_at(start + Duration::milliseconds(4500));
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.duration, 2.5);
        assert_eq!(summary.session_duration, 4.5);
        assert_eq!(reporter.results()[1].name, "api_responding");
    }

    #[test]
    fn test_result_serializes_lowercase_status() {
        let mut reporter = TestReporter::new();
        let details = BTreeMap::from([("errors".to_string(), serde_json::json!(2))]);
        reporter.add_result("full_diagnostics", TestStatus::from_outcome(false), 3.0, details);

        let value = serde_json::to_value(&reporter.results()[0]).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["details"]["errors"], 2);
        assert_eq!(value["duration"], 3.0);
    }
}
