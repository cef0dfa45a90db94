use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::browser::{screenshot_path, BrowserDriver, HttpProbe};
use crate::config::{MANY_SESSIONS_THRESHOLD, RECURRING_MIN_COUNT};
use crate::diagnostics::{CheckResult, DiagnosticReport, NetworkEntry, ReportBuilder};
use crate::issues::{self, IssueRecord, IssueTracker};
use crate::log_capture::{classify, LogKind};
use crate::metrics::PerformanceSnapshot;
use crate::probe::{quick_validation, QuickValidation};
use crate::reporter::{TestReporter, TestStatus, TestSummary};
use crate::session::SessionStore;
use crate::trends::PerformanceAnalysis;

pub const PERFORMANCE_SCRIPT: &str = r#"() => {
    const nav = performance.getEntriesByType('navigation')[0];
    const paint = performance.getEntriesByType('paint');
    return {
        pageLoadTime: nav.loadEventEnd - nav.fetchStart,
        domContentLoaded: nav.domContentLoadedEventEnd - nav.fetchStart,
        firstPaint: paint.find(p => p.name === 'first-paint')?.startTime || 0,
        firstContentfulPaint: paint.find(p => p.name === 'first-contentful-paint')?.startTime || 0,
        timeToInteractive: nav.domInteractive - nav.fetchStart
    };
}"#;

pub const LAYOUT_SHIFT_SCRIPT: &str = r#"() => new Promise(resolve => {
    let total = 0;
    new PerformanceObserver(list => {
        for (const entry of list.getEntries()) {
            if (!entry.hadRecentInput) total += entry.value;
        }
    }).observe({ type: 'layout-shift', buffered: true });
    setTimeout(() => resolve(total), 1000);
})"#;

pub const MEMORY_SCRIPT: &str =
    "() => performance.memory ? performance.memory.usedJSHeapSize / 1048576 : null";

pub const ACCESSIBILITY_SCRIPT: &str = r#"() => {
    const issues = [];
    document.querySelectorAll('img').forEach(img => {
        if (!img.alt && !img.getAttribute('aria-label')) {
            issues.push(`Image missing alt text: ${img.src}`);
        }
    });
    document.querySelectorAll('input, select, textarea').forEach(input => {
        if (!input.labels?.length && !input.getAttribute('aria-label')) {
            issues.push(`Form input missing label: ${input.name || input.id}`);
        }
    });
    let lastLevel = 0;
    document.querySelectorAll('h1, h2, h3, h4, h5, h6').forEach(h => {
        const level = parseInt(h.tagName[1]);
        if (level > lastLevel + 1) {
            issues.push(`Heading hierarchy skip: ${h.tagName} after H${lastLevel}`);
        }
        lastLevel = level;
    });
    return issues;
}"#;

pub const SECURITY_SCRIPT: &str = r#"() => {
    const issues = [];
    if (window.location.protocol === 'https:') {
        document.querySelectorAll('[src^="http:"], [href^="http:"]').forEach(r => {
            issues.push(`Insecure resource: ${r.src || r.href}`);
        });
    }
    document.querySelectorAll('script[src*="//"]').forEach(s => {
        if (!s.integrity && !s.src.includes(window.location.hostname)) {
            issues.push(`External script without integrity check: ${s.src}`);
        }
    });
    const inline = document.querySelectorAll('script:not([src])');
    if (inline.length > 0) {
        issues.push(`Found ${inline.length} inline scripts - consider CSP`);
    }
    return issues;
}"#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigationTiming {
    page_load_time: f64,
    dom_content_loaded: f64,
    first_paint: f64,
    first_contentful_paint: f64,
    time_to_interactive: f64,
}

/// Navigation timing, layout shift and heap usage in one snapshot.
pub async fn read_performance<D: BrowserDriver>(
    driver: &mut D,
) -> CheckResult<Option<PerformanceSnapshot>> {
    let timing = driver.evaluate(PERFORMANCE_SCRIPT).await?;
    if timing.is_null() {
        return Ok(None);
    }
    let timing: NavigationTiming =
        serde_json::from_value(timing).map_err(|e| format!("unexpected timing data: {}", e))?;

    let cls = driver.evaluate(LAYOUT_SHIFT_SCRIPT).await?.as_f64().unwrap_or(0.0);
    let memory = driver.evaluate(MEMORY_SCRIPT).await?.as_f64();

    Ok(Some(PerformanceSnapshot {
        page_load_time: timing.page_load_time,
        dom_content_loaded: timing.dom_content_loaded,
        first_paint: timing.first_paint,
        first_contentful_paint: timing.first_contentful_paint,
        largest_contentful_paint: None,
        cumulative_layout_shift: cls,
        first_input_delay: None,
        time_to_interactive: timing.time_to_interactive,
        memory_usage: memory,
    }))
}

/// Run a script that returns an array of finding strings.
pub async fn findings_check<D: BrowserDriver>(driver: &mut D, script: &str) -> CheckResult<Vec<String>> {
    let value = driver.evaluate(script).await?;
    serde_json::from_value(value).map_err(|e| format!("unexpected check result: {}", e))
}

/// Security findings implied by console errors (CORS, mixed content, CSP).
pub fn console_security_findings<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let mut findings = Vec::new();
    for line in lines.iter().map(AsRef::as_ref) {
        if classify(line) != LogKind::Error {
            continue;
        }
        let finding = if line.contains("CORS") {
            "CORS error detected"
        } else if line.contains("Mixed Content") {
            "Mixed content warning (HTTP resource on HTTPS page)"
        } else if line.contains("CSP") || line.contains("Content Security Policy") {
            "Content Security Policy violation"
        } else {
            continue;
        };
        findings.push(finding.to_string());
    }
    findings
}

/// Fill an input, press a control, then expect a result element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub input_selector: String,
    pub value: String,
    pub submit_selector: String,
    pub result_selector: String,
}

/// One page run against a live driver.
pub struct DiagnosticRun<'a, D: BrowserDriver> {
    driver: &'a mut D,
    target: String,
    interaction: Option<Interaction>,
}

impl<'a, D: BrowserDriver> DiagnosticRun<'a, D> {
    pub fn new(driver: &'a mut D, target: impl Into<String>) -> Self {
        Self {
            driver,
            target: target.into(),
            interaction: None,
        }
    }

    pub fn with_interaction(mut self, interaction: Interaction) -> Self {
        self.interaction = Some(interaction);
        self
    }

    async fn screenshot(&mut self, builder: ReportBuilder, name: &str, full_page: bool) -> ReportBuilder {
        let path = screenshot_path(name, Utc::now());
        match self.driver.screenshot(&path, full_page).await {
            Ok(()) => builder.screenshot(name, path),
            Err(e) => builder.check_failed("Screenshot", &e),
        }
    }

    async fn interact(
        &mut self,
        builder: ReportBuilder,
        interaction: &Interaction,
    ) -> (ReportBuilder, TestStatus) {
        if !self
            .driver
            .fill(&interaction.input_selector, &interaction.value)
            .await
        {
            return (
                builder.warning("Input field not found for interaction test"),
                TestStatus::Skipped,
            );
        }
        if !self.driver.click(&interaction.submit_selector).await {
            return (
                builder.warning("Submit control not found for interaction test"),
                TestStatus::Skipped,
            );
        }
        let script = format!(
            "() => document.querySelector({}) !== null",
            serde_json::Value::String(interaction.result_selector.clone())
        );
        match self.driver.evaluate(&script).await {
            Ok(value) if value.as_bool() == Some(true) => (builder, TestStatus::Passed),
            Ok(_) => (
                builder.error("User interaction test: No result after submit"),
                TestStatus::Failed,
            ),
            Err(e) => (
                builder.check_failed("User interaction test", &e),
                TestStatus::Failed,
            ),
        }
    }

    pub async fn run(self) -> DiagnosticReport {
        self.run_reported(&mut TestReporter::new()).await
    }

    /// Like [`run`](Self::run), also recording the interaction step and the
    /// page verdict as test results.
    pub async fn run_reported(mut self, reporter: &mut TestReporter) -> DiagnosticReport {
        let started = Instant::now();
        info!("Running diagnostics on {}", self.target);
        let mut builder = ReportBuilder::new(self.target.clone());

        if !self.driver.navigate(&self.target).await {
            warn!("Navigation to {} failed", self.target);
            builder = builder.error("Failed to navigate to page");
        }

        builder = self.screenshot(builder, "initial_load", false).await;

        let performance = read_performance(self.driver).await;
        let accessibility = findings_check(self.driver, ACCESSIBILITY_SCRIPT).await;
        let security = findings_check(self.driver, SECURITY_SCRIPT).await;

        if let Some(interaction) = self.interaction.take() {
            let step = Instant::now();
            let (next, status) = self.interact(builder, &interaction).await;
            builder = next;
            let details = BTreeMap::from([(
                "result_selector".to_string(),
                serde_json::Value::from(interaction.result_selector),
            )]);
            reporter.add_result(
                "user_interaction",
                status,
                step.elapsed().as_secs_f64(),
                details,
            );
        }

        builder = self.screenshot(builder, "after_tests", true).await;

        let console = self.driver.console_logs().await;
        let network = self.driver.network_entries().await;

        let report = builder
            .security_issues(console_security_findings(&console))
            .logs(&console)
            .network(network)
            .performance(performance)
            .accessibility_check(accessibility)
            .security_check(security)
            .build();

        let details = BTreeMap::from([
            ("errors".to_string(), serde_json::Value::from(report.errors().len())),
            ("warnings".to_string(), serde_json::Value::from(report.warnings().len())),
            (
                "security_issues".to_string(),
                serde_json::Value::from(report.security_issues().len()),
            ),
        ]);
        reporter.add_result(
            "page_diagnostics",
            TestStatus::from_outcome(report.passed()),
            started.elapsed().as_secs_f64(),
            details,
        );
        report
    }
}

/// Output of an external capture, replayed into a report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CapturedRun {
    pub target: String,
    pub console_logs: Vec<String>,
    pub network_requests: Vec<NetworkEntry>,
    pub performance: Option<PerformanceSnapshot>,
    pub performance_error: Option<String>,
    pub security_issues: Vec<String>,
    pub accessibility_issues: Vec<String>,
    pub screenshots: BTreeMap<String, String>,
}

impl CapturedRun {
    pub fn into_report(self) -> DiagnosticReport {
        let performance = match self.performance_error {
            Some(e) => Err(e),
            None => Ok(self.performance),
        };
        let mut builder = ReportBuilder::new(self.target)
            .security_issues(console_security_findings(&self.console_logs))
            .logs(&self.console_logs)
            .network(self.network_requests)
            .performance(performance)
            .accessibility_check(Ok(self.accessibility_issues))
            .security_issues(self.security_issues);
        for (name, path) in self.screenshots {
            builder = builder.screenshot(name, path);
        }
        builder.build()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub session_count: u64,
    pub project_hash: Option<String>,
    pub quick_validation: Option<QuickValidation>,
    pub full_diagnostics_ran: bool,
    pub passed: bool,
    pub performance: PerformanceAnalysis,
    pub recurring_issues: Vec<IssueRecord>,
    pub total_tracked_issues: usize,
    pub recommendations: Vec<String>,
    pub tests: TestSummary,
    pub runtime: f64,
}

/// Folds reports into the session store and derives cross-run insights.
pub struct DiagnosticsEngine<'a> {
    store: &'a mut SessionStore,
}

impl<'a> DiagnosticsEngine<'a> {
    pub fn new(store: &'a mut SessionStore) -> Self {
        Self { store }
    }

    /// Track errors and security issues, and extend the metric history.
    pub fn record_report(&mut self, report: &DiagnosticReport) {
        let state = self.store.state_mut();
        {
            let mut tracker = IssueTracker::new(state);
            for error in report.errors() {
                tracker.track(error, "error");
            }
            for issue in report.security_issues() {
                tracker.track(issue, "security");
            }
        }
        if let Some(performance) = report.performance() {
            let metrics = performance.metrics();
            state.update_baseline(&metrics);
            state.add_datapoint(metrics);
        }
    }

    pub fn summarize(
        &self,
        report: Option<&DiagnosticReport>,
        quick: Option<QuickValidation>,
        project_hash: Option<String>,
        tests: &TestReporter,
        runtime: f64,
    ) -> RunSummary {
        let state = self.store.state();
        let performance = PerformanceAnalysis::from_session(state);
        let recurring = issues::recurring(&state.historical_issues, RECURRING_MIN_COUNT);

        let mut recommendations = Vec::new();
        if let Some(quick) = &quick {
            if !quick.passed {
                recommendations.push("CRITICAL: Quick validation failed - fix immediately".to_string());
            }
            recommendations.extend(quick.slow_responses());
        }
        if let Some(report) = report {
            if !report.security_issues().is_empty() {
                recommendations
                    .push("Security issues detected - review and fix before deployment".to_string());
            }
            if report.console_count(LogKind::Error) > 0 {
                recommendations.push("Console errors found - check browser console".to_string());
            }
        }
        for metric in performance.degrading() {
            recommendations.push(format!(
                "{} is degrading - investigate recent changes",
                metric
            ));
        }
        recommendations.extend(issues::recommendations(&recurring));
        if state.session_count > MANY_SESSIONS_THRESHOLD {
            recommendations.push(
                "Consider implementing automated monitoring - you've run many diagnostic sessions"
                    .to_string(),
            );
        }
        if recommendations.is_empty() {
            recommendations.extend([
                "All diagnostics passed - system is healthy".to_string(),
                "Consider adding more comprehensive tests".to_string(),
                "Monitor performance metrics regularly".to_string(),
            ]);
        }

        let passed = quick.as_ref().map_or(true, |q| q.passed) && report.map_or(true, |r| r.passed());

        RunSummary {
            session_count: state.session_count,
            project_hash,
            quick_validation: quick,
            full_diagnostics_ran: report.is_some(),
            passed,
            performance,
            total_tracked_issues: state.historical_issues.len(),
            recurring_issues: recurring,
            recommendations,
            tests: tests.summary(),
            runtime,
        }
    }

    /// Quick validation always; the browser run only when the project
    /// changed, on the periodic full scan, or when quick validation failed.
    pub async fn run<D: BrowserDriver, P: HttpProbe>(
        &mut self,
        driver: &mut D,
        probe: &P,
        target: &str,
        base_url: &str,
        api_path: &str,
        project_hash: &str,
    ) -> (RunSummary, Option<DiagnosticReport>) {
        let started = Instant::now();
        let mut reporter = TestReporter::new();
        let session = self.store.state_mut().begin_run();
        info!("Diagnostics session #{}", session);

        let quick = quick_validation(probe, base_url, api_path).await;
        quick.record_into(&mut reporter);

        let needs_full = self.store.state().should_run_full(project_hash) || !quick.passed;
        let report = if needs_full {
            let report = DiagnosticRun::new(driver, target)
                .run_reported(&mut reporter)
                .await;
            self.record_report(&report);
            self.store.state_mut().mark_full_run(project_hash);
            Some(report)
        } else {
            info!("Quick validation passed and nothing changed, skipping full diagnostics");
            reporter.add_result("page_diagnostics", TestStatus::Skipped, 0.0, BTreeMap::new());
            None
        };

        let runtime = started.elapsed().as_secs_f64();
        self.store.state_mut().add_runtime(runtime);

        let summary = self.summarize(
            report.as_ref(),
            Some(quick),
            Some(project_hash.to_string()),
            &reporter,
            runtime,
        );
        (summary, report)
    }
}
