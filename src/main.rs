use anyhow::Context;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

use browser_diagnostics::config::{CliArgs, Command, DiagnosticsConfig};
use browser_diagnostics::diagnostics::{save_report, DiagnosticReport};
use browser_diagnostics::engine::{CapturedRun, DiagnosticsEngine, RunSummary};
use browser_diagnostics::issues;
use browser_diagnostics::probe::quick_validation;
use browser_diagnostics::reporter::{TestReporter, TestStatus};
use browser_diagnostics::session::SessionStore;
use browser_diagnostics::trends::PerformanceAnalysis;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "browser_diagnostics=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    let config = DiagnosticsConfig::from_args(&args);
    info!("Starting browser-diagnostics v{}", env!("CARGO_PKG_VERSION"));
    info!("Session store: {:?}", config.session_path());

    let mut store = SessionStore::load(config.session_path());

    let passed = match &args.command {
        Command::Analyze { input } => {
            let passed = analyze(&config, &mut store, input)?;
            store.save();
            passed
        }
        Command::Probe { .. } => {
            let passed = probe(&config, &mut store).await?;
            store.save();
            passed
        }
        Command::Trends => {
            print_trends(&PerformanceAnalysis::from_session(store.state()));
            true
        }
        Command::Issues { min_count } => {
            print_issues(&store, *min_count);
            true
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

fn analyze(
    config: &DiagnosticsConfig,
    store: &mut SessionStore,
    input: &Path,
) -> anyhow::Result<bool> {
    let started = Instant::now();
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read captured run {:?}", input))?;
    let captured: CapturedRun = serde_json::from_str(&content)
        .with_context(|| format!("Invalid captured run {:?}", input))?;

    let session = store.state_mut().begin_run();
    info!("Diagnostics session #{}", session);

    let report = captured.into_report();
    let mut engine = DiagnosticsEngine::new(store);
    engine.record_report(&report);

    let runtime = started.elapsed().as_secs_f64();
    let mut reporter = TestReporter::new();
    reporter.add_result(
        "page_diagnostics",
        TestStatus::from_outcome(report.passed()),
        runtime,
        BTreeMap::new(),
    );
    let summary = engine.summarize(
        Some(&report),
        None,
        config.project_hash.clone(),
        &reporter,
        runtime,
    );
    if let Some(hash) = &config.project_hash {
        store.state_mut().mark_full_run(hash);
    }
    store.state_mut().add_runtime(runtime);

    print_report(&report);
    print_summary(&summary);

    match save_report(&config.report_dir, &report) {
        Ok(path) => println!("\nReport saved to: {}", path.display()),
        Err(e) => error!("Failed to save report: {}", e),
    }

    Ok(summary.passed)
}

async fn probe(config: &DiagnosticsConfig, store: &mut SessionStore) -> anyhow::Result<bool> {
    let started = Instant::now();
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let session = store.state_mut().begin_run();
    info!("Quick validation session #{} against {}", session, config.base_url);

    let quick = quick_validation(&client, &config.base_url, &config.api_path).await;
    let runtime = started.elapsed().as_secs_f64();
    store.state_mut().add_runtime(runtime);

    let mut reporter = TestReporter::new();
    quick.record_into(&mut reporter);

    let engine = DiagnosticsEngine::new(store);
    let summary = engine.summarize(
        None,
        Some(quick),
        config.project_hash.clone(),
        &reporter,
        runtime,
    );
    print_summary(&summary);
    Ok(summary.passed)
}

fn print_report(report: &DiagnosticReport) {
    println!("\nBROWSER DIAGNOSTICS REPORT");
    println!("{}", "=".repeat(60));
    println!("URL: {}", report.target());
    println!("Timestamp: {}", report.timestamp().to_rfc3339());
    println!("Status: {}", if report.passed() { "PASSED" } else { "FAILED" });
    println!(
        "Network requests: {} total, {} failed",
        report.network_requests().len(),
        report.failed_requests().len()
    );
    if let Some(perf) = report.performance() {
        println!("Page load: {:.2}ms", perf.page_load_time);
        println!("First contentful paint: {:.2}ms", perf.first_contentful_paint);
        if let Some(memory) = perf.memory_usage {
            println!("Memory usage: {:.2}MB", memory);
        }
    }
    for (title, items) in [
        ("Errors", report.errors()),
        ("Security issues", report.security_issues()),
        ("Warnings", report.warnings()),
    ] {
        if !items.is_empty() {
            println!("\n{} ({}):", title, items.len());
            for item in items.iter().take(5) {
                println!("  - {}", item);
            }
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\nDIAGNOSTICS SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Session: #{}", summary.session_count);
    println!("Runtime: {:.2}s", summary.runtime);
    if let Some(quick) = &summary.quick_validation {
        println!(
            "Quick validation: {}",
            if quick.passed { "PASSED" } else { "FAILED" }
        );
    }
    println!(
        "Tests: {} total, {} passed, {} failed, {} skipped ({:.2}s)",
        summary.tests.total,
        summary.tests.passed,
        summary.tests.failed,
        summary.tests.skipped,
        summary.tests.duration
    );
    print_trends(&summary.performance);
    if !summary.recurring_issues.is_empty() {
        println!("\nRecurring issues: {}", summary.recurring_issues.len());
    }
    println!("\nRecommendations:");
    for (i, rec) in summary.recommendations.iter().take(10).enumerate() {
        println!("  {}. {}", i + 1, rec);
    }
    println!(
        "\nOVERALL STATUS: {}",
        if summary.passed { "PASSED" } else { "NEEDS ATTENTION" }
    );
}

fn print_trends(analysis: &PerformanceAnalysis) {
    if !analysis.metrics.is_empty() {
        println!("\nMetrics ({} data points):", analysis.data_points);
        for (name, m) in &analysis.metrics {
            println!(
                "  {}: avg {:.2}, min {:.2}, max {:.2}, latest {:.2}",
                name, m.average, m.min, m.max, m.latest
            );
        }
    }
    if analysis.trends.is_empty() {
        println!(
            "\nNot enough history for trends ({} data points)",
            analysis.data_points
        );
        return;
    }
    println!("\nPerformance trends ({} data points):", analysis.data_points);
    for insight in &analysis.insights {
        println!("  {}", insight);
    }
}

fn print_issues(store: &SessionStore, min_count: u32) {
    let records = &store.state().historical_issues;
    let recurring = issues::recurring(records, min_count);
    println!(
        "Tracked issues: {}, recurring (>= {}): {}",
        records.len(),
        min_count,
        recurring.len()
    );
    for (category, group) in issues::by_category(&recurring) {
        println!("\n[{}]", category);
        for record in group {
            println!("  x{} {}", record.count, record.text);
        }
    }
    for rec in issues::recommendations(&recurring) {
        println!("  * {}", rec);
    }
}
