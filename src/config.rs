use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Browser diagnostics: aggregate console, network, performance and security
/// signals from a page run into a single pass/fail report.
#[derive(Parser, Debug, Clone)]
#[command(name = "browser-diagnostics")]
pub struct CliArgs {
    /// Directory holding the persisted session store
    #[arg(long = "session-dir", default_value = DEFAULT_SESSION_DIR)]
    pub session_dir: PathBuf,

    /// Directory that exported reports are written to
    #[arg(long = "report-dir", default_value = DEFAULT_REPORT_DIR)]
    pub report_dir: PathBuf,

    /// Hash of the current project state, used to decide on a full scan
    #[arg(long = "project-hash")]
    pub project_hash: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build a report from captured browser events
    Analyze {
        /// JSON file with console lines, network entries and check results
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
    },
    /// Quick validation of a running server over HTTP
    Probe {
        /// Base URL of the server under test
        #[arg(short = 'u', long = "base-url", default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// API path POSTed to during validation
        #[arg(long = "api-path", default_value = DEFAULT_API_PATH)]
        api_path: String,
    },
    /// Show performance trends from the session history
    Trends,
    /// Show recurring issues tracked across runs
    Issues {
        #[arg(long = "min-count", default_value_t = RECURRING_MIN_COUNT)]
        min_count: u32,
    },
}

pub struct DiagnosticsConfig {
    pub session_dir: PathBuf,
    pub report_dir: PathBuf,
    pub project_hash: Option<String>,
    pub base_url: String,
    pub api_path: String,
}

// Paths
pub const DEFAULT_SESSION_DIR: &str = ".diagnostics/sessions";
pub const DEFAULT_REPORT_DIR: &str = "diagnostics-reports";
pub const SESSION_FILE_NAME: &str = "diagnostics_session.json";

// Probe constants
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_API_PATH: &str = "/api/generate";
pub const PAGE_PROBE_TIMEOUT_SECS: u64 = 5;
pub const API_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_API_BODY: &str = r#"{"words":"test","mode":"emoji","tone":"fun"}"#;
pub const API_ACCEPTED_STATUSES: &[u16] = &[200, 400, 429];
pub const SLOW_PROBE_SECS: f64 = 2.0;

// History constants
pub const PERFORMANCE_HISTORY_LIMIT: usize = 50;

// Trend constants
pub const TREND_MIN_POINTS: usize = 10;
pub const TREND_WINDOW: usize = 5;
pub const TREND_IMPROVING_FACTOR: f64 = 0.9;
pub const TREND_DEGRADING_FACTOR: f64 = 1.1;

// Report constants
pub const SLOW_REQUEST_MS: f64 = 1000.0;
pub const ACCESSIBILITY_MARKER: &str = "Accessibility";

// Issue constants
pub const RECURRING_MIN_COUNT: u32 = 3;
pub const URGENT_ISSUE_COUNT: u32 = 5;

// Session constants
pub const FULL_SCAN_PERIOD: u64 = 10;
pub const MANY_SESSIONS_THRESHOLD: u64 = 20;

impl DiagnosticsConfig {
    pub fn from_args(args: &CliArgs) -> Self {
        let (base_url, api_path) = match &args.command {
            Command::Probe { base_url, api_path } => (base_url.clone(), api_path.clone()),
            _ => (DEFAULT_BASE_URL.to_string(), DEFAULT_API_PATH.to_string()),
        };

        DiagnosticsConfig {
            session_dir: args.session_dir.clone(),
            report_dir: args.report_dir.clone(),
            project_hash: args.project_hash.clone(),
            base_url,
            api_path,
        }
    }

    /// Path to the session store file
    pub fn session_path(&self) -> PathBuf {
        self.session_dir.join(SESSION_FILE_NAME)
    }
}
