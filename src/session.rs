use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{FULL_SCAN_PERIOD, PERFORMANCE_HISTORY_LIMIT};
use crate::issues::IssueRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceDatapoint {
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
}

/// State persisted between diagnostic runs of one project.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SessionState {
    /// Lowest value ever recorded per metric
    pub baseline_metrics: BTreeMap<String, f64>,
    pub historical_issues: Vec<IssueRecord>,
    pub performance_history: Vec<PerformanceDatapoint>,
    pub test_patterns: Vec<serde_json::Value>,
    pub user_preferences: BTreeMap<String, serde_json::Value>,
    pub security_baseline: BTreeMap<String, serde_json::Value>,
    pub last_run_hash: String,
    pub session_count: u64,
    /// Cumulative seconds
    pub total_runtime: f64,
}

impl SessionState {
    /// Keep the lower of the stored and the new value for each metric.
    pub fn update_baseline(&mut self, metrics: &BTreeMap<String, f64>) {
        for (name, value) in metrics {
            match self.baseline_metrics.get(name) {
                Some(best) if *best <= *value => {}
                _ => {
                    self.baseline_metrics.insert(name.clone(), *value);
                }
            }
        }
    }

    pub fn add_datapoint(&mut self, metrics: BTreeMap<String, f64>) {
        self.add_datapoint_at(metrics, Utc::now());
    }

    pub fn add_datapoint_at(&mut self, metrics: BTreeMap<String, f64>, timestamp: DateTime<Utc>) {
        self.performance_history
            .push(PerformanceDatapoint { timestamp, metrics });
        if self.performance_history.len() > PERFORMANCE_HISTORY_LIMIT {
            let excess = self.performance_history.len() - PERFORMANCE_HISTORY_LIMIT;
            self.performance_history.drain(..excess);
        }
    }

    /// Count a new run and return its number.
    pub fn begin_run(&mut self) -> u64 {
        self.session_count += 1;
        self.session_count
    }

    pub fn add_runtime(&mut self, secs: f64) {
        self.total_runtime += secs;
    }

    /// Full diagnostics run when the project changed or on every
    /// `FULL_SCAN_PERIOD`th session.
    pub fn should_run_full(&self, current_hash: &str) -> bool {
        if current_hash != self.last_run_hash {
            debug!("Project hash changed, full diagnostics required");
            return true;
        }
        self.session_count % FULL_SCAN_PERIOD == 0
    }

    pub fn mark_full_run(&mut self, hash: &str) {
        self.last_run_hash = hash.to_string();
    }
}

pub fn load_session(path: &Path) -> SessionState {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("Session store {:?} is corrupt, starting fresh: {}", path, e);
                SessionState::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
        Err(e) => {
            warn!("Session store {:?} is unreadable, starting fresh: {}", path, e);
            SessionState::default()
        }
    }
}

pub fn save_session(path: &Path, state: &SessionState) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create session dir {:?}: {}", parent, e);
            return;
        }
    }
    match serde_json::to_string_pretty(state) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("Failed to save session to {:?}: {}", path, e);
            }
        }
        Err(e) => {
            warn!("Failed to serialize session: {}", e);
        }
    }
}

/// A `SessionState` bound to its file. Loaded at the start of a run and
/// saved at the end; there is no locking between processes.
pub struct SessionStore {
    path: PathBuf,
    state: SessionState,
}

impl SessionStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_session(&path);
        Self { path, state }
    }

    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: SessionState::default(),
        }
    }

    pub fn save(&self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        save_session(&self.path, &self.state);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }
}
