use browser_diagnostics::issues::IssueTracker;
use browser_diagnostics::session::{load_session, save_session, SessionState, SessionStore};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Run `f` with WARN-level tracing output captured.
fn with_captured_log<T>(f: impl FnOnce() -> T) -> (T, String) {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, log.contents())
}

fn metrics(page_load: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([("page_load_time".to_string(), page_load)])
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let state = load_session(&dir.path().join("nonexistent.json"));
    assert_eq!(state, SessionState::default());
    assert_eq!(state.session_count, 0);
}

#[test]
fn test_missing_file_is_silent() {
    let dir = TempDir::new().unwrap();
    let (state, log) = with_captured_log(|| load_session(&dir.path().join("absent.json")));
    assert_eq!(state, SessionState::default());
    assert!(log.is_empty(), "unexpected log: {}", log);
}

#[test]
fn test_unreadable_store_warns() {
    let dir = TempDir::new().unwrap();
    // A directory cannot be read as a file
    let (state, log) = with_captured_log(|| load_session(dir.path()));
    assert_eq!(state, SessionState::default());
    assert!(log.contains("WARN"), "missing warning: {}", log);
    assert!(log.contains("unreadable"), "missing warning: {}", log);
}

#[test]
fn test_corrupt_store_warns() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{").unwrap();
    let (_, log) = with_captured_log(|| load_session(&path));
    assert!(log.contains("corrupt"), "missing warning: {}", log);
}

#[test]
fn test_load_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "not json at all {{{").unwrap();
    let state = load_session(&path);
    // Corrupt stores are replaced by defaults instead of failing the run
    assert!(state.historical_issues.is_empty());
    assert!(state.performance_history.is_empty());
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("session.json");

    let mut state = SessionState::default();
    state.begin_run();
    state.add_runtime(1.5);
    state.update_baseline(&metrics(800.0));
    state.add_datapoint(metrics(800.0));
    state.mark_full_run("abc123");
    IssueTracker::new(&mut state).track("TypeError: x is undefined", "error");

    save_session(&path, &state);
    let loaded = load_session(&path);

    assert_eq!(loaded, state);
    assert_eq!(loaded.last_run_hash, "abc123");
    assert_eq!(loaded.historical_issues[0].count, 1);
}

#[test]
fn test_partial_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.json");

    std::fs::write(&path, r#"{"session_count": 7, "last_run_hash": "h"}"#).unwrap();
    let loaded = load_session(&path);

    assert_eq!(loaded.session_count, 7);
    assert_eq!(loaded.last_run_hash, "h");
    assert!(loaded.baseline_metrics.is_empty());
    assert_eq!(loaded.total_runtime, 0.0);
}

#[test]
fn test_fingerprints_converge_across_processes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");

    for _ in 0..2 {
        let mut store = SessionStore::load(path.clone());
        IssueTracker::new(store.state_mut()).track("Failed to load resource: 404", "error");
        store.save();
    }

    let store = SessionStore::load(path.clone());
    assert_eq!(store.state().historical_issues.len(), 1);
    assert_eq!(store.state().historical_issues[0].count, 2);
}

#[test]
fn test_history_is_capped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");

    let mut store = SessionStore::load(path.clone());
    for i in 0..60 {
        store.state_mut().add_datapoint(metrics(i as f64));
    }
    store.save();

    let loaded = load_session(&path);
    assert_eq!(loaded.performance_history.len(), 50);
    assert_eq!(loaded.performance_history[0].metrics["page_load_time"], 10.0);
    assert_eq!(loaded.performance_history[49].metrics["page_load_time"], 59.0);
}

#[test]
fn test_in_memory_store_does_not_write() {
    let mut store = SessionStore::in_memory();
    store.state_mut().begin_run();
    store.save();
    assert!(store.path().as_os_str().is_empty());
}
