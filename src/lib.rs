// Library crate for the CLI and integration tests.

pub mod browser;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod issues;
pub mod log_capture;
pub mod metrics;
pub mod probe;
pub mod reporter;
pub mod session;
pub mod trends;
