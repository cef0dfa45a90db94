//! Interfaces to the browser-automation and HTTP layers.
//!
//! The diagnostics core never drives a browser itself; callers plug in a
//! driver and hand over finished results.
#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::diagnostics::{CheckResult, NetworkEntry};
use crate::error::{DiagnosticsError, DiagnosticsResult};

pub trait BrowserDriver {
    async fn navigate(&mut self, url: &str) -> bool;

    async fn evaluate(&mut self, script: &str) -> CheckResult<serde_json::Value>;

    /// Console lines seen so far, each prefixed with a kind tag like `[error]`.
    async fn console_logs(&mut self) -> Vec<String>;

    async fn network_entries(&mut self) -> Vec<NetworkEntry>;

    /// Capture the page into `path`, see [`screenshot_path`].
    async fn screenshot(&mut self, path: &str, full_page: bool) -> CheckResult<()>;

    async fn click(&mut self, selector: &str) -> bool;

    async fn fill(&mut self, selector: &str, value: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub trait HttpProbe {
    /// Connection errors and timeouts come back as `Err`.
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<&str>,
        timeout: Duration,
    ) -> DiagnosticsResult<HttpResponse>;
}

impl HttpProbe for reqwest::Client {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<&str>,
        timeout: Duration,
    ) -> DiagnosticsResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|e| DiagnosticsError::Other(format!("Invalid HTTP method: {}", e)))?;

        let mut builder = reqwest::Client::request(self, method, url).timeout(timeout);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// `screenshots/<name>_<YYYYmmdd_HHMMSS>.png`. Unique between sequential
/// runs only.
pub fn screenshot_path(name: &str, at: DateTime<Utc>) -> String {
    format!("screenshots/{}_{}.png", name, at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_screenshot_path() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            screenshot_path("initial_load", at),
            "screenshots/initial_load_20260304_050607.png"
        );
    }
}
