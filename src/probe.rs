use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::browser::HttpProbe;
use crate::config::{
    API_ACCEPTED_STATUSES, API_PROBE_TIMEOUT_SECS, DEFAULT_API_BODY, PAGE_PROBE_TIMEOUT_SECS,
    SLOW_PROBE_SECS,
};
use crate::error::DiagnosticsResult;
use crate::reporter::{TestReporter, TestStatus};

/// Check name and the endpoint its response time is stored under.
const CHECK_ENDPOINTS: [(&str, &str); 2] = [
    ("server_running", "main_page"),
    ("api_responding", "api_endpoint"),
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct QuickValidation {
    pub passed: bool,
    pub checks: BTreeMap<String, bool>,
    pub errors: Vec<String>,
    /// Seconds per probed endpoint
    pub response_times: BTreeMap<String, f64>,
}

impl QuickValidation {
    pub fn slow_responses(&self) -> Vec<String> {
        self.response_times
            .iter()
            .filter(|(_, secs)| **secs > SLOW_PROBE_SECS)
            .map(|(endpoint, secs)| {
                format!("Optimize {} - response time {:.2}s is slow", endpoint, secs)
            })
            .collect()
    }

    /// One test result per check, timed by its endpoint's response.
    pub fn record_into(&self, reporter: &mut TestReporter) {
        for (check, endpoint) in CHECK_ENDPOINTS {
            let Some(ok) = self.checks.get(check) else {
                continue;
            };
            let duration = self.response_times.get(endpoint).copied().unwrap_or(0.0);
            let details = BTreeMap::from([(
                "endpoint".to_string(),
                serde_json::Value::from(endpoint),
            )]);
            reporter.add_result(check, TestStatus::from_outcome(*ok), duration, details);
        }
    }
}

fn join(base_url: &str, path: &str) -> DiagnosticsResult<String> {
    Ok(url::Url::parse(base_url)?.join(path)?.to_string())
}

/// One request per endpoint; a transport error fails that check only.
#[allow(clippy::too_many_arguments)]
async fn check<P: HttpProbe>(
    probe: &P,
    result: &mut QuickValidation,
    name: &str,
    method: &str,
    url: &str,
    body: Option<&str>,
    timeout: Duration,
    accept: impl Fn(u16) -> bool,
    endpoint: &str,
) {
    let headers = [("content-type".to_string(), "application/json".to_string())];
    let started = Instant::now();
    match probe.request(method, url, &headers, body, timeout).await {
        Ok(resp) => {
            let secs = started.elapsed().as_secs_f64();
            debug!("{} {} -> {} in {:.3}s", method, url, resp.status, secs);
            result.response_times.insert(endpoint.to_string(), secs);
            result.checks.insert(name.to_string(), accept(resp.status));
        }
        Err(e) => {
            warn!("Probe {} failed: {}", url, e);
            result.checks.insert(name.to_string(), false);
            result
                .errors
                .push(format!("Quick validation failed: {} {}: {}", method, url, e));
        }
    }
}

/// GET the main page and POST the API; both must answer acceptably.
pub async fn quick_validation<P: HttpProbe>(
    probe: &P,
    base_url: &str,
    api_path: &str,
) -> QuickValidation {
    let mut result = QuickValidation::default();

    let (page_url, api_url) = match (join(base_url, "/"), join(base_url, api_path)) {
        (Ok(page), Ok(api)) => (page, api),
        (Err(e), _) | (_, Err(e)) => {
            result
                .errors
                .push(format!("Quick validation failed: {}", e));
            return result;
        }
    };

    let [(page_check, page_endpoint), (api_check, api_endpoint)] = CHECK_ENDPOINTS;

    check(
        probe,
        &mut result,
        page_check,
        "GET",
        &page_url,
        None,
        Duration::from_secs(PAGE_PROBE_TIMEOUT_SECS),
        |status| status == 200,
        page_endpoint,
    )
    .await;

    check(
        probe,
        &mut result,
        api_check,
        "POST",
        &api_url,
        Some(DEFAULT_API_BODY),
        Duration::from_secs(API_PROBE_TIMEOUT_SECS),
        |status| API_ACCEPTED_STATUSES.contains(&status),
        api_endpoint,
    )
    .await;

    result.passed = result.errors.is_empty() && result.checks.values().all(|ok| *ok);
    result
}
