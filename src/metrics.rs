use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timings captured once per page load. Milliseconds unless noted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSnapshot {
    #[serde(default)]
    pub page_load_time: f64,
    #[serde(default)]
    pub dom_content_loaded: f64,
    #[serde(default)]
    pub first_paint: f64,
    #[serde(default)]
    pub first_contentful_paint: f64,
    #[serde(default)]
    pub largest_contentful_paint: Option<f64>,
    /// Unitless layout shift score
    #[serde(default)]
    pub cumulative_layout_shift: f64,
    #[serde(default)]
    pub first_input_delay: Option<f64>,
    #[serde(default)]
    pub time_to_interactive: f64,
    /// JS heap in MB, when the browser exposes it
    #[serde(default)]
    pub memory_usage: Option<f64>,
}

impl PerformanceSnapshot {
    /// Measured fields keyed by name. Absent optional fields are left out.
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        out.insert("page_load_time".to_string(), self.page_load_time);
        out.insert("dom_content_loaded".to_string(), self.dom_content_loaded);
        out.insert("first_paint".to_string(), self.first_paint);
        out.insert(
            "first_contentful_paint".to_string(),
            self.first_contentful_paint,
        );
        out.insert(
            "cumulative_layout_shift".to_string(),
            self.cumulative_layout_shift,
        );
        out.insert("time_to_interactive".to_string(), self.time_to_interactive);
        let optional = [
            ("largest_contentful_paint", self.largest_contentful_paint),
            ("first_input_delay", self.first_input_delay),
            ("memory_usage", self.memory_usage),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                out.insert(name.to_string(), v);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricSummary {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub latest: f64,
}

/// Append-only numeric series per metric name.
///
/// Statistics on a metric without samples are `None`, never `0.0`.
#[derive(Debug, Default)]
pub struct MetricRecorder {
    series: BTreeMap<String, Vec<MetricSample>>,
}

impl MetricRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, value: f64) {
        self.record_at(name, value, Utc::now());
    }

    pub fn record_at(&mut self, name: &str, value: f64, recorded_at: DateTime<Utc>) {
        self.series
            .entry(name.to_string())
            .or_default()
            .push(MetricSample { value, recorded_at });
    }

    pub fn record_snapshot(&mut self, snapshot: &PerformanceSnapshot) {
        let now = Utc::now();
        for (name, value) in snapshot.metrics() {
            self.record_at(&name, value, now);
        }
    }

    pub fn values(&self, name: &str) -> Vec<f64> {
        self.samples(name).iter().map(|s| s.value).collect()
    }

    pub fn samples(&self, name: &str) -> &[MetricSample] {
        self.series.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn average(&self, name: &str) -> Option<f64> {
        let samples = self.samples(name);
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64)
    }

    pub fn min(&self, name: &str) -> Option<f64> {
        self.samples(name).iter().map(|s| s.value).reduce(f64::min)
    }

    pub fn max(&self, name: &str) -> Option<f64> {
        self.samples(name).iter().map(|s| s.value).reduce(f64::max)
    }

    pub fn latest(&self, name: &str) -> Option<f64> {
        self.samples(name).last().map(|s| s.value)
    }

    /// Stats for every metric with at least one sample.
    pub fn summary(&self) -> BTreeMap<String, MetricSummary> {
        self.series
            .keys()
            .filter_map(|name| {
                let summary = MetricSummary {
                    count: self.samples(name).len(),
                    average: self.average(name)?,
                    min: self.min(name)?,
                    max: self.max(name)?,
                    latest: self.latest(name)?,
                };
                Some((name.clone(), summary))
            })
            .collect()
    }

    /// Clear one metric, or everything when `name` is `None`.
    pub fn clear(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                if let Some(series) = self.series.get_mut(name) {
                    series.clear();
                }
            }
            None => self.series.clear(),
        }
    }
}
