use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{
    TREND_DEGRADING_FACTOR, TREND_IMPROVING_FACTOR, TREND_MIN_POINTS, TREND_WINDOW,
};
use crate::metrics::{MetricRecorder, MetricSummary};
use crate::session::{PerformanceDatapoint, SessionState};

/// Direction of a lower-is-better metric.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Degrading => "degrading",
            Trend::Stable => "stable",
        }
    }

    pub fn classify(recent_mean: f64, older_mean: f64) -> Self {
        if recent_mean < TREND_IMPROVING_FACTOR * older_mean {
            Trend::Improving
        } else if recent_mean > TREND_DEGRADING_FACTOR * older_mean {
            Trend::Degrading
        } else {
            Trend::Stable
        }
    }
}

fn window_mean(window: &[PerformanceDatapoint], metric: &str) -> f64 {
    let sum: f64 = window
        .iter()
        .map(|p| p.metrics.get(metric).copied().unwrap_or(0.0))
        .sum();
    sum / window.len() as f64
}

/// Compare the last `TREND_WINDOW` points with the `TREND_WINDOW` before
/// them. Fewer than `TREND_MIN_POINTS` points yields an empty map.
///
/// Every metric seen in either window gets a verdict; a point that lacks the
/// metric counts as zero.
pub fn trends(history: &[PerformanceDatapoint]) -> BTreeMap<String, Trend> {
    if history.len() < TREND_MIN_POINTS {
        return BTreeMap::new();
    }

    let recent = &history[history.len() - TREND_WINDOW..];
    let older = &history[history.len() - 2 * TREND_WINDOW..history.len() - TREND_WINDOW];

    let names: BTreeSet<&String> = recent
        .iter()
        .chain(older)
        .flat_map(|p| p.metrics.keys())
        .collect();

    names
        .into_iter()
        .map(|name| {
            let trend = Trend::classify(window_mean(recent, name), window_mean(older, name));
            (name.clone(), trend)
        })
        .collect()
}

pub fn insights(trends: &BTreeMap<String, Trend>) -> Vec<String> {
    trends
        .iter()
        .map(|(metric, trend)| match trend {
            Trend::Degrading => format!("{} is degrading - investigate recent changes", metric),
            Trend::Improving => format!("{} is improving - good optimization", metric),
            Trend::Stable => format!("{} is stable", metric),
        })
        .collect()
}

/// Replay the stored history into a recorder, one sample per metric per point.
pub fn history_recorder(history: &[PerformanceDatapoint]) -> MetricRecorder {
    let mut recorder = MetricRecorder::new();
    for point in history {
        for (name, value) in &point.metrics {
            recorder.record_at(name, *value, point.timestamp);
        }
    }
    recorder
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceAnalysis {
    pub trends: BTreeMap<String, Trend>,
    pub baseline: BTreeMap<String, f64>,
    /// Count, average, min, max and latest over the whole history
    pub metrics: BTreeMap<String, MetricSummary>,
    pub data_points: usize,
    pub insights: Vec<String>,
}

impl PerformanceAnalysis {
    pub fn from_session(state: &SessionState) -> Self {
        let trends = trends(&state.performance_history);
        let insights = insights(&trends);
        PerformanceAnalysis {
            trends,
            baseline: state.baseline_metrics.clone(),
            metrics: history_recorder(&state.performance_history).summary(),
            data_points: state.performance_history.len(),
            insights,
        }
    }

    pub fn degrading(&self) -> impl Iterator<Item = &String> {
        self.trends
            .iter()
            .filter(|(_, t)| **t == Trend::Degrading)
            .map(|(name, _)| name)
    }
}
