use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::URGENT_ISSUE_COUNT;
use crate::session::SessionState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueRecord {
    pub fingerprint: String,
    pub text: String,
    pub category: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub count: u32,
}

/// Stable across processes and platforms: sha256 of the UTF-8 text, hex encoded.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Deduplicates issues into the session's issue history.
pub struct IssueTracker<'a> {
    state: &'a mut SessionState,
}

impl<'a> IssueTracker<'a> {
    pub fn new(state: &'a mut SessionState) -> Self {
        Self { state }
    }

    /// Returns the record's count after tracking.
    pub fn track(&mut self, text: &str, category: &str) -> u32 {
        self.track_at(text, category, Utc::now())
    }

    pub fn track_at(&mut self, text: &str, category: &str, now: DateTime<Utc>) -> u32 {
        let fp = fingerprint(text);
        if let Some(existing) = self
            .state
            .historical_issues
            .iter_mut()
            .find(|r| r.fingerprint == fp && r.category == category)
        {
            existing.count += 1;
            existing.last_seen = now;
            return existing.count;
        }

        self.state.historical_issues.push(IssueRecord {
            fingerprint: fp,
            text: text.to_string(),
            category: category.to_string(),
            first_seen: now,
            last_seen: now,
            count: 1,
        });
        1
    }

    /// Records seen at least `min_count` times, in first-seen order.
    pub fn recurring(&self, min_count: u32) -> Vec<IssueRecord> {
        recurring(&self.state.historical_issues, min_count)
    }

    pub fn total_tracked(&self) -> usize {
        self.state.historical_issues.len()
    }
}

pub fn recurring(records: &[IssueRecord], min_count: u32) -> Vec<IssueRecord> {
    records
        .iter()
        .filter(|r| r.count >= min_count)
        .cloned()
        .collect()
}

pub fn by_category(records: &[IssueRecord]) -> BTreeMap<String, Vec<IssueRecord>> {
    let mut grouped: BTreeMap<String, Vec<IssueRecord>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.category.clone())
            .or_default()
            .push(record.clone());
    }
    grouped
}

pub fn recommendations(records: &[IssueRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| {
            if r.count >= URGENT_ISSUE_COUNT {
                format!(
                    "URGENT: '{}' has occurred {} times - needs immediate attention",
                    r.text, r.count
                )
            } else if r.category.to_lowercase().contains("security") {
                format!("Security issue recurring: {}", r.text)
            } else if r.text.to_lowercase().contains("performance") {
                format!("Performance issue: {}", r.text)
            } else {
                format!("Recurring issue: {} (x{})", r.text, r.count)
            }
        })
        .collect()
}
