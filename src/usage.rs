//! Process-wide usage counters.
//!
//! Counters only ever go up. Each key owns an `AtomicU64`, so concurrent
//! increments of the same key are never lost; `Relaxed` ordering is enough
//! because nothing synchronizes on these values.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CounterKey {
    Total,
    Endpoint(&'static str),
    Client(String),
}

pub struct UsageRecorder {
    counts: DashMap<CounterKey, AtomicU64>,
    started: Instant,
    started_at: DateTime<Utc>,
}

/// Point-in-time copy of the counters for reporting.
#[derive(Debug, Clone)]
pub struct UsageSnapshot {
    pub total: u64,
    pub by_endpoint: BTreeMap<String, u64>,
    pub by_client: BTreeMap<String, u64>,
    pub uptime: Duration,
    pub started_at: DateTime<Utc>,
}

impl UsageRecorder {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn record(&self, key: CounterKey) {
        if let Some(counter) = self.counts.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counts
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, key: &CounterKey) -> u64 {
        self.counts
            .get(key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let mut total = 0;
        let mut by_endpoint = BTreeMap::new();
        let mut by_client = BTreeMap::new();
        for entry in &self.counts {
            let value = entry.value().load(Ordering::Relaxed);
            match entry.key() {
                CounterKey::Total => total = value,
                CounterKey::Endpoint(name) => {
                    by_endpoint.insert((*name).to_string(), value);
                }
                CounterKey::Client(id) => {
                    by_client.insert(id.clone(), value);
                }
            }
        }
        UsageSnapshot {
            total,
            by_endpoint,
            by_client,
            uptime: self.uptime(),
            started_at: self.started_at,
        }
    }
}

impl Default for UsageRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders an uptime like `2d 3h 14m`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}d {}h {}m", secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60)
}

#[cfg(test)]
#[path = "usage_test.rs"]
mod tests;
