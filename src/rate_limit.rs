//! Per-client sliding-window rate limiting.
//!
//! Each client owns its own lockable window of request timestamps, held in
//! a `DashMap` so that one client's admission check never waits on another
//! client's. Admission is check-before-append: a rejected check leaves the
//! window untouched, so retrying while limited does not push the reset
//! further out.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub const DEFAULT_QUIZ_LIMIT: usize = 30;
pub const DEFAULT_TEST_LIMIT: usize = 10;
pub const DEFAULT_WINDOW_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { max_requests, window }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded (max {limit} requests/{window_secs}s), retry in {retry_after_secs}s")]
pub struct RateLimited {
    pub limit: usize,
    pub window_secs: u64,
    pub retry_after_secs: u64,
}

type ClientWindow = Arc<Mutex<VecDeque<Instant>>>;

pub struct RateLimiter {
    windows: DashMap<String, ClientWindow>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self { windows: DashMap::new(), policy }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Admit a request from `client_id` now, or report how long to wait.
    pub fn admit(&self, client_id: &str) -> Result<(), RateLimited> {
        self.admit_at(client_id, Instant::now())
    }

    pub(crate) fn admit_at(&self, client_id: &str, now: Instant) -> Result<(), RateLimited> {
        let window = self.window_for(client_id);
        let mut timestamps = window.lock().unwrap_or_else(PoisonError::into_inner);

        prune_window(&mut timestamps, now, self.policy.window);
        if timestamps.len() >= self.policy.max_requests {
            let wait = timestamps.front().map_or(self.policy.window, |&oldest| {
                self.policy.window.saturating_sub(now.duration_since(oldest))
            });
            return Err(RateLimited {
                limit: self.policy.max_requests,
                window_secs: self.policy.window.as_secs(),
                retry_after_secs: ceil_secs(wait),
            });
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Number of clients that currently have a window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows that have no timestamps left inside the trailing window.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub(crate) fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            // Someone is mid-check on this window.
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let Ok(mut timestamps) = window.try_lock() else {
                return true;
            };
            prune_window(&mut timestamps, now, self.policy.window);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    fn window_for(&self, client_id: &str) -> ClientWindow {
        if let Some(existing) = self.windows.get(client_id) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.windows.entry(client_id.to_string()).or_default().value())
    }
}

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) >= window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
