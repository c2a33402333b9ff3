//! Sliding-window rate limiting for outbound tool calls.
//!
//! Each limiter tracks the instants of its recent requests. A request is
//! allowed while fewer than `max_requests` fall inside the window.
//! Tools look up their limiter by name in a shared [`RateLimiterRegistry`],
//! falling back to a `"default"` limiter when no specific one exists.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const MIN_WAIT: Duration = Duration::from_millis(100);

/// Snapshot of a limiter's current load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub max_requests: usize,
    pub window_secs: u64,
    pub current_requests: usize,
    pub available_slots: usize,
    pub utilization_percent: f64,
}

/// A single sliding-window limiter.
///
/// Thread-safe via `std::sync::Mutex` (held briefly, never across awaits).
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn prune(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = requests.front() {
            if now.duration_since(*oldest) >= window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to take a slot. Returns `true` and records the request if the
    /// window has room.
    pub fn acquire(&self) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut requests, now, self.window);

        if requests.len() < self.max_requests {
            requests.push_back(now);
            true
        } else {
            false
        }
    }

    /// How long until the oldest request leaves the window.
    fn time_until_free(&self) -> Duration {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut requests, now, self.window);

        requests
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or_default()
            .max(MIN_WAIT)
    }

    /// Wait until a slot is free and take it. Returns the time spent waiting.
    pub async fn wait_for_slot(&self) -> Duration {
        let started = Instant::now();
        while !self.acquire() {
            let wait = self.time_until_free();
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting for a slot");
            tokio::time::sleep(wait).await;
        }
        started.elapsed()
    }

    pub fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut requests, now, self.window);

        let current = requests.len();
        let utilization_percent = if self.max_requests == 0 {
            100.0
        } else {
            current as f64 / self.max_requests as f64 * 100.0
        };
        RateLimitStats {
            max_requests: self.max_requests,
            window_secs: self.window.as_secs(),
            current_requests: current,
            available_slots: self.max_requests.saturating_sub(current),
            utilization_percent,
        }
    }
}

/// Named limiters shared by every tool in a process.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock limits: 100/min by default, tighter for the network tools.
    pub fn with_common_limits() -> Self {
        Self::new()
            .with_limit("default", 100, Duration::from_secs(60))
            .with_limit("http_client", 60, Duration::from_secs(60))
            .with_limit("website_monitor", 30, Duration::from_secs(60))
    }

    /// Add or replace a limiter.
    pub fn with_limit(mut self, name: impl Into<String>, max_requests: usize, window: Duration) -> Self {
        self.add(name, max_requests, window);
        self
    }

    pub fn add(&mut self, name: impl Into<String>, max_requests: usize, window: Duration) {
        self.limiters
            .insert(name.into(), Arc::new(RateLimiter::new(max_requests, window)));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.limiters.remove(name).is_some()
    }

    /// The limiter registered under `name`, without the default fallback.
    pub fn get(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(name).cloned()
    }

    fn limiter_for(&self, name: &str) -> Option<&Arc<RateLimiter>> {
        self.limiters.get(name).or_else(|| self.limiters.get("default"))
    }

    /// Take a slot for `name`. Unlimited names are always allowed.
    pub fn acquire(&self, name: &str) -> bool {
        self.limiter_for(name).is_none_or(|limiter| limiter.acquire())
    }

    /// Wait for a slot for `name`. Unlimited names never wait.
    pub async fn wait_for_slot(&self, name: &str) -> Duration {
        match self.limiter_for(name) {
            Some(limiter) => limiter.wait_for_slot().await,
            None => Duration::ZERO,
        }
    }

    pub fn all_stats(&self) -> BTreeMap<String, RateLimitStats> {
        self.limiters
            .iter()
            .map(|(name, limiter)| (name.clone(), limiter.stats()))
            .collect()
    }
}
