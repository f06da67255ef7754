//! Remote rate limiting
//!
//! Client-side sliding window that keeps us under a provider's per-minute
//! quota. It never looks at the provider's own headers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};

/// Width of the sliding window
pub const WINDOW: Duration = Duration::from_secs(60);

/// Default admissions per window
pub const DEFAULT_LIMIT: usize = 10;

/// Sliding-window admission control for one remote provider
pub struct RateLimiter {
    name: String,
    limit: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        Self::with_clock(name, limit, Arc::new(SystemClock))
    }

    pub fn with_clock(name: impl Into<String>, limit: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            limit,
            window: WINDOW,
            timestamps: Mutex::new(VecDeque::with_capacity(limit)),
            clock,
        }
    }

    /// Prune expired entries, then record and admit if below the limit
    pub fn admit(&self) -> bool {
        let mut timestamps = self.timestamps.lock();
        // Read the clock under the lock so the deque stays ordered
        let now = self.clock.now();
        prune(&mut timestamps, now, self.window);

        if timestamps.len() >= self.limit {
            tracing::debug!(
                "Rate limit reached for {} ({}/{} in window)",
                self.name, timestamps.len(), self.limit
            );
            return false;
        }

        timestamps.push_back(now);
        tracing::debug!("Rate limit OK for {} ({}/{})", self.name, timestamps.len(), self.limit);
        true
    }

    /// Admissions still inside the window
    #[cfg(test)]
    pub fn in_window(&self) -> usize {
        let mut timestamps = self.timestamps.lock();
        prune(&mut timestamps, self.clock.now(), self.window);
        timestamps.len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
