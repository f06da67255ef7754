//! Time source
//!
//! Rate windows and token caches read time through [`Clock`] so tests can
//! drive them with a manual clock instead of sleeping.

use std::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
