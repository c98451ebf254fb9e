//! Leaky bucket.

use std::time::{Duration, Instant};

use super::limiter::{require_nonzero, require_positive, whole_intervals, Algorithm, LimiterKind};
use crate::error::Result;

/// Accumulated work that drains one unit per `leak_interval`.
///
/// Each admission adds one unit. Once the level reaches `capacity`, calls are
/// rejected until enough whole intervals have drained.
#[derive(Debug, Clone)]
pub struct LeakyBucket {
    capacity: u64,
    level: u64,
    leak_interval: Duration,
    last_leak: Instant,
}

impl LeakyBucket {
    /// Create an empty bucket.
    pub fn new(capacity: u64, leak_interval: Duration, now: Instant) -> Result<Self> {
        require_positive("leaky bucket capacity", capacity)?;
        require_nonzero("leaky bucket leak interval", leak_interval)?;

        Ok(Self {
            capacity,
            level: 0,
            leak_interval,
            last_leak: now,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn level(&self) -> u64 {
        self.level
    }

    pub fn last_leak(&self) -> Instant {
        self.last_leak
    }

    /// Drain the whole intervals elapsed since the last leak.
    pub fn leak(&mut self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_leak);
        let intervals = whole_intervals(elapsed, self.leak_interval);
        if intervals > 0 {
            self.level = self.level.saturating_sub(intervals);
            self.last_leak = now;
        }
        intervals
    }
}

impl Algorithm for LeakyBucket {
    fn kind(&self) -> LimiterKind {
        LimiterKind::LeakyBucket
    }

    fn admit(&mut self, now: Instant) -> bool {
        self.leak(now);

        if self.level < self.capacity {
            self.level += 1;
            true
        } else {
            false
        }
    }
}
