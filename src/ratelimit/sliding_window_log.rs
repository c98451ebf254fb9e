//! Exact sliding window over a log of admission timestamps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::limiter::{require_nonzero, require_positive, Algorithm, LimiterKind};
use crate::error::Result;

/// Keeps the instant of every admission still inside the trailing window.
///
/// Storage is bounded by `limit`. Each call pays for the entries it evicts.
#[derive(Debug, Clone)]
pub struct SlidingWindowLog {
    limit: u64,
    window: Duration,
    /// Oldest first.
    log: VecDeque<Instant>,
}

impl SlidingWindowLog {
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        require_positive("sliding log limit", limit)?;
        require_nonzero("sliding log window", window)?;

        Ok(Self {
            limit,
            window,
            log: VecDeque::new(),
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of retained admissions.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// The oldest retained admission, if any.
    pub fn oldest(&self) -> Option<Instant> {
        self.log.front().copied()
    }

    /// Drop every entry that is `window` or more behind `now`.
    fn evict(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some(&oldest) = self.log.front() {
            if now.saturating_duration_since(oldest) < self.window {
                break;
            }
            self.log.pop_front();
            evicted += 1;
        }
        evicted
    }
}

impl Algorithm for SlidingWindowLog {
    fn kind(&self) -> LimiterKind {
        LimiterKind::SlidingWindowLog
    }

    fn admit(&mut self, now: Instant) -> bool {
        self.evict(now);

        if (self.log.len() as u64) < self.limit {
            self.log.push_back(now);
            true
        } else {
            false
        }
    }
}
