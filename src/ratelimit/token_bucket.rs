//! Token bucket.

use std::time::{Duration, Instant};

use super::limiter::{require_nonzero, require_positive, whole_intervals, Algorithm, LimiterKind};
use crate::error::Result;

/// A bucket that starts full and gains one token per `refill_interval`.
///
/// Refill counts whole intervals only. `last_refill` moves to the refill call
/// whenever at least one token is added, and stays put otherwise, so calls
/// arriving faster than the interval never push the next token further away.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u64,
    tokens: u64,
    refill_interval: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: u64, refill_interval: Duration, now: Instant) -> Result<Self> {
        require_positive("token bucket capacity", capacity)?;
        require_nonzero("token bucket refill interval", refill_interval)?;

        Ok(Self {
            capacity,
            tokens: capacity,
            refill_interval,
            last_refill: now,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Add the tokens earned since the last refill, returning how many whole
    /// intervals elapsed.
    pub fn refill(&mut self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let intervals = whole_intervals(elapsed, self.refill_interval);
        if intervals > 0 {
            self.tokens = self.tokens.saturating_add(intervals).min(self.capacity);
            self.last_refill = now;
        }
        intervals
    }
}

impl Algorithm for TokenBucket {
    fn kind(&self) -> LimiterKind {
        LimiterKind::TokenBucket
    }

    fn admit(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}
