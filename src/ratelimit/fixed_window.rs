//! Fixed window counter.

use std::time::{Duration, Instant};

use super::limiter::{require_nonzero, require_positive, Algorithm, LimiterKind};
use crate::error::Result;

/// Counts admissions in consecutive windows of `window` length.
///
/// Windows are started by calls, not aligned to wall-clock boundaries: the
/// first call at least `window` after the current window opened starts a
/// fresh one at that call. A burst straddling a reset can therefore admit up to
/// `2 * limit` requests in a short span.
#[derive(Debug, Clone)]
pub struct FixedWindowCounter {
    limit: u64,
    window: Duration,
    count: u64,
    window_start: Instant,
}

impl FixedWindowCounter {
    /// Create a counter whose first window opens at `now`.
    pub fn new(limit: u64, window: Duration, now: Instant) -> Result<Self> {
        require_positive("fixed window limit", limit)?;
        require_nonzero("fixed window duration", window)?;

        Ok(Self {
            limit,
            window,
            count: 0,
            window_start: now,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admissions in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window opened.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// When the current window closes, if that instant is representable.
    pub fn reset_at(&self) -> Option<Instant> {
        self.window_start.checked_add(self.window)
    }

    /// Remaining admissions in the current window.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

impl Algorithm for FixedWindowCounter {
    fn kind(&self) -> LimiterKind {
        LimiterKind::FixedWindow
    }

    fn admit(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= self.window {
            self.count = 0;
            self.window_start = now;
        }

        if self.count < self.limit {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_limit_and_window() {
        let now = Instant::now();
        assert!(FixedWindowCounter::new(0, Duration::from_secs(1), now).is_err());
        assert!(FixedWindowCounter::new(5, Duration::ZERO, now).is_err());
    }

    #[test]
    fn test_limit_then_reset() {
        let start = Instant::now();
        let mut counter = FixedWindowCounter::new(2, Duration::from_secs(1), start).unwrap();

        assert!(counter.admit(start));
        assert!(counter.admit(start));
        assert!(!counter.admit(start));
        assert_eq!(counter.count(), 2);
        assert_eq!(counter.remaining(), 0);

        let later = start + Duration::from_secs(1);
        assert!(counter.admit(later));
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.reset_at(), Some(later + Duration::from_secs(1)));
    }

    #[test]
    fn test_rejection_consumes_nothing() {
        let start = Instant::now();
        let mut counter = FixedWindowCounter::new(1, Duration::from_secs(10), start).unwrap();

        assert!(counter.admit(start));
        for _ in 0..5 {
            assert!(!counter.admit(start + Duration::from_secs(1)));
        }
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_burst_across_boundary_admits_twice_the_limit() {
        let start = Instant::now();
        let window = Duration::from_secs(1);
        let mut counter = FixedWindowCounter::new(3, window, start).unwrap();

        let just_before = start + Duration::from_millis(999);
        let at_reset = start + window;

        let admitted = (0..3).filter(|_| counter.admit(just_before)).count()
            + (0..3).filter(|_| counter.admit(at_reset)).count();
        assert_eq!(admitted, 6);
    }

    #[test]
    fn test_window_is_call_driven() {
        let start = Instant::now();
        let window = Duration::from_secs(1);
        let mut counter = FixedWindowCounter::new(1, window, start).unwrap();

        // Idle for a long stretch: the next window starts at the call, not on a grid.
        let late = start + Duration::from_millis(3500);
        assert!(counter.admit(late));
        assert_eq!(counter.window_start(), late);
        assert_eq!(counter.reset_at(), Some(late + window));
        assert!(!counter.admit(late + Duration::from_millis(999)));
    }

    #[test]
    fn test_unbounded_window_never_resets() {
        let start = Instant::now();
        let mut counter = FixedWindowCounter::new(1, Duration::MAX, start).unwrap();
        assert_eq!(counter.reset_at(), None);

        assert!(counter.admit(start));
        assert!(!counter.admit(start + Duration::from_secs(86_400 * 365)));
        assert_eq!(counter.count(), 1);
    }
}
