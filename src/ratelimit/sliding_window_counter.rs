//! Bucketed sliding window approximation.

use std::time::{Duration, Instant};

use super::limiter::{require_nonzero, require_positive, Algorithm, LimiterKind};
use crate::error::{Result, TurnstileError};

/// Approximates a sliding window with a ring of counting buckets.
///
/// Bucket `i` sits `i * bucket_duration` behind the write position. Any
/// bucket whose offset exceeds the window is cleared on every call. A call is
/// admitted when the bucket at `current_index` is below `limit`.
///
/// A rejection rotates `current_index` to the next bucket. Under sustained
/// overload this is what lets the approximation decay, so successive
/// rejections walk the ring instead of pinning one full bucket.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    limit: u64,
    window: Duration,
    bucket_duration: Duration,
    buckets: Vec<u64>,
    current_index: usize,
    /// First bucket index whose offset lies outside the window.
    expired_from: usize,
}

impl SlidingWindowCounter {
    pub fn new(
        limit: u64,
        window: Duration,
        bucket_count: usize,
        bucket_duration: Duration,
    ) -> Result<Self> {
        require_positive("sliding window limit", limit)?;
        require_nonzero("sliding window duration", window)?;
        require_nonzero("sliding window bucket duration", bucket_duration)?;
        if bucket_count == 0 {
            return Err(TurnstileError::Config(
                "sliding window bucket count must be positive".to_string(),
            ));
        }

        let expired_from = (0..bucket_count)
            .find(|&i| bucket_offset(bucket_duration, i) > window)
            .unwrap_or(bucket_count);

        Ok(Self {
            limit,
            window,
            bucket_duration,
            buckets: vec![0; bucket_count],
            current_index: 0,
            expired_from,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn bucket_duration(&self) -> Duration {
        self.bucket_duration
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// The bucket new admissions are written to.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Sum of the buckets that lie inside the window.
    pub fn estimated_count(&self) -> u64 {
        self.buckets[..self.expired_from].iter().sum()
    }

    fn expire(&mut self) {
        for bucket in &mut self.buckets[self.expired_from..] {
            *bucket = 0;
        }
    }
}

fn bucket_offset(bucket_duration: Duration, index: usize) -> Duration {
    bucket_duration.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}

impl Algorithm for SlidingWindowCounter {
    fn kind(&self) -> LimiterKind {
        LimiterKind::SlidingWindowCounter
    }

    // Expiry is decided by bucket offset relative to the call, so `now`
    // itself never enters the arithmetic.
    fn admit(&mut self, _now: Instant) -> bool {
        self.expire();

        let current = &mut self.buckets[self.current_index];
        if *current < self.limit {
            *current += 1;
            return true;
        }

        self.current_index = (self.current_index + 1) % self.buckets.len();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(
        limit: u64,
        window_secs: u64,
        buckets: usize,
        bucket_secs: u64,
    ) -> SlidingWindowCounter {
        SlidingWindowCounter::new(
            limit,
            Duration::from_secs(window_secs),
            buckets,
            Duration::from_secs(bucket_secs),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_configuration() {
        let second = Duration::from_secs(1);
        assert!(SlidingWindowCounter::new(0, second, 2, second).is_err());
        assert!(SlidingWindowCounter::new(1, Duration::ZERO, 2, second).is_err());
        assert!(SlidingWindowCounter::new(1, second, 0, second).is_err());
        assert!(SlidingWindowCounter::new(1, second, 2, Duration::ZERO).is_err());
    }

    #[test]
    fn test_limit_per_bucket() {
        let now = Instant::now();
        let mut swc = counter(2, 60, 2, 1);

        assert!(swc.admit(now));
        assert!(swc.admit(now));
        assert!(!swc.admit(now));
        assert_eq!(swc.buckets(), &[2, 0]);
    }

    #[test]
    fn test_rejection_rotates_write_bucket() {
        let now = Instant::now();
        let mut swc = counter(2, 60, 2, 1);

        swc.admit(now);
        swc.admit(now);
        assert_eq!(swc.current_index(), 0);

        assert!(!swc.admit(now));
        assert_eq!(swc.current_index(), 1);

        // The next bucket is empty, so the following call is admitted.
        assert!(swc.admit(now + Duration::from_secs(2)));
        assert_eq!(swc.buckets(), &[2, 1]);
        assert_eq!(swc.estimated_count(), 3);
    }

    #[test]
    fn test_rotation_wraps_and_rejects_when_every_bucket_is_full() {
        let now = Instant::now();
        let mut swc = counter(1, 60, 3, 1);

        let admitted = (0..10).filter(|_| swc.admit(now)).count();
        assert_eq!(admitted, 3);
        assert_eq!(swc.buckets(), &[1, 1, 1]);

        // Three more rejections walk all the way round the ring.
        let index = swc.current_index();
        for _ in 0..3 {
            assert!(!swc.admit(now));
        }
        assert_eq!(swc.current_index(), index);
    }

    #[test]
    fn test_buckets_beyond_window_are_zeroed() {
        let now = Instant::now();
        // Offsets are 0s, 1s, 2s, 3s against a 1s window: buckets 2 and 3 expire.
        let mut swc = counter(1, 1, 4, 1);

        assert!(swc.admit(now));
        assert!(!swc.admit(now));
        assert!(swc.admit(now));
        assert_eq!(swc.buckets(), &[1, 1, 0, 0]);

        assert!(!swc.admit(now));
        assert_eq!(swc.current_index(), 2);
        assert!(swc.admit(now));
        assert_eq!(swc.buckets(), &[1, 1, 1, 0]);
        assert_eq!(swc.estimated_count(), 2);

        // Bucket 2 is out of the window and cleared before the next decision.
        assert!(swc.admit(now));
        assert_eq!(swc.buckets(), &[1, 1, 1, 0]);
    }
}
