//! Static limiter parameters and limiter construction.
//!
//! A [`LimiterConfig`] names one algorithm and its parameters. It is the
//! single place limiters are built from, whether for a global gate or for
//! every identity a registry sees.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::fixed_window::FixedWindowCounter;
use super::leaky_bucket::LeakyBucket;
use super::limiter::{Limiter, LimiterKind, LockedLimiter};
use super::sliding_window_counter::SlidingWindowCounter;
use super::sliding_window_log::SlidingWindowLog;
use super::token_bucket::TokenBucket;
use crate::clock::SharedClock;
use crate::error::{Result, TurnstileError};
use crate::metrics::MetricsSink;

/// Algorithm choice and its parameters. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// At most `limit` admissions per call-driven window
    FixedWindow { limit: u64, window_ms: u64 },

    /// Bucketed approximation of a sliding window
    SlidingWindowCounter {
        limit: u64,
        window_ms: u64,
        bucket_count: usize,
        bucket_ms: u64,
    },

    /// Exact sliding window backed by a timestamp log
    SlidingWindowLog { limit: u64, window_ms: u64 },

    /// Starts full, regains one token per interval
    TokenBucket {
        capacity: u64,
        refill_interval_ms: u64,
    },

    /// Starts empty, drains one unit per interval
    LeakyBucket { capacity: u64, leak_interval_ms: u64 },
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig::FixedWindow {
            limit: 100,
            window_ms: 60_000,
        }
    }
}

/// The constructors below store durations as whole milliseconds, truncating
/// any sub-millisecond part: 1.5ms becomes 1ms and 500µs becomes 0. A
/// duration that truncates to zero fails `validate` and `build`.
impl LimiterConfig {
    pub fn fixed_window(limit: u64, window: Duration) -> Self {
        LimiterConfig::FixedWindow {
            limit,
            window_ms: millis(window),
        }
    }

    pub fn sliding_window_counter(
        limit: u64,
        window: Duration,
        bucket_count: usize,
        bucket: Duration,
    ) -> Self {
        LimiterConfig::SlidingWindowCounter {
            limit,
            window_ms: millis(window),
            bucket_count,
            bucket_ms: millis(bucket),
        }
    }

    pub fn sliding_window_log(limit: u64, window: Duration) -> Self {
        LimiterConfig::SlidingWindowLog {
            limit,
            window_ms: millis(window),
        }
    }

    pub fn token_bucket(capacity: u64, refill_interval: Duration) -> Self {
        LimiterConfig::TokenBucket {
            capacity,
            refill_interval_ms: millis(refill_interval),
        }
    }

    pub fn leaky_bucket(capacity: u64, leak_interval: Duration) -> Self {
        LimiterConfig::LeakyBucket {
            capacity,
            leak_interval_ms: millis(leak_interval),
        }
    }

    /// Parse a limiter definition from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig = serde_yaml::from_str(yaml)
            .map_err(|e| {
                TurnstileError::Config(format!("Failed to parse limiter config: {}", e))
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn kind(&self) -> LimiterKind {
        match self {
            LimiterConfig::FixedWindow { .. } => LimiterKind::FixedWindow,
            LimiterConfig::SlidingWindowCounter { .. } => LimiterKind::SlidingWindowCounter,
            LimiterConfig::SlidingWindowLog { .. } => LimiterKind::SlidingWindowLog,
            LimiterConfig::TokenBucket { .. } => LimiterKind::TokenBucket,
            LimiterConfig::LeakyBucket { .. } => LimiterKind::LeakyBucket,
        }
    }

    /// Check every parameter without building anything.
    pub fn validate(&self) -> Result<()> {
        // Constructing against a throwaway instant runs the same checks `build` does.
        let now = std::time::Instant::now();
        match *self {
            LimiterConfig::FixedWindow { limit, window_ms } => {
                FixedWindowCounter::new(limit, Duration::from_millis(window_ms), now).map(drop)
            }
            LimiterConfig::SlidingWindowCounter {
                limit,
                window_ms,
                bucket_count,
                bucket_ms,
            } => SlidingWindowCounter::new(
                limit,
                Duration::from_millis(window_ms),
                bucket_count,
                Duration::from_millis(bucket_ms),
            )
            .map(drop),
            LimiterConfig::SlidingWindowLog { limit, window_ms } => {
                SlidingWindowLog::new(limit, Duration::from_millis(window_ms)).map(drop)
            }
            LimiterConfig::TokenBucket {
                capacity,
                refill_interval_ms,
            } => {
                TokenBucket::new(capacity, Duration::from_millis(refill_interval_ms), now)
                    .map(drop)
            }
            LimiterConfig::LeakyBucket {
                capacity,
                leak_interval_ms,
            } => {
                LeakyBucket::new(capacity, Duration::from_millis(leak_interval_ms), now).map(drop)
            }
        }
    }

    /// Build a limiter that reads `clock` and reports to `metrics`.
    pub fn build(
        &self,
        clock: SharedClock,
        metrics: Arc<MetricsSink>,
    ) -> Result<Arc<dyn Limiter>> {
        let now = clock.now();

        let limiter: Arc<dyn Limiter> = match *self {
            LimiterConfig::FixedWindow { limit, window_ms } => Arc::new(LockedLimiter::new(
                FixedWindowCounter::new(limit, Duration::from_millis(window_ms), now)?,
                clock,
                metrics,
            )),
            LimiterConfig::SlidingWindowCounter {
                limit,
                window_ms,
                bucket_count,
                bucket_ms,
            } => Arc::new(LockedLimiter::new(
                SlidingWindowCounter::new(
                    limit,
                    Duration::from_millis(window_ms),
                    bucket_count,
                    Duration::from_millis(bucket_ms),
                )?,
                clock,
                metrics,
            )),
            LimiterConfig::SlidingWindowLog { limit, window_ms } => Arc::new(LockedLimiter::new(
                SlidingWindowLog::new(limit, Duration::from_millis(window_ms))?,
                clock,
                metrics,
            )),
            LimiterConfig::TokenBucket {
                capacity,
                refill_interval_ms,
            } => Arc::new(LockedLimiter::new(
                TokenBucket::new(capacity, Duration::from_millis(refill_interval_ms), now)?,
                clock,
                metrics,
            )),
            LimiterConfig::LeakyBucket {
                capacity,
                leak_interval_ms,
            } => Arc::new(LockedLimiter::new(
                LeakyBucket::new(capacity, Duration::from_millis(leak_interval_ms), now)?,
                clock,
                metrics,
            )),
        };

        debug!(kind = %self.kind(), config = ?self, "Built limiter");
        Ok(limiter)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn build(config: &LimiterConfig) -> (Arc<dyn Limiter>, Arc<ManualClock>, Arc<MetricsSink>) {
        let clock = Arc::new(ManualClock::new());
        let metrics = Arc::new(MetricsSink::new());
        let limiter = config.build(clock.clone(), metrics.clone()).unwrap();
        (limiter, clock, metrics)
    }

    #[test]
    fn test_parse_token_bucket_yaml() {
        let yaml = r#"
algorithm: token_bucket
capacity: 10
refill_interval_ms: 1000
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config, LimiterConfig::token_bucket(10, Duration::from_secs(1)));
        assert_eq!(config.kind(), LimiterKind::TokenBucket);
    }

    #[test]
    fn test_parse_sliding_window_counter_yaml() {
        let yaml = r#"
algorithm: sliding_window_counter
limit: 100
window_ms: 60000
bucket_count: 60
bucket_ms: 1000
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config,
            LimiterConfig::sliding_window_counter(
                100,
                Duration::from_secs(60),
                60,
                Duration::from_secs(1)
            )
        );
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let err = LimiterConfig::from_yaml("algorithm: gcra\nlimit: 1\n").unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_non_positive_values_are_rejected() {
        let bad = [
            LimiterConfig::fixed_window(0, Duration::from_secs(1)),
            LimiterConfig::fixed_window(1, Duration::ZERO),
            LimiterConfig::sliding_window_counter(
                1,
                Duration::from_secs(1),
                0,
                Duration::from_secs(1),
            ),
            LimiterConfig::sliding_window_log(0, Duration::from_secs(1)),
            LimiterConfig::token_bucket(1, Duration::ZERO),
            LimiterConfig::leaky_bucket(0, Duration::from_secs(1)),
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be invalid", config);
            let metrics = Arc::new(MetricsSink::new());
            assert!(config.build(Arc::new(ManualClock::new()), metrics).is_err());
        }
    }

    #[test]
    fn test_sub_millisecond_durations_truncate() {
        assert_eq!(
            LimiterConfig::token_bucket(1, Duration::from_micros(1500)),
            LimiterConfig::TokenBucket {
                capacity: 1,
                refill_interval_ms: 1,
            }
        );

        let truncated = LimiterConfig::leaky_bucket(1, Duration::from_micros(500));
        assert!(matches!(truncated.validate(), Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_every_variant_caps_admissions_at_one_instant() {
        let configs = [
            LimiterConfig::fixed_window(4, Duration::from_secs(1)),
            LimiterConfig::sliding_window_counter(
                4,
                Duration::from_secs(60),
                1,
                Duration::from_secs(1),
            ),
            LimiterConfig::sliding_window_log(4, Duration::from_secs(1)),
            LimiterConfig::token_bucket(4, Duration::from_secs(1)),
            LimiterConfig::leaky_bucket(4, Duration::from_secs(1)),
        ];

        for config in configs {
            let (limiter, _clock, metrics) = build(&config);
            assert_eq!(limiter.kind(), config.kind());

            let admitted = (0..20).filter(|_| limiter.allow()).count();
            assert_eq!(admitted, 4, "{} admitted too many", config.kind());

            let snapshot = metrics.snapshot();
            assert_eq!(snapshot.admitted, 4);
            assert_eq!(snapshot.rejected, 16);
        }
    }

    #[test]
    fn test_fixed_window_scenario() {
        let (limiter, clock, _) = build(&LimiterConfig::fixed_window(2, Duration::from_secs(1)));

        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow());
    }

    #[test]
    fn test_token_bucket_scenario() {
        let (limiter, clock, _) = build(&LimiterConfig::token_bucket(3, Duration::from_secs(1)));

        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        clock.advance(Duration::from_secs(2));
        assert!(limiter.allow());
    }

    #[test]
    fn test_leaky_bucket_drains_over_time() {
        let (limiter, clock, metrics) =
            build(&LimiterConfig::leaky_bucket(2, Duration::from_millis(100)));

        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        clock.advance(Duration::from_millis(150));
        assert!(limiter.allow());
        assert_eq!(metrics.snapshot().total(), 4);
    }
}
