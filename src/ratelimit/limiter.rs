//! The shared admission contract and its locking wrapper.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::clock::SharedClock;
use crate::error::{Result, TurnstileError};
use crate::metrics::MetricsSink;

/// Which algorithm a limiter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterKind {
    FixedWindow,
    SlidingWindowCounter,
    SlidingWindowLog,
    TokenBucket,
    LeakyBucket,
}

impl LimiterKind {
    /// Stable name, matching the configuration tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterKind::FixedWindow => "fixed_window",
            LimiterKind::SlidingWindowCounter => "sliding_window_counter",
            LimiterKind::SlidingWindowLog => "sliding_window_log",
            LimiterKind::TokenBucket => "token_bucket",
            LimiterKind::LeakyBucket => "leaky_bucket",
        }
    }
}

impl fmt::Display for LimiterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-stream admission decision point.
///
/// Implementations are safe to call concurrently on one instance. Each call
/// decides immediately and records the outcome in the metrics sink the
/// limiter was built with.
pub trait Limiter: Send + Sync {
    /// Admit or reject one unit of work.
    fn allow(&self) -> bool;

    /// The algorithm behind this limiter.
    fn kind(&self) -> LimiterKind;
}

/// State machine of one limiting algorithm.
///
/// `admit` advances the state to `now`, then consumes one unit of capacity
/// if any remains. It must consume nothing when it returns `false`.
pub trait Algorithm: Send + 'static {
    /// Which algorithm this is.
    fn kind(&self) -> LimiterKind;

    /// Advance to `now` and try to take one unit.
    fn admit(&mut self, now: Instant) -> bool;
}

/// Runs an [`Algorithm`] behind a mutex held for the whole decision.
///
/// The clock is read inside the critical section, so successive decisions on
/// one instance always see non-decreasing instants.
pub struct LockedLimiter<A> {
    state: Mutex<A>,
    kind: LimiterKind,
    clock: SharedClock,
    metrics: Arc<MetricsSink>,
}

impl<A: Algorithm> LockedLimiter<A> {
    /// Wrap an algorithm with a clock and the sink its decisions go to.
    pub fn new(algorithm: A, clock: SharedClock, metrics: Arc<MetricsSink>) -> Self {
        Self {
            kind: algorithm.kind(),
            state: Mutex::new(algorithm),
            clock,
            metrics,
        }
    }

    /// Read the algorithm state without deciding anything.
    pub fn inspect<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.state.lock())
    }
}

impl<A: Algorithm> Limiter for LockedLimiter<A> {
    fn allow(&self) -> bool {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let admitted = state.admit(now);
        self.metrics.record(admitted);

        trace!(kind = %self.kind, admitted, "Admission decided");
        admitted
    }

    fn kind(&self) -> LimiterKind {
        self.kind
    }
}

/// Number of whole `interval`s in `elapsed`, truncated toward zero.
pub(crate) fn whole_intervals(elapsed: Duration, interval: Duration) -> u64 {
    let intervals = elapsed.as_nanos() / interval.as_nanos().max(1);
    u64::try_from(intervals).unwrap_or(u64::MAX)
}

pub(crate) fn require_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(TurnstileError::Config(format!("{} must be positive", name)));
    }
    Ok(())
}

pub(crate) fn require_nonzero(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(TurnstileError::Config(format!("{} must be non-zero", name)));
    }
    Ok(())
}
