//! Process-wide admission counters.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// A consistent point-in-time view of the admission counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests that were admitted
    pub admitted: u64,
    /// Requests that were rejected
    pub rejected: u64,
}

impl MetricsSnapshot {
    /// Every decision ever recorded.
    pub fn total(&self) -> u64 {
        self.admitted + self.rejected
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total requests: {}", self.total())?;
        writeln!(f, "Admitted requests: {}", self.admitted)?;
        writeln!(f, "Rejected requests: {}", self.rejected)
    }
}

/// Admitted/rejected counters shared by every limiter of a gate.
///
/// Both counters sit behind one lock so a snapshot never pairs an old
/// `admitted` with a new `rejected`. This lock is independent of any
/// limiter's state lock.
#[derive(Debug, Default)]
pub struct MetricsSink {
    counters: Mutex<MetricsSnapshot>,
}

impl MetricsSink {
    /// Create a sink with both counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.counters.lock().admitted += 1;
    }

    pub fn record_rejected(&self) {
        self.counters.lock().rejected += 1;
    }

    /// Record a decision, returning it unchanged.
    pub fn record(&self, admitted: bool) -> bool {
        let mut counters = self.counters.lock();
        if admitted {
            counters.admitted += 1;
        } else {
            counters.rejected += 1;
        }
        admitted
    }

    /// Read both counters together.
    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.counters.lock()
    }
}
