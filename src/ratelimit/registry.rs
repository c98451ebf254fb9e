//! Per-identity limiters with idle expiry.

use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use super::identity::Identity;
use super::limiter::Limiter;
use super::rules::LimiterConfig;
use crate::clock::SharedClock;
use crate::error::{Result, TurnstileError};
use crate::metrics::MetricsSink;

struct Entry {
    limiter: Arc<dyn Limiter>,
    last_access: Instant,
}

/// Lazily creates one limiter per identity and forgets idle ones.
///
/// Entries are created on first contact from the registry's [`LimiterConfig`]
/// and removed by [`sweep`](Self::sweep) once unused for longer than the idle
/// TTL. A limiter is never shared between identities, so exhausting one
/// identity has no effect on another.
///
/// Lookups and sweeps both go through the map's shard locks. A decision made
/// with [`allow`](Self::allow) holds its entry for the whole call, so a
/// concurrent sweep cannot remove an entry between lookup and use.
pub struct IdentityRegistry {
    entries: DashMap<Identity, Entry>,
    limiter_config: LimiterConfig,
    idle_ttl: Duration,
    clock: SharedClock,
    metrics: Arc<MetricsSink>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    ///
    /// The limiter configuration is validated here so that creating an entry
    /// later cannot fail on bad parameters.
    pub fn new(
        limiter_config: LimiterConfig,
        idle_ttl: Duration,
        clock: SharedClock,
        metrics: Arc<MetricsSink>,
    ) -> Result<Self> {
        limiter_config.validate()?;
        if idle_ttl.is_zero() {
            return Err(TurnstileError::Config(
                "registry idle TTL must be non-zero".to_string(),
            ));
        }

        info!(
            kind = %limiter_config.kind(),
            idle_ttl = ?idle_ttl,
            "Identity registry created"
        );

        Ok(Self {
            entries: DashMap::new(),
            limiter_config,
            idle_ttl,
            clock,
            metrics,
        })
    }

    /// Get the limiter for `identity`, creating it on first contact.
    ///
    /// Marks the entry as used now.
    pub fn resolve(&self, identity: &Identity) -> Result<Arc<dyn Limiter>> {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(identity.clone())
            .or_try_insert_with(|| self.new_entry(identity, now))?;
        entry.last_access = now;
        Ok(entry.limiter.clone())
    }

    /// Resolve `identity` and decide, as one step with respect to sweeps.
    pub fn allow(&self, identity: &Identity) -> Result<bool> {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(identity.clone())
            .or_try_insert_with(|| self.new_entry(identity, now))?;
        entry.last_access = now;

        let admitted = entry.limiter.allow();
        trace!(identity = %identity, admitted, "Per-identity decision");
        Ok(admitted)
    }

    /// Remove every entry unused for longer than `idle_ttl` as of `now`.
    ///
    /// Returns how many entries were removed.
    pub fn sweep(&self, idle_ttl: Duration, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|identity, entry| {
            let keep = now.saturating_duration_since(entry.last_access) <= idle_ttl;
            if !keep {
                trace!(identity = %identity, "Evicting idle limiter");
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Swept idle identities");
        }
        removed
    }

    /// Sweep with the configured TTL at the clock's current time.
    pub fn sweep_expired(&self) -> usize {
        self.sweep(self.idle_ttl, self.clock.now())
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` on the
    /// current tokio runtime.
    ///
    /// The task holds only a weak reference and ends once the registry is
    /// dropped. Abort the returned handle to stop it earlier.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> Result<JoinHandle<()>> {
        if interval.is_zero() {
            return Err(TurnstileError::Config(
                "sweep interval must be non-zero".to_string(),
            ));
        }

        let registry: Weak<Self> = Arc::downgrade(&self);
        drop(self);

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    debug!("Registry dropped, stopping sweeper");
                    break;
                };
                registry.sweep_expired();
            }
        }))
    }

    /// Number of identities currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    pub fn limiter_config(&self) -> &LimiterConfig {
        &self.limiter_config
    }

    /// The sink every per-identity limiter reports to.
    pub fn metrics(&self) -> &Arc<MetricsSink> {
        &self.metrics
    }

    fn new_entry(&self, identity: &Identity, now: Instant) -> Result<Entry> {
        debug!(
            identity = %identity,
            kind = %self.limiter_config.kind(),
            "Creating limiter for new identity"
        );
        let limiter = self
            .limiter_config
            .build(self.clock.clone(), self.metrics.clone())?;
        Ok(Entry {
            limiter,
            last_access: now,
        })
    }
}
