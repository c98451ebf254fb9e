//! Admission gate: resolves the applicable limiter and returns a decision.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::config::{GateMode, TurnstileConfig};
use crate::error::{Result, TurnstileError};
use crate::metrics::{MetricsSink, MetricsSnapshot};
use crate::ratelimit::{Identity, IdentityRegistry, Limiter};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }

    /// HTTP status a transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Decision::Admit => 200,
            Decision::Reject => 429,
        }
    }

    /// Default response body for this decision.
    pub fn message(&self) -> ResponseMessage {
        match self {
            Decision::Admit => ResponseMessage::new(
                "Successful",
                "Hi! You've reached the API. How may I help you?",
            ),
            Decision::Reject => ResponseMessage::new(
                "Request Failed",
                "The API is at capacity, try again later.",
            ),
        }
    }
}

impl From<bool> for Decision {
    fn from(admitted: bool) -> Self {
        if admitted {
            Decision::Admit
        } else {
            Decision::Reject
        }
    }
}

/// JSON body handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseMessage {
    pub status: String,
    pub body: String,
}

impl ResponseMessage {
    pub fn new(status: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            body: body.into(),
        }
    }

    /// Body for a request that failed before any limiter was consulted.
    pub fn server_error(err: &TurnstileError) -> Self {
        Self::new("Request Failed", err.to_string())
    }
}

enum Scope {
    Global(Arc<dyn Limiter>),
    PerIdentity(Arc<IdentityRegistry>),
}

/// Composes a global limiter or a per-identity registry with a metrics sink.
pub struct AdmissionGate {
    scope: Scope,
    metrics: Arc<MetricsSink>,
}

impl AdmissionGate {
    /// One limiter shared by every caller.
    ///
    /// `metrics` should be the sink `limiter` was built with.
    pub fn global(limiter: Arc<dyn Limiter>, metrics: Arc<MetricsSink>) -> Self {
        Self {
            scope: Scope::Global(limiter),
            metrics,
        }
    }

    /// One limiter per caller identity.
    pub fn per_identity(registry: Arc<IdentityRegistry>) -> Self {
        let metrics = registry.metrics().clone();
        Self {
            scope: Scope::PerIdentity(registry),
            metrics,
        }
    }

    /// Build the gate described by `config`.
    pub fn from_config(
        config: &TurnstileConfig,
        clock: SharedClock,
        metrics: Arc<MetricsSink>,
    ) -> Result<Self> {
        match config.mode {
            GateMode::Global => {
                let limiter = config.limiter.build(clock, metrics.clone())?;
                Ok(Self::global(limiter, metrics))
            }
            GateMode::PerIdentity => {
                let registry = IdentityRegistry::new(
                    config.limiter.clone(),
                    config.registry.idle_ttl(),
                    clock,
                    metrics,
                )?;
                Ok(Self::per_identity(Arc::new(registry)))
            }
        }
    }

    /// Decide for one unit of work.
    ///
    /// Global gates ignore `identity`. Per-identity gates require one.
    pub fn decide(&self, identity: Option<&Identity>) -> Result<Decision> {
        let admitted = match &self.scope {
            Scope::Global(limiter) => limiter.allow(),
            Scope::PerIdentity(registry) => {
                let identity = identity.ok_or_else(|| {
                    TurnstileError::Identity(
                        "per-identity gate called without an identity".to_string(),
                    )
                })?;
                registry.allow(identity)?
            }
        };

        let decision = Decision::from(admitted);
        if !admitted {
            debug!(identity = ?identity.map(Identity::as_str), "Request rejected");
        }
        Ok(decision)
    }

    /// Decide for a request arriving from the transport address `peer`.
    ///
    /// In per-identity mode the address is parsed first, and a malformed
    /// address fails without consulting any limiter.
    pub fn decide_peer(&self, peer: &str) -> Result<Decision> {
        match &self.scope {
            Scope::Global(_) => self.decide(None),
            Scope::PerIdentity(_) => {
                let identity = Identity::from_peer_addr(peer).map_err(|err| {
                    warn!(peer = %peer, error = %err, "Could not extract caller identity");
                    err
                })?;
                self.decide(Some(&identity))
            }
        }
    }

    /// The registry behind a per-identity gate.
    pub fn registry(&self) -> Option<&Arc<IdentityRegistry>> {
        match &self.scope {
            Scope::Global(_) => None,
            Scope::PerIdentity(registry) => Some(registry),
        }
    }

    pub fn mode(&self) -> GateMode {
        match self.scope {
            Scope::Global(_) => GateMode::Global,
            Scope::PerIdentity(_) => GateMode::PerIdentity,
        }
    }

    /// Current admitted/rejected counts.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
