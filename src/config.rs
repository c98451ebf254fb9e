//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::LimiterConfig;

/// Prefix for environment overrides, e.g. `TURNSTILE__REGISTRY__IDLE_TTL_SECS`.
const ENV_PREFIX: &str = "TURNSTILE";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Turnstile admission core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Whether one limiter serves everyone or each identity gets its own
    #[serde(default)]
    pub mode: GateMode,

    /// Algorithm and parameters of every limiter the gate builds
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Per-identity registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the admission gate applies its limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// A single limiter shared by every caller
    #[default]
    Global,
    /// One limiter per caller identity
    PerIdentity,
}

/// Identity registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Idle time after which a per-identity limiter is forgotten
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,

    /// How often the background sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RegistryConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_idle_ttl() -> u64 {
    180
}

fn default_sweep_interval() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, an optional file, then `TURNSTILE__*` environment
    /// variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults =
            config::Config::try_from(&TurnstileConfig::default()).map_err(config_error)?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: TurnstileConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero limits, intervals and registry timings.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;
        if self.registry.idle_ttl_secs == 0 {
            return Err(TurnstileError::Config(
                "registry.idle_ttl_secs must be positive".to_string(),
            ));
        }
        if self.registry.sweep_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "registry.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn config_error(err: config::ConfigError) -> TurnstileError {
    TurnstileError::Config(err.to_string())
}
