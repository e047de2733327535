//! Provider configuration with hierarchical override support.
//!
//! Timing and endpoint parameters are plain serde structs loadable from
//! defaults, an optional configuration file, and environment variables.
//! Programmatic pieces (selectors, watchers, adapters, mappers, replica
//! clients) are supplied through [`crate::ProviderBuilder`].

use std::env;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the provider.
///
/// Sources are merged in the following order (later sources override
/// earlier ones):
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with `CONFSYNC__` prefix (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Replica endpoints in preference order (primary first). Purely
    /// informational when clients are supplied to the builder; the
    /// client order is authoritative for dispatch.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Initial load behavior
    #[serde(default)]
    pub startup: StartupConfig,

    /// Refresh gating and post-window backoff
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Per-replica request retry and cooldown
    #[serde(default)]
    pub replica: ReplicaConfig,

    /// Key prefixes stripped from published keys; first match wins,
    /// compared case-insensitively
    #[serde(default)]
    pub key_prefixes: Vec<String>,

    /// Tag refresh operations with tracing spans carrying a request type
    #[serde(default = "default_request_tracing")]
    pub request_tracing: bool,

    /// Fixed RNG seed for jitter and push delays; `None` seeds from
    /// entropy. Injected here so tests stay deterministic.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

/// Initial load timing.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct StartupConfig {
    /// Overall deadline for the blocking initial load (seconds)
    #[serde(default = "default_startup_timeout_secs")]
    pub timeout_secs: u64,

    /// Window after process start during which retry delays follow the
    /// fixed staircase instead of the exponential schedule (seconds)
    #[serde(default = "default_startup_grace_secs")]
    pub grace_window_secs: u64,

    /// Minimum elapsed time before a fatal startup failure propagates,
    /// to dampen orchestrator-driven crash loops (seconds)
    #[serde(default = "default_crash_loop_floor_secs")]
    pub crash_loop_floor_secs: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_startup_timeout_secs(),
            grace_window_secs: default_startup_grace_secs(),
            crash_loop_floor_secs: default_crash_loop_floor_secs(),
        }
    }
}

/// Refresh gating and post-window exponential backoff.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct RefreshConfig {
    /// Poll interval applied when no watcher declares one (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub default_poll_interval_secs: u64,

    /// Minimum post-window retry delay (seconds)
    #[serde(default = "default_min_backoff_secs")]
    pub min_backoff_secs: u64,

    /// Maximum post-window retry delay (seconds)
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Lower bound of the uniform jitter factor; delays are multiplied
    /// by a factor drawn from `[jitter_min, 1.0]`
    #[serde(default = "default_jitter_min")]
    pub jitter_min: f64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            default_poll_interval_secs: default_poll_interval_secs(),
            min_backoff_secs: default_min_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            jitter_min: default_jitter_min(),
        }
    }
}

/// Per-replica request retry budget and failure cooldown.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ReplicaConfig {
    /// Attempts against one replica before advancing to the next
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base delay between in-replica retries (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay between in-replica retries (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Minimum cooldown after a failed attempt (seconds)
    #[serde(default = "default_cooldown_min_secs")]
    pub cooldown_min_secs: u64,

    /// Maximum cooldown however many consecutive failures (seconds)
    #[serde(default = "default_cooldown_max_secs")]
    pub cooldown_max_secs: u64,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            cooldown_min_secs: default_cooldown_min_secs(),
            cooldown_max_secs: default_cooldown_max_secs(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            startup: StartupConfig::default(),
            refresh: RefreshConfig::default(),
            replica: ReplicaConfig::default(),
            key_prefixes: Vec::new(),
            request_tracing: default_request_tracing(),
            rng_seed: None,
        }
    }
}

impl ProviderConfig {
    /// Loads configuration with hierarchical override support.
    ///
    /// # Example
    /// ```ignore
    /// std::env::set_var("CONFSYNC__STARTUP__TIMEOUT_SECS", "30");
    /// let cfg = ProviderConfig::load()?;
    /// ```
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("CONFSYNC")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates all timing parameters.
    ///
    /// # Errors
    /// Returns `Error::Config` when a delay progression is inverted, a
    /// retry budget is zero, or the jitter factor leaves `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        self.startup.validate()?;
        self.refresh.validate()?;
        self.replica.validate()?;
        Ok(())
    }

    pub(crate) fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup.timeout_secs)
    }

    pub(crate) fn crash_loop_floor(&self) -> Duration {
        Duration::from_secs(self.startup.crash_loop_floor_secs)
    }

    pub(crate) fn default_poll_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.default_poll_interval_secs)
    }
}

impl StartupConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "startup: timeout_secs cannot be 0".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

impl RefreshConfig {
    fn validate(&self) -> Result<()> {
        if self.default_poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "refresh: default_poll_interval_secs cannot be 0".to_string(),
            )
            .into());
        }
        if self.min_backoff_secs > self.max_backoff_secs {
            return Err(ConfigError::Message(format!(
                "refresh: min_backoff_secs({}) must not exceed max_backoff_secs({})",
                self.min_backoff_secs, self.max_backoff_secs
            ))
            .into());
        }
        if !(self.jitter_min > 0.0 && self.jitter_min <= 1.0) {
            return Err(ConfigError::Message(format!(
                "refresh: jitter_min({}) must be in (0, 1]",
                self.jitter_min
            ))
            .into());
        }
        Ok(())
    }
}

impl ReplicaConfig {
    fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::Message(
                "replica: max_retries cannot be 0".to_string(),
            )
            .into());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Message(format!(
                "replica: base_delay_ms({}) must not exceed max_delay_ms({})",
                self.base_delay_ms, self.max_delay_ms
            ))
            .into());
        }
        if self.cooldown_min_secs > self.cooldown_max_secs {
            return Err(ConfigError::Message(format!(
                "replica: cooldown_min_secs({}) must not exceed cooldown_max_secs({})",
                self.cooldown_min_secs, self.cooldown_max_secs
            ))
            .into());
        }
        Ok(())
    }
}

fn default_request_tracing() -> bool {
    true
}
fn default_startup_timeout_secs() -> u64 {
    100
}
fn default_startup_grace_secs() -> u64 {
    100
}
fn default_crash_loop_floor_secs() -> u64 {
    5
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_min_backoff_secs() -> u64 {
    30
}
fn default_max_backoff_secs() -> u64 {
    600
}
fn default_jitter_min() -> f64 {
    0.8
}
fn default_max_retries() -> usize {
    3
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
fn default_cooldown_min_secs() -> u64 {
    30
}
fn default_cooldown_max_secs() -> u64 {
    600
}
