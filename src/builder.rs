//! Configurable provider construction.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterChain;
use crate::adapter::SettingAdapter;
use crate::backoff::BackoffSchedule;
use crate::client::RemoteClient;
use crate::engine::RefreshEngine;
use crate::errors::Error;
use crate::errors::Result;
use crate::options::ProviderConfig;
use crate::provider::Provider;
use crate::replica::ReplicaRegistry;
use crate::settings::Selector;
use crate::settings::Setting;
use crate::settings::SettingMapper;
use crate::watch::KeyWatcher;
use crate::watch::PrefixWatcher;
use crate::watch::WatcherSet;

/// Builder for [`Provider`].
///
/// # Example
/// ```rust,ignore
/// let provider = Provider::builder(vec![primary, secondary])
///     .select(Selector::new("app:*", None))
///     .watch(KeyWatcher::new("app:sentinel", None, Duration::from_secs(30)).refresh_all())
///     .key_prefix("app:")
///     .build()?;
/// provider.load().await?;
/// ```
pub struct ProviderBuilder {
    clients: Vec<Arc<dyn RemoteClient>>,
    config: ProviderConfig,
    selectors: Vec<Selector>,
    key_watchers: Vec<KeyWatcher>,
    prefix_watchers: Vec<PrefixWatcher>,
    mappers: Vec<SettingMapper>,
    adapters: Vec<Arc<dyn SettingAdapter>>,
    optional: bool,
    cancel: Option<CancellationToken>,
}

impl ProviderBuilder {
    pub(crate) fn new(clients: Vec<Arc<dyn RemoteClient>>) -> Self {
        Self {
            clients,
            config: ProviderConfig::default(),
            selectors: Vec::new(),
            key_watchers: Vec::new(),
            prefix_watchers: Vec::new(),
            mappers: Vec::new(),
            adapters: Vec::new(),
            optional: false,
            cancel: None,
        }
    }

    /// Replaces the whole timing configuration, e.g. one produced by
    /// [`ProviderConfig::load`].
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a selector; selectors apply in order with last-writer-wins
    /// per key. Without any selector everything unlabeled is selected.
    pub fn select(mut self, selector: Selector) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Registers a single-key change watcher.
    pub fn watch(mut self, watcher: KeyWatcher) -> Self {
        self.key_watchers.push(watcher);
        self
    }

    /// Registers a prefix watcher (`prefix*` glob or exact key).
    pub fn watch_prefix(mut self, watcher: PrefixWatcher) -> Self {
        self.prefix_watchers.push(watcher);
        self
    }

    /// Appends a setting mapper; mappers run in registration order and
    /// a `None` return drops the setting.
    pub fn map(mut self, mapper: impl Fn(Setting) -> Option<Setting> + Send + Sync + 'static) -> Self {
        self.mappers.push(Arc::new(mapper));
        self
    }

    /// Appends an adapter to the processing chain.
    pub fn adapter(mut self, adapter: Arc<dyn SettingAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Adds a key prefix stripped from published keys.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefixes.push(prefix.into());
        self
    }

    /// Overall deadline for the blocking initial load.
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.config.startup.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// A provider that tolerates a failed initial load and starts with
    /// an empty mapping.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Enables or disables request-type tracing spans.
    pub fn request_tracing(mut self, enabled: bool) -> Self {
        self.config.request_tracing = enabled;
        self
    }

    /// Fixes the RNG seed used for jitter and push delays.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// External cancellation token; defaults to a fresh one.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validates the configuration and assembles the provider.
    ///
    /// No network activity happens here; call [`Provider::load`] to
    /// perform the initial load.
    pub fn build(self) -> Result<Provider> {
        if self.clients.is_empty() {
            return Err(Error::InvalidOptions(
                "at least one replica client is required".to_string(),
            ));
        }
        self.config.validate()?;
        for watcher in &self.key_watchers {
            if watcher.key.is_empty() {
                return Err(Error::InvalidOptions(
                    "change watcher key cannot be empty".to_string(),
                ));
            }
            if watcher.poll_interval.is_zero() {
                return Err(Error::InvalidOptions(format!(
                    "change watcher '{}' has a zero poll interval",
                    watcher.key
                )));
            }
        }
        for watcher in &self.prefix_watchers {
            if watcher.key_pattern.is_empty() {
                return Err(Error::InvalidOptions(
                    "prefix watcher pattern cannot be empty".to_string(),
                ));
            }
            if watcher.poll_interval.is_zero() {
                return Err(Error::InvalidOptions(format!(
                    "prefix watcher '{}' has a zero poll interval",
                    watcher.key_pattern
                )));
            }
        }

        let registry = ReplicaRegistry::new(self.clients);
        let watchers = WatcherSet::new(
            self.key_watchers,
            self.prefix_watchers,
            self.config.default_poll_interval(),
            Instant::now(),
        );
        let schedule = BackoffSchedule::new(
            self.config.startup,
            self.config.refresh,
            self.config.replica,
            self.config.rng_seed,
        );
        let engine = RefreshEngine::new(
            self.config,
            self.selectors,
            self.mappers,
            registry,
            watchers,
            AdapterChain::new(self.adapters),
            schedule,
            self.cancel.unwrap_or_default(),
        );
        Ok(Provider::new(Arc::new(engine), self.optional))
    }
}
