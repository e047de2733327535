//! Public provider surface.
//!
//! A [`Provider`] materializes remote configuration as an in-memory
//! `key -> value` mapping and keeps it fresh through watcher-driven
//! refresh. Construction goes through [`Provider::builder`]; the
//! returned instance performs its blocking initial load exactly once
//! via [`Provider::load`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::builder::ProviderBuilder;
use crate::engine::ProviderState;
use crate::engine::RefreshEngine;
use crate::errors::Error;
use crate::errors::Result;
use crate::push::process_push;
use crate::push::PushNotification;

/// Remote configuration provider.
///
/// Cheap to clone; clones share the same engine, published mapping,
/// and cancellation token.
#[derive(Clone)]
pub struct Provider {
    engine: Arc<RefreshEngine>,
    /// Whether a failed initial load leaves the provider usable
    optional: bool,
}

impl Provider {
    pub(crate) fn new(engine: Arc<RefreshEngine>, optional: bool) -> Self {
        Self { engine, optional }
    }

    /// Starts provider construction with the given replica clients in
    /// preference order (primary first).
    ///
    /// # Panics
    /// Panics when `clients` is empty.
    pub fn builder(clients: Vec<Arc<dyn crate::RemoteClient>>) -> ProviderBuilder {
        assert!(!clients.is_empty(), "at least one replica client required");
        ProviderBuilder::new(clients)
    }

    /// Blocking initial load across all replicas.
    ///
    /// Call exactly once after construction. Retries with the startup
    /// backoff schedule until the configured deadline; an optional
    /// provider swallows recoverable terminal failures and leaves the
    /// mapping empty, to be recovered by a later [`refresh`](Self::refresh).
    pub async fn load(&self) -> Result<()> {
        if self.engine.status() != ProviderState::Uninitialized {
            return Err(Error::InvalidArgument(
                "load() may only be called once, during provider startup".to_string(),
            ));
        }
        self.engine.initial_load(self.optional).await
    }

    /// On-demand refresh; non-blocking single-flight.
    ///
    /// When another refresh is already in flight this call returns
    /// immediately with success. Honors the provider's cancellation
    /// token at every suspension point.
    pub async fn refresh(&self) -> Result<()> {
        self.engine.refresh().await
    }

    /// Runs [`refresh`](Self::refresh), reporting the recoverable error
    /// classes (transient, auth, adapter, cancellation) as a warning
    /// and `Ok(false)` instead of propagating them.
    pub async fn try_refresh(&self) -> Result<bool> {
        match self.engine.refresh().await {
            Ok(()) => Ok(true),
            Err(err) if err.is_recoverable() => {
                warn!("configuration refresh failed: {err}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Validates and applies a push notification from the service.
    ///
    /// Records the replica's sync token and accelerates the next
    /// refresh by a bounded random delay. Unknown endpoints are logged
    /// and ignored; malformed notifications fail fast.
    pub fn process_push_notification(&self, notification: &PushNotification) -> Result<()> {
        process_push(
            &self.engine.registry,
            &self.engine.watchers,
            &self.engine.schedule,
            notification,
            Instant::now(),
        )
    }

    /// The published mapping. The returned snapshot is immutable;
    /// subsequent refreshes swap in a new one.
    pub fn data(&self) -> Arc<HashMap<String, String>> {
        self.engine.publisher.snapshot()
    }

    /// Looks up one published value, comparing keys case-insensitively
    /// while the mapping itself preserves server casing.
    pub fn get(&self, key: &str) -> Option<String> {
        let data = self.engine.publisher.snapshot();
        if let Some(value) = data.get(key) {
            return Some(value.clone());
        }
        data.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }

    /// Observer registration for post-publish notifications. The
    /// receiver yields a monotonically increasing reload generation.
    pub fn on_reload(&self) -> watch::Receiver<u64> {
        self.engine.publisher.subscribe()
    }

    /// Current lifecycle state, for health checks.
    pub fn state(&self) -> ProviderState {
        self.engine.status()
    }

    /// Token cancelling every in-flight and future operation of this
    /// provider.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.engine.cancel.clone()
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &RefreshEngine {
        &self.engine
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("state", &self.state())
            .finish()
    }
}
