//! Setting transformation chain.
//!
//! Adapters turn raw settings into the entries the application sees:
//! a secret-reference adapter resolves references against a secret
//! store, a feature-flag adapter fans one setting out into several
//! published entries, and so on. The chain order is fixed at
//! construction; the first adapter that claims a setting processes it.

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::errors::AdapterError;
use crate::settings::Setting;

/// A single transform in the adapter chain.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SettingAdapter: Send + Sync {
    /// Whether this adapter handles the given setting.
    fn can_process(&self, setting: &Setting) -> bool;

    /// Expands one setting into zero or more published entries.
    ///
    /// Processing may perform I/O (e.g. secret resolution); failures
    /// surface as [`AdapterError`] and are retried on the next refresh
    /// while [`needs_refresh`](Self::needs_refresh) stays true.
    async fn process(
        &self,
        setting: &Setting,
    ) -> std::result::Result<Vec<(String, String)>, AdapterError>;

    /// Drops cached state for one setting, or everything when `None`.
    fn invalidate<'a>(&self, setting: Option<&'a Setting>);

    /// Whether this adapter wants the next refresh to republish even
    /// without detected setting changes.
    fn needs_refresh(&self) -> bool;
}

/// Ordered adapter chain applied to every mapped setting on publish.
#[derive(Clone, Default)]
pub(crate) struct AdapterChain {
    adapters: Vec<Arc<dyn SettingAdapter>>,
}

impl AdapterChain {
    pub(crate) fn new(adapters: Vec<Arc<dyn SettingAdapter>>) -> Self {
        Self { adapters }
    }

    /// Expands a setting through the first claiming adapter, or the
    /// default singleton `(key, value)` when none claims it.
    pub(crate) async fn expand(
        &self,
        setting: &Setting,
    ) -> std::result::Result<Vec<(String, String)>, AdapterError> {
        for adapter in &self.adapters {
            if adapter.can_process(setting) {
                return adapter.process(setting).await;
            }
        }
        Ok(vec![(setting.key.clone(), setting.value.clone())])
    }

    /// Per-entry invalidation when `setting` is present, global when
    /// absent. Forwarded to every adapter.
    pub(crate) fn invalidate(&self, setting: Option<&Setting>) {
        for adapter in &self.adapters {
            adapter.invalidate(setting);
        }
    }

    /// True when any adapter requests a republish.
    pub(crate) fn needs_refresh(&self) -> bool {
        self.adapters.iter().any(|a| a.needs_refresh())
    }
}
