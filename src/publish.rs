//! Published configuration view.
//!
//! The exposed `key -> value` map is installed through a single
//! reference swap; readers see either the old or the new mapping, never
//! a torn one. Subscribers observe a monotonically increasing reload
//! generation through a watch channel.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::debug;

pub(crate) struct OutputPublisher {
    current: ArcSwap<HashMap<String, String>>,
    reload_tx: watch::Sender<u64>,
}

impl OutputPublisher {
    pub(crate) fn new() -> Self {
        let (reload_tx, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(HashMap::new()),
            reload_tx,
        }
    }

    /// Atomically replaces the exposed mapping and notifies observers.
    pub(crate) fn publish(&self, mapping: HashMap<String, String>) {
        let entries = mapping.len();
        self.current.store(Arc::new(mapping));
        self.reload_tx.send_modify(|generation| *generation += 1);
        debug!("published configuration with {entries} entries");
    }

    /// The current mapping; cheap to call, never blocks writers.
    pub(crate) fn snapshot(&self) -> Arc<HashMap<String, String>> {
        self.current.load_full()
    }

    /// Receiver that observes the reload generation after each publish.
    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.reload_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        *self.reload_tx.borrow()
    }
}
