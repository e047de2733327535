//! Watcher declarations and due-time bookkeeping.
//!
//! Registration (which keys and prefixes to poll) is fixed at provider
//! construction; only the next-due times mutate afterwards. Due times
//! sit behind a short-lived lock because push-notification intake moves
//! them concurrently with an in-flight refresh.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::settings::label_eq;

/// Declares that one `(key, label)` should be polled for changes.
#[derive(Debug, Clone)]
pub struct KeyWatcher {
    pub key: String,
    pub label: Option<String>,
    pub poll_interval: Duration,
    /// Promote any detected change on this watcher to a full reload
    pub refresh_all: bool,
}

impl KeyWatcher {
    pub fn new(key: impl Into<String>, label: Option<&str>, poll_interval: Duration) -> Self {
        Self {
            key: key.into(),
            label: label.map(str::to_string),
            poll_interval,
            refresh_all: false,
        }
    }

    pub fn refresh_all(mut self) -> Self {
        self.refresh_all = true;
        self
    }
}

/// Declares that a key pattern (exact key or `prefix*`) should be
/// polled and its member settings diffed collectively.
#[derive(Debug, Clone)]
pub struct PrefixWatcher {
    pub key_pattern: String,
    pub label: Option<String>,
    pub poll_interval: Duration,
}

impl PrefixWatcher {
    pub fn new(
        key_pattern: impl Into<String>,
        label: Option<&str>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            key_pattern: key_pattern.into(),
            label: label.map(str::to_string),
            poll_interval,
        }
    }
}

/// Matches an exact key or a `prefix*` glob (trailing `*` only).
pub(crate) fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

/// Whether a setting identity falls under a prefix watcher.
pub(crate) fn watcher_covers(pattern: &str, watcher_label: Option<&str>, key: &str, label: Option<&str>) -> bool {
    key_matches(pattern, key) && label_eq(watcher_label, label)
}

struct DueTimes {
    keys: Vec<Instant>,
    prefixes: Vec<Instant>,
}

/// The registered watchers plus their mutable next-due times.
pub(crate) struct WatcherSet {
    keys: Vec<KeyWatcher>,
    prefixes: Vec<PrefixWatcher>,
    default_poll_interval: Duration,
    due: Mutex<DueTimes>,
}

impl WatcherSet {
    /// All watchers start due at `now`; the first successful full load
    /// bumps them onto their own cadence.
    pub(crate) fn new(
        keys: Vec<KeyWatcher>,
        prefixes: Vec<PrefixWatcher>,
        default_poll_interval: Duration,
        now: Instant,
    ) -> Self {
        let due = DueTimes {
            keys: vec![now; keys.len()],
            prefixes: vec![now; prefixes.len()],
        };
        Self {
            keys,
            prefixes,
            default_poll_interval,
            due: Mutex::new(due),
        }
    }

    pub(crate) fn key_watchers(&self) -> &[KeyWatcher] {
        &self.keys
    }

    pub(crate) fn prefix_watchers(&self) -> &[PrefixWatcher] {
        &self.prefixes
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.prefixes.is_empty()
    }

    /// Indexes of watchers whose next-due time has arrived, in
    /// registration order.
    pub(crate) fn expired(&self, now: Instant) -> (Vec<usize>, Vec<usize>) {
        let due = self.due.lock().expect("watcher due times poisoned");
        let keys = due
            .keys
            .iter()
            .enumerate()
            .filter(|(_, at)| **at <= now)
            .map(|(i, _)| i)
            .collect();
        let prefixes = due
            .prefixes
            .iter()
            .enumerate()
            .filter(|(_, at)| **at <= now)
            .map(|(i, _)| i)
            .collect();
        (keys, prefixes)
    }

    /// Pulls every watcher's next-due time to `at`. Push-notification
    /// intake uses this to accelerate the next refresh.
    pub(crate) fn mark_all_due(&self, at: Instant) {
        let mut due = self.due.lock().expect("watcher due times poisoned");
        due.keys.fill(at);
        due.prefixes.fill(at);
    }

    /// Re-arms every watcher onto its own poll cadence from `now`.
    /// Called after a successful full refresh.
    pub(crate) fn bump_all(&self, now: Instant) {
        let mut due = self.due.lock().expect("watcher due times poisoned");
        for (i, watcher) in self.keys.iter().enumerate() {
            due.keys[i] = now + watcher.poll_interval;
        }
        for (i, watcher) in self.prefixes.iter().enumerate() {
            due.prefixes[i] = now + watcher.poll_interval;
        }
    }

    /// Re-arms the given key watchers onto their cadence from `now`.
    pub(crate) fn bump_keys(&self, indexes: &[usize], now: Instant) {
        let mut due = self.due.lock().expect("watcher due times poisoned");
        for &i in indexes {
            due.keys[i] = now + self.keys[i].poll_interval;
        }
    }

    /// Re-arms the given prefix watchers onto their cadence from `now`.
    pub(crate) fn bump_prefixes(&self, indexes: &[usize], now: Instant) {
        let mut due = self.due.lock().expect("watcher due times poisoned");
        for &i in indexes {
            due.prefixes[i] = now + self.prefixes[i].poll_interval;
        }
    }

    /// Effective interval gating refresh attempts: the minimum poll
    /// interval across all watchers, or the configured default when no
    /// watcher is registered.
    pub(crate) fn min_poll_interval(&self) -> Duration {
        self.keys
            .iter()
            .map(|w| w.poll_interval)
            .chain(self.prefixes.iter().map(|w| w.poll_interval))
            .min()
            .unwrap_or(self.default_poll_interval)
    }

    #[cfg(test)]
    pub(crate) fn next_due_key(&self, index: usize) -> Instant {
        self.due.lock().expect("watcher due times poisoned").keys[index]
    }

    #[cfg(test)]
    pub(crate) fn next_due_prefix(&self, index: usize) -> Instant {
        self.due.lock().expect("watcher due times poisoned").prefixes[index]
    }
}
