//! Last-known settings state.
//!
//! Not synchronized by itself; every mutation happens under the refresh
//! engine's single-flight gate. `watched` holds the baselines used for
//! change detection, `mapped` holds the post-mapper settings the
//! publisher derives the exposed dictionary from.

use std::collections::HashMap;

use crate::settings::KeyLabelId;
use crate::settings::Setting;
use crate::watch::watcher_covers;

/// Last-known mapped and watched settings.
#[derive(Debug, Default)]
pub(crate) struct SettingStore {
    /// Change-detection baselines by `(key, label)` identity
    watched: HashMap<KeyLabelId, Setting>,
    /// Selected settings after mapper application, keyed
    /// case-insensitively; the stored setting preserves server casing
    mapped: HashMap<String, Setting>,
}

impl SettingStore {
    pub(crate) fn new(
        watched: HashMap<KeyLabelId, Setting>,
        mapped: HashMap<String, Setting>,
    ) -> Self {
        Self { watched, mapped }
    }

    pub(crate) fn watched(&self, id: &KeyLabelId) -> Option<&Setting> {
        self.watched.get(id)
    }

    pub(crate) fn insert_watched(&mut self, id: KeyLabelId, setting: Setting) {
        self.watched.insert(id, setting);
    }

    pub(crate) fn remove_watched(&mut self, id: &KeyLabelId) -> Option<Setting> {
        self.watched.remove(id)
    }

    /// Watched entries covered by a prefix watcher's pattern and label.
    pub(crate) fn watched_matching(
        &self,
        pattern: &str,
        label: Option<&str>,
    ) -> Vec<(KeyLabelId, Setting)> {
        self.watched
            .iter()
            .filter(|(id, _)| {
                watcher_covers(pattern, label, id.key(), Some(id.label()))
            })
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    }

    pub(crate) fn insert_mapped(&mut self, setting: Setting) {
        self.mapped.insert(mapped_key(&setting.key), setting);
    }

    pub(crate) fn remove_mapped(&mut self, key: &str) -> Option<Setting> {
        self.mapped.remove(&mapped_key(key))
    }

    pub(crate) fn mapped_values(&self) -> impl Iterator<Item = &Setting> {
        self.mapped.values()
    }

    #[cfg(test)]
    pub(crate) fn mapped_len(&self) -> usize {
        self.mapped.len()
    }

    #[cfg(test)]
    pub(crate) fn get_mapped(&self, key: &str) -> Option<&Setting> {
        self.mapped.get(&mapped_key(key))
    }

    #[cfg(test)]
    pub(crate) fn watched_len(&self) -> usize {
        self.watched.len()
    }
}

/// Case-insensitive lookup key for the mapped table.
pub(crate) fn mapped_key(key: &str) -> String {
    key.to_ascii_lowercase()
}
