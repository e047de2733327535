//! Core data types exchanged with the remote configuration service.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

/// Ordered transform applied to each selected setting before it enters
/// the mapped store. Returning `None` drops the setting.
pub type SettingMapper = Arc<dyn Fn(Setting) -> Option<Setting> + Send + Sync>;

/// A single configuration setting as served by the remote service.
///
/// Equality for change detection is by `(key, label, etag)`; the value
/// never participates in comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub label: Option<String>,
    pub value: String,
    /// Opaque server token identifying this version of the setting
    pub etag: String,
}

impl Setting {
    pub fn new(
        key: impl Into<String>,
        label: Option<&str>,
        value: impl Into<String>,
        etag: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.map(str::to_string),
            value: value.into(),
            etag: etag.into(),
        }
    }

    /// Identity of this setting as stored by the change detector.
    pub fn id(&self) -> KeyLabelId {
        KeyLabelId::new(&self.key, self.label.as_deref())
    }

    /// Same `(key, label)` identity and same etag.
    pub fn same_version(&self, other: &Setting) -> bool {
        self.id() == other.id() && self.etag == other.etag
    }
}

/// `(key, label)` pair used as a map key.
///
/// An absent label and an empty label normalize to the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyLabelId {
    key: String,
    label: String,
}

impl KeyLabelId {
    pub fn new(key: &str, label: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            label: label.unwrap_or_default().to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Normalized label; empty when the setting carries no label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Label equality with the same normalization as [`KeyLabelId`].
pub fn label_eq(a: Option<&str>, b: Option<&str>) -> bool {
    a.unwrap_or_default() == b.unwrap_or_default()
}

/// Outcome of a conditional fetch against a watched setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    None,
    Modified,
    Deleted,
}

/// A detected change for one `(key, label)` identity.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub key: String,
    pub label: Option<String>,
    /// Fresh server-side setting; present for `Modified`, absent otherwise
    pub current: Option<Setting>,
}

impl ChangeRecord {
    pub fn none(key: &str, label: Option<&str>) -> Self {
        Self {
            kind: ChangeKind::None,
            key: key.to_string(),
            label: label.map(str::to_string),
            current: None,
        }
    }

    pub fn modified(key: &str, label: Option<&str>, current: Setting) -> Self {
        Self {
            kind: ChangeKind::Modified,
            key: key.to_string(),
            label: label.map(str::to_string),
            current: Some(current),
        }
    }

    pub fn deleted(key: &str, label: Option<&str>) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            key: key.to_string(),
            label: label.map(str::to_string),
            current: None,
        }
    }

    pub fn id(&self) -> KeyLabelId {
        KeyLabelId::new(&self.key, self.label.as_deref())
    }
}

/// Server-side filter describing which settings to materialize.
///
/// When `snapshot_name` is present the selector names an immutable
/// server-side snapshot instead of a live key/label filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub key_filter: String,
    pub label_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
}

impl Selector {
    pub fn new(key_filter: impl Into<String>, label_filter: Option<&str>) -> Self {
        Self {
            key_filter: key_filter.into(),
            label_filter: label_filter.map(str::to_string),
            snapshot_name: None,
        }
    }

    pub fn snapshot(name: impl Into<String>) -> Self {
        Self {
            key_filter: String::new(),
            label_filter: None,
            snapshot_name: Some(name.into()),
        }
    }
}

impl Default for Selector {
    /// Selects every setting with no label.
    fn default() -> Self {
        Selector::new("*", None)
    }
}

/// One page of a listing operation.
#[derive(Debug, Clone, Default)]
pub struct SettingPage {
    pub settings: Vec<Setting>,
    /// Opaque continuation; `None` terminates the listing
    pub continuation: Option<String>,
}

/// How a server-side snapshot was composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotComposition {
    /// Each key appears at most once; the only composition the engine accepts
    KeyPartitioned,
    Other(String),
}

/// Metadata of a server-side snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub name: String,
    pub composition: SnapshotComposition,
}
