//! Remote service client capability.
//!
//! The refresh engine never talks to the wire itself; it consumes this
//! trait. One implementation instance corresponds to one replica
//! endpoint, and the engine drives failover by choosing which
//! instance to invoke.
//!
//! # Implementations
//!
//! Production implementations wrap the configuration service's HTTP
//! client. Tests use the in-memory simulator from `test_utils` or the
//! generated `MockRemoteClient`.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::errors::ClientError;
use crate::settings::ChangeRecord;
use crate::settings::Selector;
use crate::settings::Setting;
use crate::settings::SettingPage;
use crate::settings::SnapshotInfo;

/// Client for one replica of the remote configuration service.
///
/// All operations are async and must be safe for concurrent use. Paged
/// listings are drained by calling `list_page` until `continuation`
/// comes back `None`.
///
/// # Error contract
///
/// Implementations map transport failures onto [`ClientError`]:
/// HTTP statuses become [`ClientError::Status`], request timeouts
/// [`ClientError::Timeout`], socket/DNS faults [`ClientError::Network`],
/// and 401/403 [`ClientError::Auth`]. The engine's failover decisions
/// depend on this mapping.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Endpoint URI this client talks to, e.g. `https://cfg-1.example.net`.
    fn endpoint(&self) -> String;

    /// One page of settings matching `selector`.
    async fn list_page(
        &self,
        selector: Selector,
        continuation: Option<String>,
    ) -> std::result::Result<SettingPage, ClientError>;

    /// Metadata of a server-side snapshot, including its composition.
    async fn get_snapshot(
        &self,
        name: String,
    ) -> std::result::Result<SnapshotInfo, ClientError>;

    /// One page of the named server-side snapshot.
    async fn list_snapshot_page(
        &self,
        name: String,
        continuation: Option<String>,
    ) -> std::result::Result<SettingPage, ClientError>;

    /// Fetch a single setting; `Ok(None)` when the server reports 404.
    async fn get(
        &self,
        key: String,
        label: Option<String>,
    ) -> std::result::Result<Option<Setting>, ClientError>;

    /// Conditional fetch on the known setting's etag.
    ///
    /// Returns `ChangeKind::None` when unchanged, `Modified` with the
    /// fresh setting when the etag differs, and `Deleted` when the
    /// server reports 404 for the watched identity.
    async fn get_if_changed(
        &self,
        known: Setting,
    ) -> std::result::Result<ChangeRecord, ClientError>;
}

/// Drains a paged listing into a vector.
pub(crate) async fn drain_list(
    client: &dyn RemoteClient,
    selector: &Selector,
) -> std::result::Result<Vec<Setting>, ClientError> {
    let mut settings = Vec::new();
    let mut continuation = None;
    loop {
        let page = client.list_page(selector.clone(), continuation).await?;
        settings.extend(page.settings);
        match page.continuation {
            Some(token) => continuation = Some(token),
            None => return Ok(settings),
        }
    }
}

/// Drains a snapshot listing into a vector.
pub(crate) async fn drain_snapshot(
    client: &dyn RemoteClient,
    name: &str,
) -> std::result::Result<Vec<Setting>, ClientError> {
    let mut settings = Vec::new();
    let mut continuation = None;
    loop {
        let page = client.list_snapshot_page(name.to_string(), continuation).await?;
        settings.extend(page.settings);
        match page.continuation {
            Some(token) => continuation = Some(token),
            None => return Ok(settings),
        }
    }
}
