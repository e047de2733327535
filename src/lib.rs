//! Remote configuration provider for replicated configuration services.
//!
//! Materializes an application's configuration as an in-memory
//! `key -> value` mapping fetched from a set of service replicas, and
//! keeps it fresh:
//! - [`Provider`] - main entry point: load, refresh, published view
//! - [`ProviderBuilder`] - configurable construction
//! - [`RemoteClient`] - capability trait one implementation per replica
//! - [`SettingAdapter`] - pluggable transform chain on publish
//! - [`PushNotification`] - service-push intake accelerating refresh
//!
//! The refresh engine fails over deterministically between replicas on
//! transient errors, gates concurrent refreshes through a single-flight
//! lock, detects changes via etags, and swaps the published mapping
//! atomically.
//!
//! # Basic Usage
//! ```rust,ignore
//! use std::time::Duration;
//! use confsync::{KeyWatcher, Provider, Selector};
//!
//! #[tokio::main]
//! async fn main() -> confsync::Result<()> {
//!     let provider = Provider::builder(vec![primary_client, secondary_client])
//!         .select(Selector::new("app:*", None))
//!         .watch(KeyWatcher::new("app:sentinel", None, Duration::from_secs(30)).refresh_all())
//!         .key_prefix("app:")
//!         .build()?;
//!
//!     provider.load().await?;
//!     println!("timeout = {:?}", provider.get("timeout"));
//!
//!     // Later, on demand:
//!     provider.try_refresh().await?;
//!     Ok(())
//! }
//! ```

mod adapter;
mod backoff;
mod builder;
mod client;
mod engine;
mod errors;
mod failover;
mod options;
mod provider;
mod publish;
mod push;
mod replica;
mod settings;
mod store;
mod utils;
mod watch;

pub use adapter::SettingAdapter;
pub use builder::ProviderBuilder;
pub use client::RemoteClient;
pub use engine::ProviderState;
pub use errors::AdapterError;
pub use errors::ClientError;
pub use errors::Error;
pub use errors::Result;
pub use errors::StartupError;
pub use options::ProviderConfig;
pub use options::RefreshConfig;
pub use options::ReplicaConfig;
pub use options::StartupConfig;
pub use provider::Provider;
pub use push::PushNotification;
pub use replica::Replica;
pub use settings::ChangeKind;
pub use settings::ChangeRecord;
pub use settings::KeyLabelId;
pub use settings::Selector;
pub use settings::Setting;
pub use settings::SettingMapper;
pub use settings::SettingPage;
pub use settings::SnapshotComposition;
pub use settings::SnapshotInfo;
pub use watch::KeyWatcher;
pub use watch::PrefixWatcher;

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
mod backoff_test;
#[cfg(test)]
mod client_test;
#[cfg(test)]
mod utils_test;
#[cfg(test)]
mod watch_test;
