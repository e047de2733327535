//! Error hierarchy for the configuration provider.
//!
//! Errors are categorized by where they originate: the remote service
//! (`ClientError`), the adapter chain (`AdapterError`), the startup path
//! (`StartupError`), or the provider's own configuration and arguments.
//! The failover loop branches on [`ClientError::is_failoverable`].

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote configuration service failures
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Adapter chain failures (secret resolution, feature processing)
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Initial load termination
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// Provider configuration loading/validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid builder input detected before any network activity
    #[error("Invalid provider options: {0}")]
    InvalidOptions(String),

    /// Malformed caller input (e.g. an incomplete push notification)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The provider's cancellation token fired mid-operation
    #[error("Operation cancelled")]
    Cancelled,
}

/// Failures surfaced by a [`crate::RemoteClient`] implementation.
///
/// The variants mirror the transport-level taxonomy the refresh engine
/// needs: transient statuses and network faults permit advancing to the
/// next replica; authentication and snapshot-shape errors do not.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Non-success HTTP status from the service
    #[error("Service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request did not complete within the client's timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Socket, DNS, or other I/O level failure
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 401/403 from the service
    #[error("Authentication failed with HTTP {status}")]
    Auth { status: u16 },

    /// A server-side snapshot whose composition the engine cannot consume
    #[error("Snapshot '{name}' has composition '{composition}', expected key-partitioned")]
    SnapshotComposition { name: String, composition: String },
}

impl ClientError {
    /// Whether the failover loop may retry this error on another replica.
    ///
    /// HTTP 408, 429, and every 5xx are transient, as are socket-level
    /// faults and request timeouts. Authentication failures and snapshot
    /// composition mismatches are terminal for the whole operation.
    pub fn is_failoverable(&self) -> bool {
        match self {
            ClientError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            ClientError::Timeout(_) | ClientError::Network(_) => true,
            ClientError::Auth { .. } | ClientError::SnapshotComposition { .. } => false,
        }
    }
}

/// Failures raised by a [`crate::SettingAdapter`] while expanding settings.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// A secret reference could not be resolved against its store
    #[error("Secret reference for '{key}' failed: {message}")]
    SecretReference { key: String, message: String },

    /// Any other adapter-specific failure
    #[error("Adapter failure: {0}")]
    Other(String),
}

/// Terminal outcome of the blocking initial load.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The overall startup deadline elapsed; carries every per-attempt error
    #[error("Initial load timed out after {elapsed:?} ({} attempts failed)", attempts.len())]
    Timeout {
        elapsed: Duration,
        attempts: Vec<ClientError>,
    },
}

impl Error {
    /// Error classes that degrade to a warning instead of propagating:
    /// transient and auth failures, adapter failures, startup
    /// aggregates, and cancellation. `try_refresh` maps these to
    /// `Ok(false)`, and an optional initial load swallows them.
    /// Configuration and argument errors always propagate.
    pub(crate) fn is_recoverable(&self) -> bool {
        match self {
            Error::Client(ClientError::SnapshotComposition { .. }) => false,
            Error::Client(_) | Error::Adapter(_) | Error::Startup(_) | Error::Cancelled => true,
            Error::Config(_) | Error::InvalidOptions(_) | Error::InvalidArgument(_) => false,
        }
    }
}
