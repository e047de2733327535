//! Push-notification intake.
//!
//! A push notification is a hint from the service that something
//! changed; it never carries the change itself. Intake validates the
//! notification, records the replica's sync token, and pulls every
//! watcher's due time forward by a bounded random delay so that a fleet
//! of consuming processes does not stampede the service at once.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::backoff::BackoffSchedule;
use crate::errors::Error;
use crate::errors::Result;
use crate::replica::ReplicaRegistry;
use crate::watch::WatcherSet;

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// An event pushed by the remote configuration service.
#[derive(Debug, Clone)]
pub struct PushNotification {
    /// Freshness hint to attach to subsequent requests to the replica
    pub sync_token: String,
    /// Server-side event kind, e.g. `Modified` or `Deleted`
    pub event_type: String,
    /// URI of the replica that emitted the event
    pub resource_uri: String,
    /// Upper bound of the randomized acceleration delay
    pub max_delay: Option<Duration>,
}

/// Validates and applies one push notification.
///
/// Unknown endpoints leave all state untouched. Missing fields fail
/// fast with [`Error::InvalidArgument`].
pub(crate) fn process_push(
    registry: &ReplicaRegistry,
    watchers: &WatcherSet,
    schedule: &BackoffSchedule,
    notification: &PushNotification,
    now: Instant,
) -> Result<()> {
    if notification.sync_token.is_empty() {
        return Err(Error::InvalidArgument(
            "push notification is missing a sync token".to_string(),
        ));
    }
    if notification.event_type.is_empty() {
        return Err(Error::InvalidArgument(
            "push notification is missing an event type".to_string(),
        ));
    }
    if notification.resource_uri.is_empty() {
        return Err(Error::InvalidArgument(
            "push notification is missing a resource URI".to_string(),
        ));
    }

    if !registry.update_sync_token(&notification.resource_uri, &notification.sync_token) {
        warn!(
            "push notification from unknown endpoint {} ignored",
            notification.resource_uri
        );
        return Ok(());
    }

    let max_delay = notification.max_delay.unwrap_or(DEFAULT_MAX_DELAY);
    let delay = schedule.push_delay(max_delay);
    watchers.mark_all_due(now + delay);
    debug!(
        "push notification ({}) accepted from {}, watchers due in {:?}",
        notification.event_type, notification.resource_uri, delay
    );
    Ok(())
}
