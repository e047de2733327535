//! Replica endpoints and their health bookkeeping.
//!
//! The registry owns one [`Replica`] per configured endpoint, in the
//! caller's preference order (primary first). Health state sits behind
//! a short-lived lock because push-notification intake records sync
//! tokens concurrently with an in-flight refresh.

use std::sync::Arc;
use std::sync::Mutex;

use tokio::time::Instant;
use tracing::debug;

use crate::backoff::BackoffSchedule;
use crate::client::RemoteClient;
use crate::utils::host_eq;
use crate::utils::normalize_endpoint;

#[derive(Debug, Default)]
struct ReplicaHealth {
    sync_token: Option<String>,
    consecutive_failures: u32,
    backoff_until: Option<Instant>,
}

/// One endpoint of the replicated configuration service.
pub struct Replica {
    client: Arc<dyn RemoteClient>,
    endpoint: String,
    health: Mutex<ReplicaHealth>,
}

impl Replica {
    pub(crate) fn new(client: Arc<dyn RemoteClient>) -> Self {
        let endpoint = normalize_endpoint(&client.endpoint());
        Self {
            client,
            endpoint,
            health: Mutex::new(ReplicaHealth::default()),
        }
    }

    pub(crate) fn client(&self) -> &dyn RemoteClient {
        self.client.as_ref()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Latest sync token received for this replica, if any. Client
    /// implementations attach it to subsequent requests as a freshness
    /// hint.
    pub fn sync_token(&self) -> Option<String> {
        self.health.lock().expect("replica health poisoned").sync_token.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.health
            .lock()
            .expect("replica health poisoned")
            .consecutive_failures
    }

    pub(crate) fn backoff_until(&self) -> Option<Instant> {
        self.health.lock().expect("replica health poisoned").backoff_until
    }

    pub(crate) fn is_available(&self, now: Instant) -> bool {
        match self.backoff_until() {
            Some(until) => until <= now,
            None => true,
        }
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Tracks every replica's health and orders them for dispatch.
pub(crate) struct ReplicaRegistry {
    replicas: Vec<Arc<Replica>>,
}

impl ReplicaRegistry {
    pub(crate) fn new(clients: Vec<Arc<dyn RemoteClient>>) -> Self {
        let replicas = clients.into_iter().map(|c| Arc::new(Replica::new(c))).collect();
        Self { replicas }
    }

    /// Every replica in preference order, cooldowns ignored. The
    /// initial load probes all of them.
    pub(crate) fn all(&self) -> Vec<Arc<Replica>> {
        self.replicas.clone()
    }

    /// Replicas whose cooldown has elapsed, in preference order.
    pub(crate) fn available(&self, now: Instant) -> Vec<Arc<Replica>> {
        self.replicas
            .iter()
            .filter(|r| r.is_available(now))
            .cloned()
            .collect()
    }

    /// Resets failure state after a successful operation.
    pub(crate) fn mark_success(&self, replica: &Replica, now: Instant) {
        let mut health = replica.health.lock().expect("replica health poisoned");
        health.consecutive_failures = 0;
        health.backoff_until = Some(now);
    }

    /// Records a failed attempt and places the replica in cooldown.
    pub(crate) fn mark_failure(
        &self,
        replica: &Replica,
        now: Instant,
        schedule: &BackoffSchedule,
    ) {
        let mut health = replica.health.lock().expect("replica health poisoned");
        health.consecutive_failures += 1;
        let cooldown = schedule.replica_cooldown(health.consecutive_failures);
        health.backoff_until = Some(now + cooldown);
        debug!(
            "replica {} failed {} time(s), cooling down for {:?}",
            replica.endpoint, health.consecutive_failures, cooldown
        );
    }

    /// Records a sync token for the replica whose endpoint host matches
    /// `resource_uri`. Returns false when no replica matches; the
    /// caller treats that as a foreign notification and ignores it.
    pub(crate) fn update_sync_token(&self, resource_uri: &str, token: &str) -> bool {
        for replica in &self.replicas {
            if host_eq(&replica.endpoint, resource_uri) {
                let mut health = replica.health.lock().expect("replica health poisoned");
                health.sync_token = Some(token.to_string());
                return true;
            }
        }
        false
    }

    #[cfg(test)]
    pub(crate) fn replica_at(&self, index: usize) -> Arc<Replica> {
        self.replicas[index].clone()
    }
}
