//! Failover execution across replicas.
//!
//! Runs one logical operation against an ordered replica list. Each
//! replica gets a bounded number of attempts for fail-overable errors
//! before the executor advances to the next endpoint; non-fail-overable
//! errors abort immediately. Every failed attempt increments the
//! replica's failure count, so exhausting the list leaves every tried
//! replica in cooldown.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::backoff::BackoffSchedule;
use crate::errors::ClientError;
use crate::errors::Error;
use crate::errors::Result;
use crate::replica::Replica;
use crate::replica::ReplicaRegistry;

pub(crate) struct FailoverExecutor<'a> {
    registry: &'a ReplicaRegistry,
    schedule: &'a BackoffSchedule,
    max_attempts_per_replica: usize,
    cancel: &'a CancellationToken,
}

impl<'a> FailoverExecutor<'a> {
    pub(crate) fn new(
        registry: &'a ReplicaRegistry,
        schedule: &'a BackoffSchedule,
        max_attempts_per_replica: usize,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            registry,
            schedule,
            max_attempts_per_replica: max_attempts_per_replica.max(1),
            cancel,
        }
    }

    /// Invokes `op` against each replica in order until one attempt
    /// succeeds or the list is exhausted, in which case the last error
    /// is returned. Cancellation is honored between attempts.
    pub(crate) async fn execute<T, F, Fut>(
        &self,
        replicas: &[Arc<Replica>],
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(Arc<Replica>) -> Fut,
        Fut: Future<Output = std::result::Result<T, ClientError>>,
    {
        if replicas.is_empty() {
            return Err(ClientError::Network("no replicas to dispatch to".to_string()).into());
        }

        let mut last_err: Option<ClientError> = None;
        for (index, replica) in replicas.iter().enumerate() {
            if index > 0 {
                warn!(
                    "failing over from {} to {}",
                    replicas[index - 1].endpoint(),
                    replica.endpoint()
                );
            }
            for attempt in 1..=self.max_attempts_per_replica {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                match op(replica.clone()).await {
                    Ok(value) => {
                        self.registry.mark_success(replica, Instant::now());
                        return Ok(value);
                    }
                    Err(err) => {
                        self.registry.mark_failure(replica, Instant::now(), self.schedule);
                        if !err.is_failoverable() {
                            return Err(err.into());
                        }
                        debug!(
                            "attempt {attempt}/{} against {} failed: {err}",
                            self.max_attempts_per_replica,
                            replica.endpoint()
                        );
                        last_err = Some(err);
                        if attempt < self.max_attempts_per_replica {
                            self.sleep(self.schedule.request_delay(attempt as u32)).await?;
                        }
                    }
                }
            }
        }

        // Every replica exhausted its attempt budget and is cooling down.
        Err(last_err
            .unwrap_or_else(|| ClientError::Network("replica list exhausted".to_string()))
            .into())
    }

    async fn sleep(&self, duration: std::time::Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
