//! Refresh orchestration.
//!
//! The engine owns the provider's mutable state and drives both the
//! blocking initial load and the incremental refresh path. All store
//! mutation happens behind a single-flight gate: a non-blocking
//! try-acquire on the state lock. Concurrent refresh callers that lose
//! the race observe an immediate no-op success.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::field;
use tracing::info_span;
use tracing::warn;
use tracing::Instrument;

use crate::adapter::AdapterChain;
use crate::backoff::BackoffSchedule;
use crate::client::drain_list;
use crate::client::drain_snapshot;
use crate::errors::ClientError;
use crate::errors::Error;
use crate::errors::Result;
use crate::errors::StartupError;
use crate::failover::FailoverExecutor;
use crate::options::ProviderConfig;
use crate::publish::OutputPublisher;
use crate::replica::Replica;
use crate::replica::ReplicaRegistry;
use crate::settings::ChangeKind;
use crate::settings::ChangeRecord;
use crate::settings::KeyLabelId;
use crate::settings::Selector;
use crate::settings::Setting;
use crate::settings::SettingMapper;
use crate::settings::SnapshotComposition;
use crate::store::mapped_key;
use crate::store::SettingStore;
use crate::utils::PassTimer;
use crate::watch::WatcherSet;

/// Lifecycle of one provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Uninitialized,
    Loading,
    Ready,
    Refreshing,
    /// Optional initial load failed; `refresh` may still recover
    Failed,
}

struct EngineState {
    /// `None` until the first successful full load
    store: Option<SettingStore>,
    /// Gate on re-running the initial load from the refresh path
    init_retry_not_before: Option<Instant>,
}

/// Result of one full load against a single replica.
struct LoadedState {
    watched: HashMap<KeyLabelId, Setting>,
    mapped: HashMap<String, Setting>,
}

#[derive(Clone)]
struct KeyScanJob {
    key: String,
    label: Option<String>,
    refresh_all: bool,
    known: Option<Setting>,
}

#[derive(Clone)]
struct PrefixScanJob {
    pattern: String,
    label: Option<String>,
    /// Etags of the currently held matching subset, by identity
    baseline: HashMap<KeyLabelId, String>,
}

enum ScanOutcome {
    Incremental(Vec<ChangeRecord>),
    Full(LoadedState),
}

pub(crate) struct RefreshEngine {
    config: ProviderConfig,
    selectors: Vec<Selector>,
    mappers: Vec<SettingMapper>,
    pub(crate) registry: ReplicaRegistry,
    pub(crate) watchers: WatcherSet,
    pub(crate) adapters: AdapterChain,
    pub(crate) schedule: BackoffSchedule,
    pub(crate) publisher: OutputPublisher,
    pub(crate) cancel: CancellationToken,
    state: Mutex<EngineState>,
    status: StdMutex<ProviderState>,
}

impl RefreshEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: ProviderConfig,
        selectors: Vec<Selector>,
        mappers: Vec<SettingMapper>,
        registry: ReplicaRegistry,
        watchers: WatcherSet,
        adapters: AdapterChain,
        schedule: BackoffSchedule,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            selectors,
            mappers,
            registry,
            watchers,
            adapters,
            schedule,
            publisher: OutputPublisher::new(),
            cancel,
            state: Mutex::new(EngineState {
                store: None,
                init_retry_not_before: None,
            }),
            status: StdMutex::new(ProviderState::Uninitialized),
        }
    }

    pub(crate) fn status(&self) -> ProviderState {
        *self.status.lock().expect("status poisoned")
    }

    fn set_status(&self, status: ProviderState) {
        *self.status.lock().expect("status poisoned") = status;
    }

    /// Blocking initial load with an overall deadline.
    ///
    /// Fail-overable errors are accumulated across attempts and wrapped
    /// in a [`StartupError::Timeout`] when the deadline elapses; other
    /// errors terminate the loop immediately. Regardless of outcome, a
    /// failure never propagates before the crash-loop floor has
    /// elapsed. When `optional` is true the recoverable failure classes
    /// degrade to a warning and the store stays empty.
    pub(crate) async fn initial_load(&self, optional: bool) -> Result<()> {
        self.set_status(ProviderState::Loading);
        let start = Instant::now();

        let result = if self.config.request_tracing {
            self.initial_load_loop(start)
                .instrument(info_span!(
                    "initial_load",
                    request_type = "startup",
                    elapsed_ms = field::Empty
                ))
                .await
        } else {
            self.initial_load_loop(start).await
        };

        match result {
            Ok(()) => {
                self.set_status(ProviderState::Ready);
                Ok(())
            }
            Err(err) => {
                // Dampen orchestrator-driven restart storms.
                let floor = self.config.crash_loop_floor();
                let elapsed = start.elapsed();
                if elapsed < floor {
                    tokio::time::sleep(floor - elapsed).await;
                }
                self.set_status(ProviderState::Failed);
                if optional && err.is_recoverable() {
                    warn!("optional provider starting without configuration: {err}");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn initial_load_loop(&self, start: Instant) -> Result<()> {
        let _timer = PassTimer::start("initial_load");
        let deadline = start + self.config.startup_timeout();
        let mut attempts: Vec<ClientError> = Vec::new();
        let mut post_window_attempt: u32 = 0;
        // Sole operation during startup; nothing contends for the gate.
        let mut state = self.state.lock().await;

        loop {
            match self.run_initialize(&mut state, &self.registry.all()).await {
                Ok(()) => return Ok(()),
                Err(Error::Client(err)) if err.is_failoverable() => {
                    debug!("initial load attempt failed: {err}");
                    attempts.push(err);
                }
                Err(Error::Cancelled) => {
                    return Err(StartupError::Timeout {
                        elapsed: start.elapsed(),
                        attempts,
                    }
                    .into());
                }
                Err(other) => return Err(other),
            }

            let delay = match self.schedule.startup_delay(start.elapsed()) {
                Some(fixed) => fixed,
                None => {
                    post_window_attempt += 1;
                    self.schedule.refresh_delay(post_window_attempt)
                }
            };
            if Instant::now() + delay >= deadline {
                return Err(StartupError::Timeout {
                    elapsed: start.elapsed(),
                    attempts,
                }
                .into());
            }
            if self.sleep(delay).await.is_err() {
                // Cancellation during startup converts to the timeout
                // aggregate carrying the attempts so far.
                return Err(StartupError::Timeout {
                    elapsed: start.elapsed(),
                    attempts,
                }
                .into());
            }
        }
    }

    /// Non-blocking single-flight refresh.
    ///
    /// Returns immediately with success when another refresh holds the
    /// gate. The gate is released on every exit path.
    pub(crate) async fn refresh(&self) -> Result<()> {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(()),
        };
        if self.status() == ProviderState::Ready {
            self.set_status(ProviderState::Refreshing);
        }

        let result = if self.config.request_tracing {
            self.refresh_inner(&mut state)
                .instrument(info_span!(
                    "refresh",
                    request_type = "watch",
                    elapsed_ms = field::Empty
                ))
                .await
        } else {
            self.refresh_inner(&mut state).await
        };

        let status = if state.store.is_some() {
            ProviderState::Ready
        } else {
            ProviderState::Failed
        };
        self.set_status(status);
        result
    }

    async fn refresh_inner(&self, state: &mut EngineState) -> Result<()> {
        let _timer = PassTimer::start("refresh");
        let now = Instant::now();
        let (due_keys, due_prefixes) = self.watchers.expired(now);
        let loaded = state.store.is_some();

        if loaded && due_keys.is_empty() && due_prefixes.is_empty() && !self.adapters.needs_refresh()
        {
            return Ok(());
        }

        let replicas = self.registry.available(now);
        if replicas.is_empty() {
            debug!("refresh skipped: all replicas are cooling down");
            return Ok(());
        }

        if !loaded {
            // The initial load never succeeded; retry it from here at
            // most once per effective poll interval.
            if state.init_retry_not_before.map_or(true, |t| t <= now) {
                state.init_retry_not_before = Some(now + self.watchers.min_poll_interval());
                return self.run_initialize(state, &replicas).await;
            }
            return Ok(());
        }

        if due_keys.is_empty() && due_prefixes.is_empty() {
            // Only an adapter asked for this pass; nothing to scan.
            return self.republish(state).await;
        }

        let store = state.store.as_ref().expect("store presence checked above");
        let key_jobs: Vec<KeyScanJob> = due_keys
            .iter()
            .map(|&i| {
                let watcher = &self.watchers.key_watchers()[i];
                KeyScanJob {
                    key: watcher.key.clone(),
                    label: watcher.label.clone(),
                    refresh_all: watcher.refresh_all,
                    known: store
                        .watched(&KeyLabelId::new(&watcher.key, watcher.label.as_deref()))
                        .cloned(),
                }
            })
            .collect();
        let prefix_jobs: Vec<PrefixScanJob> = due_prefixes
            .iter()
            .map(|&i| {
                let watcher = &self.watchers.prefix_watchers()[i];
                PrefixScanJob {
                    pattern: watcher.key_pattern.clone(),
                    label: watcher.label.clone(),
                    baseline: store
                        .watched_matching(&watcher.key_pattern, watcher.label.as_deref())
                        .into_iter()
                        .map(|(id, setting)| (id, setting.etag))
                        .collect(),
                }
            })
            .collect();

        let executor = FailoverExecutor::new(
            &self.registry,
            &self.schedule,
            self.config.replica.max_retries,
            &self.cancel,
        );
        let outcome = executor
            .execute(&replicas, |replica| {
                let key_jobs = key_jobs.clone();
                let prefix_jobs = prefix_jobs.clone();
                async move { self.scan(replica, key_jobs, prefix_jobs).await }
            })
            .await?;

        // Apply phase: runs exactly once, on the winning attempt's result.
        let now = Instant::now();
        let changed = match outcome {
            ScanOutcome::Full(full) => {
                state.store = Some(SettingStore::new(full.watched, full.mapped));
                self.watchers.bump_all(now);
                self.adapters.invalidate(None);
                true
            }
            ScanOutcome::Incremental(records) => {
                self.watchers.bump_keys(&due_keys, now);
                self.watchers.bump_prefixes(&due_prefixes, now);
                let store = state.store.as_mut().expect("store presence checked above");
                let mut changed = false;
                for record in records {
                    match record.kind {
                        ChangeKind::None => continue,
                        ChangeKind::Modified => {
                            let current = record
                                .current
                                .clone()
                                .expect("modified change carries a setting");
                            store.insert_watched(record.id(), current.clone());
                            match self.apply_mappers(current.clone()) {
                                Some(mapped) => store.insert_mapped(mapped),
                                None => {
                                    store.remove_mapped(&current.key);
                                }
                            }
                            self.adapters.invalidate(Some(&current));
                        }
                        ChangeKind::Deleted => {
                            let previous = store.remove_watched(&record.id());
                            store.remove_mapped(&record.key);
                            if let Some(previous) = previous {
                                self.adapters.invalidate(Some(&previous));
                            }
                        }
                    }
                    changed = true;
                }
                changed
            }
        };

        if changed || self.adapters.needs_refresh() {
            self.republish(state).await?;
        }
        Ok(())
    }

    /// Change-detection pass against one replica. Single-key watchers
    /// run first in registration order; the first change on a
    /// refresh-all watcher promotes the pass to a full reload on the
    /// same replica and skips every remaining scan, including prefixes.
    async fn scan(
        &self,
        replica: Arc<Replica>,
        key_jobs: Vec<KeyScanJob>,
        prefix_jobs: Vec<PrefixScanJob>,
    ) -> std::result::Result<ScanOutcome, ClientError> {
        let client = replica.client();
        let mut records = Vec::new();

        for job in &key_jobs {
            let change = match &job.known {
                Some(known) => client.get_if_changed(known.clone()).await?,
                None => match client.get(job.key.clone(), job.label.clone()).await? {
                    Some(setting) => {
                        ChangeRecord::modified(&job.key, job.label.as_deref(), setting)
                    }
                    // Still absent; benign for a watcher with no baseline.
                    None => ChangeRecord::none(&job.key, job.label.as_deref()),
                },
            };
            if change.kind == ChangeKind::None {
                continue;
            }
            if job.refresh_all {
                return self.full_load(&replica).await.map(ScanOutcome::Full);
            }
            // Rebind to the watcher's requested identity; the stored
            // setting keeps the server's canonical casing.
            let record = match change.kind {
                ChangeKind::Modified => ChangeRecord::modified(
                    &job.key,
                    job.label.as_deref(),
                    change.current.expect("modified change carries a setting"),
                ),
                ChangeKind::Deleted => ChangeRecord::deleted(&job.key, job.label.as_deref()),
                ChangeKind::None => unreachable!(),
            };
            records.push(record);
        }

        for job in &prefix_jobs {
            let server = drain_list(
                client,
                &Selector::new(job.pattern.clone(), job.label.as_deref()),
            )
            .await?;
            let mut seen = HashSet::with_capacity(server.len());
            for setting in server {
                let id = setting.id();
                seen.insert(id.clone());
                match job.baseline.get(&id) {
                    Some(etag) if *etag == setting.etag => {}
                    _ => records.push(ChangeRecord {
                        kind: ChangeKind::Modified,
                        key: setting.key.clone(),
                        label: setting.label.clone(),
                        current: Some(setting),
                    }),
                }
            }
            for id in job.baseline.keys() {
                if !seen.contains(id) {
                    let label = (!id.label().is_empty()).then(|| id.label());
                    records.push(ChangeRecord::deleted(id.key(), label));
                }
            }
        }

        Ok(ScanOutcome::Incremental(records))
    }

    /// Loads every selector plus all watcher baselines from one replica.
    async fn full_load(
        &self,
        replica: &Replica,
    ) -> std::result::Result<LoadedState, ClientError> {
        let client = replica.client();
        let mut mapped: HashMap<String, Setting> = HashMap::new();

        let selectors = if self.selectors.is_empty() {
            vec![Selector::default()]
        } else {
            self.selectors.clone()
        };
        for selector in &selectors {
            let settings = match &selector.snapshot_name {
                Some(name) => {
                    let info = client.get_snapshot(name.clone()).await?;
                    if let SnapshotComposition::Other(composition) = info.composition {
                        return Err(ClientError::SnapshotComposition {
                            name: name.clone(),
                            composition,
                        });
                    }
                    drain_snapshot(client, name).await?
                }
                None => drain_list(client, selector).await?,
            };
            // Later selectors win per key; a mapper dropping a setting
            // removes it even when an earlier selector supplied it.
            for setting in settings {
                let original_key = setting.key.clone();
                match self.apply_mappers(setting) {
                    Some(setting) => {
                        mapped.insert(mapped_key(&setting.key), setting);
                    }
                    None => {
                        mapped.remove(&mapped_key(&original_key));
                    }
                }
            }
        }

        let mut watched: HashMap<KeyLabelId, Setting> = HashMap::new();
        for watcher in self.watchers.key_watchers() {
            if let Some(setting) = client
                .get(watcher.key.clone(), watcher.label.clone())
                .await?
            {
                watched.insert(
                    KeyLabelId::new(&watcher.key, watcher.label.as_deref()),
                    setting,
                );
            }
        }
        for watcher in self.watchers.prefix_watchers() {
            let settings = drain_list(
                client,
                &Selector::new(watcher.key_pattern.clone(), watcher.label.as_deref()),
            )
            .await?;
            for setting in settings {
                watched.insert(setting.id(), setting);
            }
        }

        Ok(LoadedState { watched, mapped })
    }

    /// Runs a full initialize through the failover executor and
    /// publishes the result.
    async fn run_initialize(
        &self,
        state: &mut EngineState,
        replicas: &[Arc<Replica>],
    ) -> Result<()> {
        let executor = FailoverExecutor::new(
            &self.registry,
            &self.schedule,
            self.config.replica.max_retries,
            &self.cancel,
        );
        let loaded = executor
            .execute(replicas, |replica| async move {
                self.full_load(&replica).await
            })
            .await?;

        state.store = Some(SettingStore::new(loaded.watched, loaded.mapped));
        state.init_retry_not_before = None;
        self.watchers.bump_all(Instant::now());
        self.adapters.invalidate(None);
        self.republish(state).await
    }

    /// Expands the mapped settings through the adapter chain, strips
    /// configured key prefixes, and installs the result. At most one
    /// publication per refresh.
    async fn republish(&self, state: &EngineState) -> Result<()> {
        let store = match &state.store {
            Some(store) => store,
            None => return Ok(()),
        };
        let mut published = HashMap::new();
        for setting in store.mapped_values() {
            for (key, value) in self.adapters.expand(setting).await? {
                published.insert(self.strip_prefix(&key), value);
            }
        }
        self.publisher.publish(published);
        Ok(())
    }

    fn apply_mappers(&self, setting: Setting) -> Option<Setting> {
        let mut current = setting;
        for mapper in &self.mappers {
            current = mapper(current)?;
        }
        Some(current)
    }

    /// First configured prefix wins, compared case-insensitively; the
    /// remainder keeps its server casing.
    fn strip_prefix(&self, key: &str) -> String {
        for prefix in &self.config.key_prefixes {
            if let (Some(head), Some(tail)) = (key.get(..prefix.len()), key.get(prefix.len()..)) {
                if head.eq_ignore_ascii_case(prefix) {
                    return tail.to_string();
                }
            }
        }
        key.to_string()
    }

    async fn sleep(&self, duration: std::time::Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
