//! In-memory simulator for the remote configuration service.
//!
//! One [`SimService`] plays the replicated server; each [`SimClient`]
//! is one replica endpoint's view over it, with scriptable fault
//! injection so tests can drive failover, cooldown, and outage paths
//! deterministically.

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::RemoteClient;
use crate::errors::ClientError;
use crate::settings::label_eq;
use crate::settings::ChangeRecord;
use crate::settings::Selector;
use crate::settings::Setting;
use crate::settings::SettingPage;
use crate::settings::SnapshotComposition;
use crate::settings::SnapshotInfo;
use crate::watch::key_matches;

const PAGE_SIZE: usize = 2;

#[derive(Default)]
struct SimInner {
    settings: Vec<Setting>,
    snapshots: Vec<(String, SnapshotComposition, Vec<Setting>)>,
}

/// Shared server-side state behind every simulated replica.
#[derive(Default)]
pub(crate) struct SimService {
    inner: Mutex<SimInner>,
}

impl SimService {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Upserts a setting by `(key, label)` identity.
    pub(crate) fn set(&self, key: &str, label: Option<&str>, value: &str, etag: &str) {
        let mut inner = self.inner.lock().unwrap();
        let setting = Setting::new(key, label, value, etag);
        if let Some(existing) = inner
            .settings
            .iter_mut()
            .find(|s| s.key == key && label_eq(s.label.as_deref(), label))
        {
            *existing = setting;
        } else {
            inner.settings.push(setting);
        }
    }

    pub(crate) fn remove(&self, key: &str, label: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .settings
            .retain(|s| !(s.key == key && label_eq(s.label.as_deref(), label)));
    }

    pub(crate) fn add_snapshot(
        &self,
        name: &str,
        composition: SnapshotComposition,
        settings: Vec<Setting>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshots.push((name.to_string(), composition, settings));
    }

    fn matching(&self, selector: &Selector) -> Vec<Setting> {
        let inner = self.inner.lock().unwrap();
        inner
            .settings
            .iter()
            .filter(|s| {
                let key_ok = selector.key_filter == "*"
                    || key_matches(&selector.key_filter, &s.key);
                key_ok && label_eq(s.label.as_deref(), selector.label_filter.as_deref())
            })
            .cloned()
            .collect()
    }

    fn find(&self, key: &str, label: Option<&str>) -> Option<Setting> {
        let inner = self.inner.lock().unwrap();
        // Key comparison is case-insensitive so tests can exercise the
        // server returning a canonical casing different from the
        // watcher's requested one.
        inner
            .settings
            .iter()
            .find(|s| s.key.eq_ignore_ascii_case(key) && label_eq(s.label.as_deref(), label))
            .cloned()
    }
}

fn page_of(settings: Vec<Setting>, continuation: Option<String>) -> SettingPage {
    let start: usize = continuation.and_then(|c| c.parse().ok()).unwrap_or(0);
    let end = (start + PAGE_SIZE).min(settings.len());
    let next = (end < settings.len()).then(|| end.to_string());
    SettingPage {
        settings: settings[start..end].to_vec(),
        continuation: next,
    }
}

/// One replica endpoint over the shared [`SimService`].
pub(crate) struct SimClient {
    endpoint: String,
    service: Arc<SimService>,
    faults: Mutex<VecDeque<ClientError>>,
    fail_always: Mutex<Option<ClientError>>,
    latency: Mutex<Duration>,
    calls: AtomicUsize,
}

impl SimClient {
    pub(crate) fn new(endpoint: &str, service: Arc<SimService>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            service,
            faults: Mutex::new(VecDeque::new()),
            fail_always: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        })
    }

    /// Queues `count` one-shot faults consumed by subsequent requests.
    pub(crate) fn push_faults(&self, err: ClientError, count: usize) {
        let mut faults = self.faults.lock().unwrap();
        for _ in 0..count {
            faults.push_back(err.clone());
        }
    }

    /// Every request fails with `err` until [`recover`](Self::recover).
    pub(crate) fn fail_always(&self, err: ClientError) {
        *self.fail_always.lock().unwrap() = Some(err);
    }

    pub(crate) fn recover(&self) {
        *self.fail_always.lock().unwrap() = None;
        self.faults.lock().unwrap().clear();
    }

    /// Adds a sleep in front of every request, to widen suspension
    /// windows in single-flight tests.
    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.fail_always.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(err) = self.faults.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(())
    }
}

/// HTTP 503 from a replica.
pub(crate) fn unavailable() -> ClientError {
    ClientError::Status {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

#[async_trait]
impl RemoteClient for SimClient {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn list_page(
        &self,
        selector: Selector,
        continuation: Option<String>,
    ) -> Result<SettingPage, ClientError> {
        self.begin().await?;
        Ok(page_of(self.service.matching(&selector), continuation))
    }

    async fn get_snapshot(&self, name: String) -> Result<SnapshotInfo, ClientError> {
        self.begin().await?;
        let inner = self.service.inner.lock().unwrap();
        match inner.snapshots.iter().find(|(n, _, _)| *n == name) {
            Some((name, composition, _)) => Ok(SnapshotInfo {
                name: name.clone(),
                composition: composition.clone(),
            }),
            None => Err(ClientError::Status {
                status: 404,
                message: format!("snapshot {name} not found"),
            }),
        }
    }

    async fn list_snapshot_page(
        &self,
        name: String,
        continuation: Option<String>,
    ) -> Result<SettingPage, ClientError> {
        self.begin().await?;
        let settings = {
            let inner = self.service.inner.lock().unwrap();
            inner
                .snapshots
                .iter()
                .find(|(n, _, _)| *n == name)
                .map(|(_, _, settings)| settings.clone())
                .unwrap_or_default()
        };
        Ok(page_of(settings, continuation))
    }

    async fn get(
        &self,
        key: String,
        label: Option<String>,
    ) -> Result<Option<Setting>, ClientError> {
        self.begin().await?;
        Ok(self.service.find(&key, label.as_deref()))
    }

    async fn get_if_changed(&self, known: Setting) -> Result<ChangeRecord, ClientError> {
        self.begin().await?;
        match self.service.find(&known.key, known.label.as_deref()) {
            Some(current) if current.etag == known.etag => {
                Ok(ChangeRecord::none(&known.key, known.label.as_deref()))
            }
            Some(current) => Ok(ChangeRecord::modified(
                &known.key,
                known.label.as_deref(),
                current,
            )),
            None => Ok(ChangeRecord::deleted(&known.key, known.label.as_deref())),
        }
    }
}
