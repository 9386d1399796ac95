//! Bounded per-series metric history with whole-snapshot persistence.
//!
//! Each series is a FIFO capped at `max_points`; samples older than the
//! retention window are dropped by [`HistoryStore::compact`]. The in-memory
//! log is authoritative; every mutation is followed by a snapshot write that
//! is best-effort (a failed write is logged and the mutation still stands).
//! Nothing is written until the persisted snapshot has been read, so an
//! unreadable file is never replaced by a partial log.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::MonitorError;
use crate::types::{MetricSample, Series};

/// Persisted form: series name -> samples in insertion order.
pub type Snapshot = BTreeMap<Series, Vec<MetricSample>>;

type Logs = BTreeMap<Series, VecDeque<MetricSample>>;

pub const DEFAULT_MAX_POINTS: usize = 1000;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    dq.push_back(v);
    while dq.len() > cap {
        dq.pop_front();
    }
}

/// Durable backing for the history snapshot.
pub trait Persistence: Send + Sync + 'static {
    /// `Ok(None)` means nothing has been persisted yet (first run).
    fn read_snapshot(&self) -> impl Future<Output = Result<Option<Snapshot>, MonitorError>> + Send;

    fn write_snapshot(
        &self,
        snapshot: &Snapshot,
    ) -> impl Future<Output = Result<(), MonitorError>> + Send;
}

/// Snapshot stored as one pretty-printed JSON file, replaced atomically.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("history.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFilePersistence {
    async fn read_snapshot(&self) -> Result<Option<Snapshot>, MonitorError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MonitorError::storage(&self.path.display().to_string(), e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| MonitorError::storage(&self.path.display().to_string(), e))
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), MonitorError> {
        let where_ = self.path.display().to_string();
        let data = serde_json::to_vec_pretty(snapshot).map_err(|e| MonitorError::storage(&where_, e))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MonitorError::storage(&where_, e))?;
        }
        // write-then-rename so readers never see a torn snapshot
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| MonitorError::storage(&where_, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| MonitorError::storage(&where_, e))
    }
}

/// Snapshot held in process memory. Reads and writes can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    inner: StdMutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshot: Option<Snapshot>,
    fail_reads: bool,
    fail_writes: bool,
    writes: usize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let p = Self::default();
        p.lock().snapshot = Some(snapshot);
        p
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // a poisoned lock only means a test panicked mid-write; the data is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.lock().snapshot.clone()
    }

    pub fn writes(&self) -> usize {
        self.lock().writes
    }
}

impl Persistence for MemoryPersistence {
    async fn read_snapshot(&self) -> Result<Option<Snapshot>, MonitorError> {
        let inner = self.lock();
        if inner.fail_reads {
            return Err(MonitorError::StorageUnavailable("read refused".into()));
        }
        Ok(inner.snapshot.clone())
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), MonitorError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(MonitorError::StorageUnavailable("write refused".into()));
        }
        inner.snapshot = Some(snapshot.clone());
        inner.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryOptions {
    pub max_points: usize,
    pub retention: Duration,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            retention: DEFAULT_RETENTION,
        }
    }
}

pub struct HistoryStore<P> {
    persistence: P,
    opts: HistoryOptions,
    // None until the persisted snapshot has been read successfully
    logs: Mutex<Option<Logs>>,
    // held across snapshot + write so concurrent writers cannot lose an update
    write_gate: Mutex<()>,
}

impl<P: Persistence> HistoryStore<P> {
    /// Open the store and try to load the persisted snapshot. A failed load is
    /// logged and retried lazily on the next access.
    pub async fn open(persistence: P, opts: HistoryOptions) -> Self {
        let opts = HistoryOptions {
            max_points: opts.max_points.max(1),
            ..opts
        };
        let store = Self {
            persistence,
            opts,
            logs: Mutex::new(None),
            write_gate: Mutex::new(()),
        };
        {
            let mut logs = store.logs.lock().await;
            let failed = store.load_into(&mut logs).await.err();
            if let Some(e) = failed {
                warn!(error = %e, "history snapshot unavailable at startup");
            }
        }
        store
    }

    pub fn options(&self) -> HistoryOptions {
        self.opts
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    async fn load_into<'a>(&self, slot: &'a mut Option<Logs>) -> Result<&'a mut Logs, MonitorError> {
        if slot.is_none() {
            let snapshot = self.persistence.read_snapshot().await?.unwrap_or_default();
            let cap = self.opts.max_points;
            let logs: Logs = snapshot
                .into_iter()
                .map(|(series, samples)| {
                    let mut dq = VecDeque::with_capacity(samples.len().min(cap));
                    for s in samples {
                        push_capped(&mut dq, s, cap);
                    }
                    (series, dq)
                })
                .collect();
            *slot = Some(logs);
        }
        // just populated above
        Ok(slot.get_or_insert_with(Logs::new))
    }

    /// Validate and append one sample, evicting the oldest entries beyond `max_points`.
    pub async fn append(&self, series: Series, sample: MetricSample) -> Result<(), MonitorError> {
        sample.validate(series)?;
        {
            let mut guard = self.logs.lock().await;
            let logs = self.load_into(&mut guard).await?;
            push_capped(logs.entry(series).or_default(), sample, self.opts.max_points);
        }
        self.persist().await;
        Ok(())
    }

    /// Append several samples with a single snapshot write. Invalid samples are
    /// logged and skipped; returns how many were stored. While the persisted
    /// snapshot cannot be read the whole batch is dropped, so a partial log never
    /// overwrites it.
    pub async fn append_batch(&self, batch: Vec<(Series, MetricSample)>) -> usize {
        let mut accepted = 0;
        {
            let mut guard = self.logs.lock().await;
            let logs = match self.load_into(&mut guard).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(error = %e, dropped = batch.len(), "history unreadable, batch not recorded");
                    return 0;
                }
            };
            for (series, sample) in batch {
                if let Err(e) = sample.validate(series) {
                    warn!(%series, error = %e, "dropping sample");
                    continue;
                }
                push_capped(logs.entry(series).or_default(), sample, self.opts.max_points);
                accepted += 1;
            }
        }
        if accepted > 0 {
            self.persist().await;
        }
        accepted
    }

    /// All samples of `series` with `timestamp >= since`, oldest first.
    pub async fn query(&self, series: Series, since: i64) -> Result<Vec<MetricSample>, MonitorError> {
        let mut guard = self.logs.lock().await;
        let logs = self.load_into(&mut guard).await?;
        Ok(logs
            .get(&series)
            .map(|dq| dq.iter().filter(|s| s.timestamp >= since).cloned().collect())
            .unwrap_or_default())
    }

    /// Drop every sample older than `cutoff` from all series. Returns the number removed.
    pub async fn purge_older_than(&self, cutoff: i64) -> Result<usize, MonitorError> {
        let removed = {
            let mut guard = self.logs.lock().await;
            let logs = self.load_into(&mut guard).await?;
            let mut removed = 0;
            for dq in logs.values_mut() {
                let before = dq.len();
                dq.retain(|s| s.timestamp >= cutoff);
                removed += before - dq.len();
            }
            removed
        };
        if removed > 0 {
            self.persist().await;
        }
        debug!(removed, cutoff, "history purge");
        Ok(removed)
    }

    /// Retention pass relative to `now`.
    pub async fn compact(&self, now: i64) -> Result<usize, MonitorError> {
        let window = i64::try_from(self.opts.retention.as_millis()).unwrap_or(i64::MAX);
        self.purge_older_than(now.saturating_sub(window)).await
    }

    /// Number of stored samples in `series`; loads the snapshot like [`query`](Self::query).
    pub async fn len(&self, series: Series) -> Result<usize, MonitorError> {
        let mut guard = self.logs.lock().await;
        let logs = self.load_into(&mut guard).await?;
        Ok(logs.get(&series).map_or(0, VecDeque::len))
    }

    async fn persist(&self) {
        let _gate = self.write_gate.lock().await;
        // snapshot taken under the gate: the last writer always carries every earlier update
        let snapshot: Snapshot = {
            let guard = self.logs.lock().await;
            match guard.as_ref() {
                Some(logs) => logs
                    .iter()
                    .map(|(k, dq)| (*k, dq.iter().cloned().collect()))
                    .collect(),
                None => return,
            }
        };
        if let Err(e) = self.persistence.write_snapshot(&snapshot).await {
            warn!(error = %e, "history snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(max_points: usize) -> HistoryOptions {
        HistoryOptions {
            max_points,
            ..HistoryOptions::default()
        }
    }

    #[test]
    fn push_capped_evicts_oldest() {
        let mut dq = VecDeque::new();
        for v in 0..5 {
            push_capped(&mut dq, v, 3);
        }
        assert_eq!(dq, VecDeque::from(vec![2, 3, 4]));
    }

    #[tokio::test]
    async fn loaded_snapshot_is_trimmed_to_capacity() {
        let mut snap = Snapshot::new();
        snap.insert(
            Series::Cpu,
            (1..=5).map(|t| MetricSample::new(t, t as f64)).collect(),
        );
        let store = HistoryStore::open(MemoryPersistence::with_snapshot(snap), opts(2)).await;
        let got = store.query(Series::Cpu, 0).await.unwrap();
        assert_eq!(got.iter().map(|s| s.timestamp).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[tokio::test]
    async fn failed_startup_read_is_retried_on_query() {
        let p = MemoryPersistence::new();
        p.set_fail_reads(true);
        let store = HistoryStore::open(p, opts(10)).await;
        assert!(matches!(
            store.query(Series::Disk, 0).await,
            Err(MonitorError::StorageUnavailable(_))
        ));
        store.persistence().set_fail_reads(false);
        assert!(store.query(Series::Disk, 0).await.unwrap().is_empty());
    }

    fn cpu_snapshot(points: i64) -> Snapshot {
        let mut snap = Snapshot::new();
        snap.insert(
            Series::Cpu,
            (1..=points).map(|t| MetricSample::new(t, 5.0)).collect(),
        );
        snap
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_never_overwritten() {
        let p = MemoryPersistence::with_snapshot(cpu_snapshot(500));
        p.set_fail_reads(true);
        let store = HistoryStore::open(p, opts(1000)).await;

        let err = store
            .append(Series::Memory, MetricSample::new(600, 40.0))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::StorageUnavailable(_)));
        let batch = vec![(Series::Memory, MetricSample::new(601, 41.0))];
        assert_eq!(store.append_batch(batch).await, 0);
        assert_eq!(store.persistence().writes(), 0);

        store.persistence().set_fail_reads(false);
        store
            .append(Series::Memory, MetricSample::new(602, 42.0))
            .await
            .unwrap();
        let persisted = store.persistence().snapshot().unwrap();
        assert_eq!(persisted[&Series::Cpu].len(), 500);
        assert_eq!(persisted[&Series::Memory].len(), 1);
        assert_eq!(store.query(Series::Cpu, 0).await.unwrap().len(), 500);
    }

    #[tokio::test]
    async fn len_loads_like_query() {
        let p = MemoryPersistence::with_snapshot(cpu_snapshot(3));
        p.set_fail_reads(true);
        let store = HistoryStore::open(p, opts(10)).await;
        assert!(matches!(
            store.len(Series::Cpu).await,
            Err(MonitorError::StorageUnavailable(_))
        ));
        store.persistence().set_fail_reads(false);
        assert_eq!(store.len(Series::Cpu).await.unwrap(), 3);
        assert_eq!(store.len(Series::Disk).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let p = JsonFilePersistence::in_dir(dir.path());
        assert!(p.read_snapshot().await.unwrap().is_none());
        let mut snap = Snapshot::new();
        snap.insert(
            Series::Temperature,
            vec![MetricSample::new(3, 48.0).with_tag("type", "gpu")],
        );
        p.write_snapshot(&snap).await.unwrap();
        assert_eq!(p.read_snapshot().await.unwrap(), Some(snap));
    }

    #[tokio::test]
    async fn corrupt_file_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let p = JsonFilePersistence::in_dir(dir.path());
        std::fs::write(p.path(), b"{ not json").unwrap();
        assert!(matches!(
            p.read_snapshot().await,
            Err(MonitorError::StorageUnavailable(_))
        ));
    }
}
