//! Append-only analytics store.
//!
//! Holds the three metric streams (quality, performance, usage) as bounded
//! per-key logs and persists each stream to its own JSON collection in the
//! data directory. Writes are single-writer: the persist mutex is held while a
//! stream is snapshotted and written, so a later snapshot can never be
//! overwritten by an earlier one. The stream lock itself is only held while
//! the snapshot is serialized, never across the file write, so appends and
//! reads do not wait on disk I/O.
//!
//! Storage failures after open never reach the caller. They are logged and
//! the in-memory logs keep serving reads.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnalyticsExport, PerformanceMetric, QualityMetric, StorageConfig, Timestamped, UsageMetric,
};
use crate::infrastructure::storage::{AtomicJsonFile, BoundedLog};

pub const QUALITY_FILE: &str = "quality_metrics.json";
pub const PERFORMANCE_FILE: &str = "performance_metrics.json";
pub const USAGE_FILE: &str = "usage_metrics.json";

type KeyedLogs<T> = BTreeMap<String, BoundedLog<T>>;

/// Which collection a persist call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Quality,
    Performance,
    Usage,
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub quality_removed: usize,
    pub performance_removed: usize,
    pub usage_removed: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.quality_removed + self.performance_removed + self.usage_removed
    }
}

/// Record counts per stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub quality: usize,
    pub performance: usize,
    pub usage: usize,
}

impl RecordCounts {
    pub fn total(&self) -> usize {
        self.quality + self.performance + self.usage
    }
}

pub struct AnalyticsStore {
    data_dir: PathBuf,
    capacity: usize,
    persist_on_write: bool,
    quality: RwLock<KeyedLogs<QualityMetric>>,
    performance: RwLock<KeyedLogs<PerformanceMetric>>,
    usage: RwLock<KeyedLogs<UsageMetric>>,
    quality_file: AtomicJsonFile,
    performance_file: AtomicJsonFile,
    usage_file: AtomicJsonFile,
    persist_lock: Mutex<()>,
}

impl AnalyticsStore {
    /// Create an empty store rooted at `config.data_dir` without touching disk.
    pub fn new(config: &StorageConfig) -> Self {
        let data_dir = PathBuf::from(&config.data_dir);
        Self {
            quality_file: AtomicJsonFile::new(data_dir.join(QUALITY_FILE)),
            performance_file: AtomicJsonFile::new(data_dir.join(PERFORMANCE_FILE)),
            usage_file: AtomicJsonFile::new(data_dir.join(USAGE_FILE)),
            data_dir,
            capacity: config.max_records_per_key.max(1),
            persist_on_write: config.persist_on_write,
            quality: RwLock::new(BTreeMap::new()),
            performance: RwLock::new(BTreeMap::new()),
            usage: RwLock::new(BTreeMap::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Open the store, loading any persisted collections.
    ///
    /// Temporaries left by interrupted writes are removed. A collection that
    /// cannot be parsed is moved aside and its stream starts empty. A
    /// collection that cannot be read is an error, so a later write never
    /// replaces data that was merely unreachable.
    pub async fn open(config: &StorageConfig) -> DomainResult<Self> {
        let store = Self::new(config);

        let quality = store.load_collection::<QualityMetric>(&store.quality_file).await?;
        let performance = store
            .load_collection::<PerformanceMetric>(&store.performance_file)
            .await?;
        let usage = store.load_collection::<UsageMetric>(&store.usage_file).await?;

        *store.quality.write().await = quality;
        *store.performance.write().await = performance;
        *store.usage.write().await = usage;

        let counts = store.record_counts().await;
        tracing::info!(
            data_dir = %store.data_dir.display(),
            quality = counts.quality,
            performance = counts.performance,
            usage = counts.usage,
            "Analytics store opened"
        );
        Ok(store)
    }

    async fn load_collection<T>(&self, file: &AtomicJsonFile) -> DomainResult<KeyedLogs<T>>
    where
        T: DeserializeOwned,
    {
        match file.remove_stale_temporaries().await {
            Ok(0) => {}
            Ok(removed) => tracing::warn!(
                path = %file.path().display(),
                removed,
                "Removed temporaries left by interrupted writes"
            ),
            Err(e) => tracing::warn!(
                path = %file.path().display(),
                error = %e,
                "Failed to clean up temporaries"
            ),
        }

        match file.read::<KeyedLogs<T>>().await {
            Ok(Some(mut logs)) => {
                for log in logs.values_mut() {
                    log.set_capacity(self.capacity);
                }
                Ok(logs)
            }
            Ok(None) => Ok(BTreeMap::new()),
            Err(e @ DomainError::SerializationError(_)) => {
                tracing::warn!(
                    path = %file.path().display(),
                    error = %e,
                    "Analytics collection corrupt, starting empty"
                );
                quarantine(file.path()).await;
                Ok(BTreeMap::new())
            }
            Err(e) => {
                tracing::error!(
                    path = %file.path().display(),
                    error = %e,
                    "Analytics collection could not be read"
                );
                Err(e)
            }
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ------------------------------------------------------------------
    // Appends
    // ------------------------------------------------------------------

    pub async fn record_quality(&self, metric: QualityMetric) {
        {
            let mut logs = self.quality.write().await;
            append(&mut logs, metric.subagent_id.clone(), metric, self.capacity);
        }
        self.persist_after_write(Stream::Quality).await;
    }

    pub async fn record_performance(&self, metric: PerformanceMetric) {
        {
            let mut logs = self.performance.write().await;
            append(&mut logs, metric.operation.clone(), metric, self.capacity);
        }
        self.persist_after_write(Stream::Performance).await;
    }

    pub async fn record_usage(&self, metric: UsageMetric) {
        {
            let mut logs = self.usage.write().await;
            append(&mut logs, metric.subagent_id.clone(), metric, self.capacity);
        }
        self.persist_after_write(Stream::Usage).await;
    }

    async fn persist_after_write(&self, stream: Stream) {
        if !self.persist_on_write {
            return;
        }
        if let Err(e) = self.persist_stream(stream).await {
            tracing::warn!(
                stream = ?stream,
                error = %e,
                "Failed to persist analytics; continuing in memory"
            );
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Quality records of one subagent, oldest first, optionally limited to
    /// the newest `limit`.
    pub async fn quality_history(&self, subagent_id: &str, limit: Option<usize>) -> Vec<QualityMetric> {
        let logs = self.quality.read().await;
        logs.get(subagent_id)
            .map(|log| match limit {
                Some(n) => log.latest(n).cloned().collect(),
                None => log.to_vec(),
            })
            .unwrap_or_default()
    }

    /// Quality records since `since`, for one subagent or all of them, in
    /// chronological order.
    pub async fn quality_since(&self, subagent_id: Option<&str>, since: DateTime<Utc>) -> Vec<QualityMetric> {
        let logs = self.quality.read().await;
        let mut records: Vec<QualityMetric> = logs
            .iter()
            .filter(|(key, _)| subagent_id.map_or(true, |id| id == key.as_str()))
            .flat_map(|(_, log)| log.iter().filter(|m| m.timestamp >= since).cloned())
            .collect();
        records.sort_by_key(|m| m.timestamp);
        records
    }

    /// Every quality record across subagents, chronological.
    pub async fn all_quality(&self) -> Vec<QualityMetric> {
        self.quality_since(None, DateTime::<Utc>::MIN_UTC).await
    }

    /// Scores of passing records judged with the live parameters for one
    /// subagent, oldest first. Experiment records are excluded.
    pub async fn passing_scores(&self, subagent_id: &str) -> Vec<f64> {
        let logs = self.quality.read().await;
        logs.get(subagent_id)
            .map(|log| {
                log.iter()
                    .filter(|m| m.passed && m.is_live())
                    .map(|m| m.quality_score)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn subagents(&self) -> Vec<String> {
        self.quality.read().await.keys().cloned().collect()
    }

    /// Quality logs keyed by subagent.
    pub async fn quality_by_subagent(&self) -> BTreeMap<String, Vec<QualityMetric>> {
        snapshot(&*self.quality.read().await)
    }

    /// Performance logs keyed by operation.
    pub async fn performance_by_operation(&self) -> BTreeMap<String, Vec<PerformanceMetric>> {
        snapshot(&*self.performance.read().await)
    }

    pub async fn performance_since(&self, since: DateTime<Utc>) -> Vec<PerformanceMetric> {
        let logs = self.performance.read().await;
        let mut records: Vec<PerformanceMetric> = logs
            .values()
            .flat_map(|log| log.iter().filter(|m| m.timestamp >= since).cloned())
            .collect();
        records.sort_by_key(|m| m.timestamp);
        records
    }

    pub async fn usage_history(&self, subagent_id: &str) -> Vec<UsageMetric> {
        self.usage
            .read()
            .await
            .get(subagent_id)
            .map(BoundedLog::to_vec)
            .unwrap_or_default()
    }

    pub async fn record_counts(&self) -> RecordCounts {
        RecordCounts {
            quality: count(&*self.quality.read().await),
            performance: count(&*self.performance.read().await),
            usage: count(&*self.usage.read().await),
        }
    }

    /// Raw datasets for offline analysis.
    pub async fn export(&self) -> AnalyticsExport {
        AnalyticsExport {
            exported_at: Utc::now(),
            quality: snapshot(&*self.quality.read().await),
            performance: snapshot(&*self.performance.read().await),
            usage: snapshot(&*self.usage.read().await),
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drop records older than `retention` and persist the result.
    pub async fn prune_expired(&self, retention: Duration) -> DomainResult<PruneReport> {
        let cutoff = Utc::now() - retention;
        let report = PruneReport {
            quality_removed: prune(&mut *self.quality.write().await, cutoff),
            performance_removed: prune(&mut *self.performance.write().await, cutoff),
            usage_removed: prune(&mut *self.usage.write().await, cutoff),
        };

        if report.total() > 0 {
            tracing::info!(
                cutoff = %cutoff,
                quality = report.quality_removed,
                performance = report.performance_removed,
                usage = report.usage_removed,
                "Pruned expired analytics records"
            );
        }

        self.persist_all().await?;
        Ok(report)
    }

    /// Write every collection to disk.
    pub async fn persist_all(&self) -> DomainResult<()> {
        self.persist_stream(Stream::Quality).await?;
        self.persist_stream(Stream::Performance).await?;
        self.persist_stream(Stream::Usage).await
    }

    async fn persist_stream(&self, stream: Stream) -> DomainResult<()> {
        let _guard = self.persist_lock.lock().await;
        let (file, bytes) = match stream {
            Stream::Quality => (&self.quality_file, serialize(&*self.quality.read().await)?),
            Stream::Performance => (
                &self.performance_file,
                serialize(&*self.performance.read().await)?,
            ),
            Stream::Usage => (&self.usage_file, serialize(&*self.usage.read().await)?),
        };
        file.write_bytes(&bytes).await
    }
}

fn append<T>(logs: &mut KeyedLogs<T>, key: String, record: T, capacity: usize) {
    let log = logs.entry(key).or_insert_with(|| BoundedLog::new(capacity));
    if let Some(_evicted) = log.push(record) {
        tracing::trace!(capacity, "Evicted oldest analytics record");
    }
}

fn prune<T: Timestamped>(logs: &mut KeyedLogs<T>, cutoff: DateTime<Utc>) -> usize {
    let removed = logs.values_mut().map(|log| log.prune_older_than(cutoff)).sum();
    logs.retain(|_, log| !log.is_empty());
    removed
}

fn count<T>(logs: &KeyedLogs<T>) -> usize {
    logs.values().map(BoundedLog::len).sum()
}

fn snapshot<T: Clone>(logs: &KeyedLogs<T>) -> BTreeMap<String, Vec<T>> {
    logs.iter().map(|(k, log)| (k.clone(), log.to_vec())).collect()
}

fn serialize<T: Serialize>(logs: &KeyedLogs<T>) -> DomainResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(logs)?)
}

async fn quarantine(path: &Path) {
    let aside = path.with_extension(format!("corrupt-{}", Utc::now().format("%Y%m%d%H%M%S")));
    if let Err(e) = tokio::fs::rename(path, &aside).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to move unreadable collection aside");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path, capacity: usize) -> StorageConfig {
        StorageConfig {
            data_dir: dir.to_string_lossy().to_string(),
            max_records_per_key: capacity,
            retention_days: 30,
            persist_on_write: true,
        }
    }

    fn quality(subagent: &str, score: f64, at: DateTime<Utc>) -> QualityMetric {
        QualityMetric {
            timestamp: at,
            subagent_id: subagent.to_string(),
            session_id: None,
            quality_score: score,
            passed: score >= 0.75,
            processing_time_ms: 3,
            refinement_attempts: 0,
            category_scores: BTreeMap::new(),
            critical_issues: vec![],
            experiment_id: None,
        }
    }

    #[tokio::test]
    async fn test_capacity_evicts_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticsStore::new(&config(dir.path(), 3));
        let now = Utc::now();
        for i in 0..5 {
            store.record_quality(quality("a", f64::from(i) / 10.0, now)).await;
        }
        store.record_quality(quality("b", 0.9, now)).await;

        let history = store.quality_history("a", None).await;
        let scores: Vec<f64> = history.iter().map(|m| m.quality_score).collect();
        assert_eq!(scores, vec![0.2, 0.3, 0.4]);
        assert_eq!(store.quality_history("b", None).await.len(), 1);
        assert_eq!(store.record_counts().await.quality, 4);
    }

    #[tokio::test]
    async fn test_reload_reapplies_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticsStore::new(&config(dir.path(), 10));
        let now = Utc::now();
        for i in 0..6 {
            store.record_quality(quality("a", f64::from(i) / 10.0, now)).await;
        }

        let reopened = AnalyticsStore::open(&config(dir.path(), 4)).await.unwrap();
        let scores: Vec<f64> = reopened
            .quality_history("a", None)
            .await
            .iter()
            .map(|m| m.quality_score)
            .collect();
        assert_eq!(scores, vec![0.2, 0.3, 0.4, 0.5]);
    }

    #[tokio::test]
    async fn test_prune_removes_old_records_and_empty_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticsStore::new(&config(dir.path(), 10));
        let now = Utc::now();
        store.record_quality(quality("old", 0.8, now - Duration::days(45))).await;
        store.record_quality(quality("fresh", 0.8, now)).await;
        store
            .record_performance(PerformanceMetric {
                timestamp: now - Duration::days(60),
                ..PerformanceMetric::success("assess", 4)
            })
            .await;

        let report = store.prune_expired(Duration::days(30)).await.unwrap();
        assert_eq!(report.quality_removed, 1);
        assert_eq!(report.performance_removed, 1);
        assert_eq!(store.subagents().await, vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_unwritable_directory_does_not_fail_appends() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let store = AnalyticsStore::new(&config(&blocker, 10));
        store.record_quality(quality("a", 0.9, Utc::now())).await;

        assert_eq!(store.quality_history("a", None).await.len(), 1);
        assert!(store.persist_all().await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_collection_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(QUALITY_FILE), b"{broken").unwrap();

        let store = AnalyticsStore::open(&config(dir.path(), 10)).await.unwrap();
        assert_eq!(store.record_counts().await.total(), 0);
        assert!(!dir.path().join(QUALITY_FILE).exists());
    }

    #[tokio::test]
    async fn test_unreadable_collection_fails_open_and_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(QUALITY_FILE)).unwrap();

        let result = AnalyticsStore::open(&config(dir.path(), 10)).await;
        assert!(matches!(result, Err(DomainError::StorageFailure(_))));
        assert!(dir.path().join(QUALITY_FILE).is_dir());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(AnalyticsStore::new(&config(dir.path(), 100)));
        let now = Utc::now();

        let writers: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let subagent = if i % 2 == 0 { "even" } else { "odd" };
                    store.record_quality(quality(subagent, 0.8, now)).await;
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let reopened = AnalyticsStore::open(&config(dir.path(), 100)).await.unwrap();
        assert_eq!(reopened.record_counts().await.quality, 20);
        assert_eq!(reopened.quality_history("even", None).await.len(), 10);
    }

    #[tokio::test]
    async fn test_passing_scores_only_include_passes() {
        let store = AnalyticsStore::new(&StorageConfig {
            persist_on_write: false,
            ..StorageConfig::default()
        });
        let now = Utc::now();
        store.record_quality(quality("a", 0.9, now)).await;
        store.record_quality(quality("a", 0.3, now)).await;
        store.record_quality(quality("a", 0.8, now)).await;
        store
            .record_quality(QualityMetric {
                experiment_id: Some("weights-v2".to_string()),
                ..quality("a", 0.95, now)
            })
            .await;
        assert_eq!(store.passing_scores("a").await, vec![0.9, 0.8]);
    }
}
