//! Per-proxy success/failure tallies.
//!
//! Health is advisory: a broken or unreadable store never blocks a request,
//! it only loses history. Records expire after a fixed window so a proxy that
//! failed an hour ago is judged on fresh evidence.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records untouched for longer than this are treated as absent.
pub const DEFAULT_HEALTH_TTL: Duration = Duration::from_secs(60 * 60);

/// Upper bound on tracked proxies; the oldest-updated records go first.
pub const MAX_RECORDS: usize = 64;

/// Rolling tally for one proxy URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyHealthRecord {
    pub url: String,
    pub success_count: u64,
    pub failure_count: u64,
    /// Unix milliseconds of the last recorded event
    pub last_updated_at: u64,
}

impl ProxyHealthRecord {
    /// Fraction of recorded requests that succeeded, 0.0 when empty.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

/// Outcome of a single proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Storage for proxy health, injected into the router.
pub trait ProxyHealthStore: Send + Sync {
    /// All unexpired records.
    fn read(&self) -> Vec<ProxyHealthRecord>;

    fn record_success(&self, url: &str);

    fn record_failure(&self, url: &str);

    /// Forget everything.
    fn clear(&self);
}

/// The health table itself, independent of where it is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthTable {
    records: Vec<ProxyHealthRecord>,
}

impl HealthTable {
    pub fn records(&self) -> &[ProxyHealthRecord] {
        &self.records
    }

    /// Drop records last updated more than `ttl` before `now_ms`.
    pub fn prune(&mut self, now_ms: u64, ttl: Duration) {
        let ttl_ms = ttl.as_millis() as u64;
        self.records
            .retain(|r| now_ms.saturating_sub(r.last_updated_at) <= ttl_ms);
    }

    /// Apply one event: bump one counter (creating the record if needed) and
    /// stamp the time.
    pub fn record(&mut self, url: &str, outcome: Outcome, now_ms: u64) {
        let index = match self.records.iter().position(|r| r.url == url) {
            Some(i) => i,
            None => {
                self.records.push(ProxyHealthRecord {
                    url: url.to_string(),
                    success_count: 0,
                    failure_count: 0,
                    last_updated_at: now_ms,
                });
                self.records.len() - 1
            }
        };

        let record = &mut self.records[index];
        match outcome {
            Outcome::Success => record.success_count += 1,
            Outcome::Failure => record.failure_count += 1,
        }
        record.last_updated_at = now_ms;

        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        if self.records.len() <= MAX_RECORDS {
            return;
        }
        self.records.sort_by_key(|r| r.last_updated_at);
        let excess = self.records.len() - MAX_RECORDS;
        self.records.drain(..excess);
    }
}

/// In-process health store.
pub struct MemoryHealthStore {
    table: Mutex<HealthTable>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryHealthStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, DEFAULT_HEALTH_TTL)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            table: Mutex::new(HealthTable::default()),
            ttl,
            clock,
        }
    }

    fn update(&self, url: &str, outcome: Outcome) {
        let now = self.clock.now_ms();
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.prune(now, self.ttl);
        table.record(url, outcome, now);
    }
}

impl ProxyHealthStore for MemoryHealthStore {
    fn read(&self) -> Vec<ProxyHealthRecord> {
        let now = self.clock.now_ms();
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.prune(now, self.ttl);
        table.records().to_vec()
    }

    fn record_success(&self, url: &str) {
        self.update(url, Outcome::Success);
    }

    fn record_failure(&self, url: &str) {
        self.update(url, Outcome::Failure);
    }

    fn clear(&self) {
        *self.table.lock().unwrap_or_else(|e| e.into_inner()) = HealthTable::default();
    }
}

/// Health store persisted as a JSON array in a single file.
///
/// Every operation is read-modify-write of the whole file; last write wins.
/// The I/O is synchronous and runs on the calling task. The table holds at
/// most 64 short records, so each call is one small read and one small write.
pub struct FileHealthStore {
    path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write within this process
    lock: Mutex<()>,
}

impl FileHealthStore {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            ttl,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HealthTable {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HealthTable::default(),
            Err(e) => {
                tracing::warn!("Failed to read proxy health from {:?}: {e}", self.path);
                return HealthTable::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!("Ignoring corrupt proxy health file {:?}: {e}", self.path);
                HealthTable::default()
            }
        }
    }

    fn save(&self, table: &HealthTable) {
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string(table)?;
            std::fs::write(&self.path, json)
        })();
        if let Err(e) = result {
            tracing::warn!("Failed to persist proxy health to {:?}: {e}", self.path);
        }
    }

    fn update(&self, url: &str, outcome: Outcome) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now_ms();
        let mut table = self.load();
        table.prune(now, self.ttl);
        table.record(url, outcome, now);
        self.save(&table);
    }
}

impl ProxyHealthStore for FileHealthStore {
    fn read(&self) -> Vec<ProxyHealthRecord> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut table = self.load();
        let before = table.records().len();
        table.prune(self.clock.now_ms(), self.ttl);
        if table.records().len() != before {
            self.save(&table);
        }
        table.records().to_vec()
    }

    fn record_success(&self, url: &str) {
        self.update(url, Outcome::Success);
    }

    fn record_failure(&self, url: &str) {
        self.update(url, Outcome::Failure);
    }

    fn clear(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to clear proxy health at {:?}: {e}", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;

    const HOUR_MS: u64 = 60 * 60 * 1000;

    #[test]
    fn test_record_creates_then_increments() {
        let mut table = HealthTable::default();
        table.record("https://a", Outcome::Failure, 10);
        table.record("https://a", Outcome::Success, 20);
        table.record("https://a", Outcome::Success, 30);

        assert_eq!(table.records().len(), 1);
        let r = &table.records()[0];
        assert_eq!(r.success_count, 2);
        assert_eq!(r.failure_count, 1);
        assert_eq!(r.last_updated_at, 30);
    }

    #[test]
    fn test_prune_drops_expired() {
        let mut table = HealthTable::default();
        table.record("https://old", Outcome::Success, 0);
        table.record("https://new", Outcome::Success, HOUR_MS);
        table.prune(HOUR_MS + 1, DEFAULT_HEALTH_TTL);

        let urls: Vec<_> = table.records().iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://new"]);
    }

    #[test]
    fn test_overflow_evicts_oldest_first() {
        let mut table = HealthTable::default();
        for i in 0..(MAX_RECORDS as u64 + 3) {
            table.record(&format!("https://p{i}"), Outcome::Success, i);
        }
        assert_eq!(table.records().len(), MAX_RECORDS);
        assert!(table.records().iter().all(|r| r.last_updated_at >= 3));
    }

    #[test]
    fn test_success_rate() {
        let record = ProxyHealthRecord {
            url: "https://a".into(),
            success_count: 3,
            failure_count: 1,
            last_updated_at: 0,
        };
        assert!((record.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_store_expires_records_on_read() {
        let clock = Arc::new(ManualClock::at(1_000));
        let store = MemoryHealthStore::new(clock.clone());
        store.record_failure("https://a");
        assert_eq!(store.read().len(), 1);

        clock.advance_ms(HOUR_MS + 1);
        assert!(store.read().is_empty());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health").join("proxy_health.json");
        let clock = Arc::new(ManualClock::at(5_000));

        let store = FileHealthStore::new(&path, DEFAULT_HEALTH_TTL, clock.clone());
        store.record_success("https://a");
        store.record_failure("https://a");
        store.record_failure("https://b");

        let reopened = FileHealthStore::new(&path, DEFAULT_HEALTH_TTL, clock);
        let records = reopened.read();
        assert_eq!(records.len(), 2);
        let a = records.iter().find(|r| r.url == "https://a").unwrap();
        assert_eq!((a.success_count, a.failure_count), (1, 1));
    }

    #[test]
    fn test_file_store_uses_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_health.json");
        let store = FileHealthStore::new(&path, DEFAULT_HEALTH_TTL, Arc::new(ManualClock::at(7)));
        store.record_success("https://a");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with('['));
        assert!(raw.contains("\"successCount\":1"));
        assert!(raw.contains("\"lastUpdatedAt\":7"));
    }

    #[test]
    fn test_file_store_expired_records_filtered_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_health.json");
        let clock = Arc::new(ManualClock::at(0));
        let store = FileHealthStore::new(&path, DEFAULT_HEALTH_TTL, clock.clone());
        store.record_success("https://stale");

        clock.advance_ms(HOUR_MS + 1);
        assert!(store.read().is_empty());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "[]");
    }

    #[test]
    fn test_file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_health.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileHealthStore::new(&path, DEFAULT_HEALTH_TTL, Arc::new(ManualClock::at(1)));
        assert!(store.read().is_empty());
        store.record_success("https://a");
        assert_eq!(store.read().len(), 1);
    }

    #[test]
    fn test_file_store_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_health.json");
        let store = FileHealthStore::new(&path, DEFAULT_HEALTH_TTL, Arc::new(ManualClock::at(1)));
        store.record_success("https://a");
        store.clear();
        assert!(!path.exists());
        assert!(store.read().is_empty());
        // Clearing twice is fine
        store.clear();
    }
}
