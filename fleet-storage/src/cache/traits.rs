//! Query cache contract, settings and statistics.

use async_trait::async_trait;
use fleet_core::{FleetResult, QueryFingerprint, ServerId, ServerRecord};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Field that records an entry's index in its cached result.
pub const POSITION_FIELD: &str = "position";

/// Result-set cache for list queries, partitioned by query fingerprint.
///
/// A partition holds one entry per record in the result, each a flattened
/// field map plus [`POSITION_FIELD`]. Entries expire individually after
/// [`CacheConfig::entry_ttl`]; every write to a key refreshes its TTL.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// True iff at least one entry of the partition is present.
    async fn exists(&self, fp: &QueryFingerprint) -> FleetResult<bool>;

    /// Write a whole partition. Readers never observe it half written; on
    /// failure the partition is removed before the error is returned.
    /// An empty result writes nothing.
    async fn put(&self, fp: &QueryFingerprint, records: &[ServerRecord]) -> FleetResult<()>;

    /// Read a partition in its original order.
    async fn get(&self, fp: &QueryFingerprint) -> FleetResult<Vec<ServerRecord>>;

    /// Rewrite every cached copy of the record in place, keeping positions.
    /// Returns the number of copies rewritten.
    async fn update_all_occurrences_of(&self, record: &ServerRecord) -> FleetResult<usize>;

    /// Drop every cached copy of the record. Returns the number dropped.
    async fn delete_all_occurrences_of(&self, id: ServerId) -> FleetResult<usize>;

    /// Fingerprints of every partition holding a copy of the record.
    async fn partitions_containing(&self, id: ServerId) -> FleetResult<Vec<QueryFingerprint>>;

    /// Drop a whole partition. Returns the number of entries dropped.
    async fn delete_partition(&self, fp: &QueryFingerprint) -> FleetResult<usize>;

    /// Drop everything under the prefix.
    async fn flush(&self) -> FleetResult<usize>;

    fn stats(&self) -> CacheStats;
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// `exists` calls that found the partition.
    pub hits: u64,
    /// `exists` calls that did not.
    pub misses: u64,
    /// Entries written by `put` and `update_all_occurrences_of`.
    pub writes: u64,
    /// Entries removed by any delete path.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

impl StatsRecorder {
    pub fn lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn wrote(&self, n: usize) {
        self.writes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn invalidated(&self, n: usize) {
        self.invalidations.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Settings shared by every cache backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Leading key segment.
    pub prefix: String,
    /// Lifetime of every entry, refreshed on write.
    pub entry_ttl: Duration,
    /// COUNT hint passed to SCAN.
    pub scan_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "list".to_string(),
            entry_ttl: Duration::from_secs(3600),
            scan_count: 100,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let recorder = StatsRecorder::default();
        assert_eq!(recorder.snapshot().hit_rate(), 0.0);
        recorder.lookup(true);
        recorder.lookup(true);
        recorder.lookup(false);
        recorder.lookup(true);
        assert_eq!(recorder.snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_config_defaults() {
        let config = CacheConfig::new();
        assert_eq!(config.prefix, "list");
        assert_eq!(config.entry_ttl, Duration::from_secs(3600));
        assert_eq!(CacheConfig::new().with_scan_count(0).scan_count, 1);
    }
}
