//! In-process query cache with the same key layout and TTL semantics as the
//! Redis backend. Used by tests and single-node local runs.

use super::entry;
use super::keys::{glob_match, CacheKeyspace};
use super::traits::{CacheConfig, CacheStats, QueryCache, StatsRecorder};
use async_trait::async_trait;
use fleet_core::{FieldMap, FleetResult, QueryFingerprint, ServerId, ServerRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct StoredEntry {
    fields: FieldMap,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug)]
pub struct InMemoryQueryCache {
    keys: CacheKeyspace,
    config: CacheConfig,
    entries: RwLock<HashMap<String, StoredEntry>>,
    stats: StatsRecorder,
}

impl Default for InMemoryQueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl InMemoryQueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            keys: CacheKeyspace::new(config.prefix.clone()),
            config,
            entries: RwLock::new(HashMap::new()),
            stats: StatsRecorder::default(),
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Live keys matching a glob, sorted.
    pub async fn keys_matching(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| e.is_live(now) && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    async fn remove_matching(&self, pattern: &str) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut removed_live = 0;
        entries.retain(|k, e| {
            let doomed = !e.is_live(now) || glob_match(pattern, k);
            if doomed && e.is_live(now) {
                removed_live += 1;
            }
            !doomed
        });
        self.stats.invalidated(removed_live);
        removed_live
    }
}

#[async_trait]
impl QueryCache for InMemoryQueryCache {
    async fn exists(&self, fp: &QueryFingerprint) -> FleetResult<bool> {
        let found = !self
            .keys_matching(&self.keys.partition_pattern(fp))
            .await
            .is_empty();
        self.stats.lookup(found);
        Ok(found)
    }

    async fn put(&self, fp: &QueryFingerprint, records: &[ServerRecord]) -> FleetResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let expires_at = Instant::now() + self.config.entry_ttl;
        let mut entries = self.entries.write().await;
        for (position, record) in records.iter().enumerate() {
            entries.insert(
                self.keys.entry(fp, record.id),
                StoredEntry {
                    fields: entry::encode(record, position),
                    expires_at,
                },
            );
        }
        self.stats.wrote(records.len());
        Ok(())
    }

    async fn get(&self, fp: &QueryFingerprint) -> FleetResult<Vec<ServerRecord>> {
        let pattern = self.keys.partition_pattern(fp);
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut decoded = Vec::new();
        for (key, stored) in entries.iter() {
            if stored.is_live(now) && glob_match(&pattern, key) {
                decoded.push(entry::decode(key, stored.fields.clone())?);
            }
        }
        Ok(entry::into_ordered(decoded))
    }

    async fn update_all_occurrences_of(&self, record: &ServerRecord) -> FleetResult<usize> {
        let pattern = self.keys.occurrences_pattern(record.id);
        let now = Instant::now();
        let expires_at = now + self.config.entry_ttl;
        let mut entries = self.entries.write().await;
        let mut rewritten = 0;
        for (key, stored) in entries.iter_mut() {
            if !stored.is_live(now) || !glob_match(&pattern, key) {
                continue;
            }
            let position = entry::position_of(&stored.fields).unwrap_or_default();
            stored.fields = entry::encode(record, position);
            stored.expires_at = expires_at;
            rewritten += 1;
        }
        self.stats.wrote(rewritten);
        Ok(rewritten)
    }

    async fn delete_all_occurrences_of(&self, id: ServerId) -> FleetResult<usize> {
        Ok(self.remove_matching(&self.keys.occurrences_pattern(id)).await)
    }

    async fn partitions_containing(&self, id: ServerId) -> FleetResult<Vec<QueryFingerprint>> {
        let mut fps: Vec<QueryFingerprint> = self
            .keys_matching(&self.keys.occurrences_pattern(id))
            .await
            .iter()
            .filter_map(|k| self.keys.parse(k).map(|(fp, _)| fp))
            .collect();
        fps.dedup();
        Ok(fps)
    }

    async fn delete_partition(&self, fp: &QueryFingerprint) -> FleetResult<usize> {
        Ok(self.remove_matching(&self.keys.partition_pattern(fp)).await)
    }

    async fn flush(&self) -> FleetResult<usize> {
        Ok(self.remove_matching(&self.keys.all_pattern()).await)
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use fleet_core::{NewServer, ServerStatus};
    use std::time::Duration;

    fn records(n: usize) -> Vec<ServerRecord> {
        let base = Utc::now();
        (0..n)
            .map(|i| {
                NewServer::new(format!("srv-{}", i), format!("10.0.0.{}", i))
                    .into_record(base + ChronoDuration::seconds(i as i64))
            })
            .collect()
    }

    fn fp(s: &str) -> QueryFingerprint {
        QueryFingerprint::from_hex(s)
    }

    #[tokio::test]
    async fn test_put_then_get_preserves_order() {
        let cache = InMemoryQueryCache::default();
        let mut rows = records(5);
        rows.reverse();
        cache.put(&fp("a"), &rows).await.unwrap();
        assert!(cache.exists(&fp("a")).await.unwrap());
        assert_eq!(cache.get(&fp("a")).await.unwrap(), rows);
    }

    #[tokio::test]
    async fn test_empty_put_writes_nothing() {
        let cache = InMemoryQueryCache::default();
        cache.put(&fp("a"), &[]).await.unwrap();
        assert!(!cache.exists(&fp("a")).await.unwrap());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_rewrites_every_partition_in_place() {
        let cache = InMemoryQueryCache::default();
        let rows = records(3);
        cache.put(&fp("a"), &rows).await.unwrap();
        cache.put(&fp("b"), &rows[1..]).await.unwrap();

        let mut changed = rows[1].clone();
        changed.name = "renamed".to_string();
        assert_eq!(cache.update_all_occurrences_of(&changed).await.unwrap(), 2);

        let a = cache.get(&fp("a")).await.unwrap();
        let b = cache.get(&fp("b")).await.unwrap();
        assert_eq!(a[1], changed);
        assert_eq!(b[0], changed);
    }

    #[tokio::test]
    async fn test_delete_occurrences_and_partitions() {
        let cache = InMemoryQueryCache::default();
        let rows = records(3);
        cache.put(&fp("a"), &rows).await.unwrap();
        cache.put(&fp("b"), &rows[..1]).await.unwrap();

        let holding = cache.partitions_containing(rows[0].id).await.unwrap();
        assert_eq!(holding, vec![fp("a"), fp("b")]);

        assert_eq!(cache.delete_all_occurrences_of(rows[0].id).await.unwrap(), 2);
        assert!(!cache.exists(&fp("b")).await.unwrap());
        assert_eq!(cache.get(&fp("a")).await.unwrap().len(), 2);

        assert_eq!(cache.delete_partition(&fp("a")).await.unwrap(), 2);
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().invalidations, 4);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = InMemoryQueryCache::new(
            CacheConfig::new().with_ttl(Duration::from_millis(20)),
        );
        cache.put(&fp("a"), &records(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!cache.exists(&fp("a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_flush_respects_prefix() {
        let cache = InMemoryQueryCache::new(CacheConfig::new().with_prefix("other"));
        let mut rows = records(2);
        rows[0].status = ServerStatus::On;
        cache.put(&fp("a"), &rows).await.unwrap();
        assert_eq!(cache.flush().await.unwrap(), 2);
        assert!(cache.is_empty().await);
    }
}
