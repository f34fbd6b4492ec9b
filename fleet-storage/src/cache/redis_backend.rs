//! Redis-backed query cache.
//!
//! Each entry is a Redis hash. Partition writes go through one MULTI/EXEC
//! pipeline so concurrent readers see either none or all of a partition, and
//! every key enumeration uses `SCAN MATCH` so large keyspaces never block the
//! server the way `KEYS` would. In-place rewrites run as one Lua script that
//! only touches entries still present.

use super::entry;
use super::keys::CacheKeyspace;
use super::traits::{CacheConfig, CacheStats, QueryCache, StatsRecorder};
use async_trait::async_trait;
use fleet_core::{
    CacheError, FieldMap, FleetError, FleetResult, QueryFingerprint, ServerId, ServerRecord,
};
use redis::aio::ConnectionManager;
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Client, Script};
use tracing::{debug, warn};

/// Keys deleted per DEL command.
const DELETE_CHUNK: usize = 500;

/// Rewrite each entry in KEYS that still exists, keeping its position.
///
/// ARGV[1] is the TTL in seconds, the rest are field/value pairs. Keys that
/// were deleted or expired after the SCAN are skipped, so a concurrent
/// delete is never undone and no partition gains a lone entry.
static REWRITE_LIVE_ENTRIES: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local rewritten = 0
for _, key in ipairs(KEYS) do
    local position = redis.call('HGET', key, 'position')
    if position then
        redis.call('DEL', key)
        redis.call('HSET', key, 'position', position, unpack(ARGV, 2))
        redis.call('EXPIRE', key, ARGV[1])
        rewritten = rewritten + 1
    end
end
return rewritten
"#,
    )
});

/// Error type for Redis cache operations.
#[derive(Debug, thiserror::Error)]
pub enum RedisCacheError {
    /// Connection or command failure reported by the client.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The partition could not be written and was rolled back.
    #[error("Partition {fingerprint} write failed: {reason}")]
    PartitionWrite { fingerprint: String, reason: String },
}

/// Convert RedisCacheError to FleetError.
impl From<RedisCacheError> for FleetError {
    fn from(e: RedisCacheError) -> Self {
        FleetError::Cache(CacheError::Backend {
            reason: e.to_string(),
        })
    }
}

/// Query cache over a shared, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisQueryCache {
    conn: ConnectionManager,
    keys: CacheKeyspace,
    config: CacheConfig,
    stats: std::sync::Arc<StatsRecorder>,
}

impl std::fmt::Debug for RedisQueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueryCache")
            .field("prefix", &self.keys.prefix())
            .field("config", &self.config)
            .finish()
    }
}

impl RedisQueryCache {
    /// Connect to `url` (for example `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str, config: CacheConfig) -> Result<Self, RedisCacheError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(
            prefix = %config.prefix,
            ttl_secs = config.entry_ttl.as_secs(),
            "Redis query cache connected"
        );
        Ok(Self {
            conn,
            keys: CacheKeyspace::new(config.prefix.clone()),
            config,
            stats: Default::default(),
        })
    }

    fn ttl_secs(&self) -> i64 {
        self.config.entry_ttl.as_secs().max(1) as i64
    }

    /// SCAN the keyspace. With `first_only` the walk stops at the first match.
    async fn scan(&self, pattern: &str, first_only: bool) -> Result<Vec<String>, RedisCacheError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.config.scan_count)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 || (first_only && !keys.is_empty()) {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<usize, RedisCacheError> {
        let mut conn = self.conn.clone();
        let mut removed = 0;
        for chunk in keys.chunks(DELETE_CHUNK) {
            let n: usize = conn.del(chunk).await?;
            removed += n;
        }
        self.stats.invalidated(removed);
        Ok(removed)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, RedisCacheError> {
        let keys = self.scan(pattern, false).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.delete_keys(&keys).await
    }

    async fn write_partition(
        &self,
        fp: &QueryFingerprint,
        records: &[ServerRecord],
    ) -> Result<(), RedisCacheError> {
        let ttl = self.ttl_secs();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (position, record) in records.iter().enumerate() {
            let key = self.keys.entry(fp, record.id);
            let fields: Vec<(String, String)> =
                entry::encode(record, position).into_iter().collect();
            pipe.hset_multiple(&key, &fields).ignore();
            pipe.expire(&key, ttl).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl QueryCache for RedisQueryCache {
    async fn exists(&self, fp: &QueryFingerprint) -> FleetResult<bool> {
        let found = !self
            .scan(&self.keys.partition_pattern(fp), true)
            .await?
            .is_empty();
        self.stats.lookup(found);
        Ok(found)
    }

    async fn put(&self, fp: &QueryFingerprint, records: &[ServerRecord]) -> FleetResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.write_partition(fp, records).await {
            if let Err(cleanup) = self.delete_matching(&self.keys.partition_pattern(fp)).await {
                warn!(
                    fingerprint = %fp,
                    error = %cleanup,
                    "Failed to drop partially written partition"
                );
            }
            return Err(RedisCacheError::PartitionWrite {
                fingerprint: fp.to_string(),
                reason: e.to_string(),
            }
            .into());
        }
        self.stats.wrote(records.len());
        Ok(())
    }

    async fn get(&self, fp: &QueryFingerprint) -> FleetResult<Vec<ServerRecord>> {
        let keys = self.scan(&self.keys.partition_pattern(fp), false).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hgetall(key);
        }
        let mut conn = self.conn.clone();
        let maps: Vec<FieldMap> = pipe
            .query_async(&mut conn)
            .await
            .map_err(RedisCacheError::from)?;

        let mut decoded = Vec::with_capacity(maps.len());
        for (key, fields) in keys.iter().zip(maps) {
            // Expired between SCAN and HGETALL.
            if fields.is_empty() {
                continue;
            }
            decoded.push(entry::decode(key, fields)?);
        }
        Ok(entry::into_ordered(decoded))
    }

    async fn update_all_occurrences_of(&self, record: &ServerRecord) -> FleetResult<usize> {
        let keys = self
            .scan(&self.keys.occurrences_pattern(record.id), false)
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut invocation = REWRITE_LIVE_ENTRIES.prepare_invoke();
        for key in &keys {
            invocation.key(key);
        }
        invocation.arg(self.ttl_secs());
        for (field, value) in record.to_field_map() {
            invocation.arg(field).arg(value);
        }
        let mut conn = self.conn.clone();
        let rewritten: usize = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(RedisCacheError::from)?;
        self.stats.wrote(rewritten);
        Ok(rewritten)
    }

    async fn delete_all_occurrences_of(&self, id: ServerId) -> FleetResult<usize> {
        Ok(self.delete_matching(&self.keys.occurrences_pattern(id)).await?)
    }

    async fn partitions_containing(&self, id: ServerId) -> FleetResult<Vec<QueryFingerprint>> {
        let keys = self.scan(&self.keys.occurrences_pattern(id), false).await?;
        let mut fps: Vec<QueryFingerprint> = keys
            .iter()
            .filter_map(|k| self.keys.parse(k).map(|(fp, _)| fp))
            .collect();
        fps.sort();
        fps.dedup();
        Ok(fps)
    }

    async fn delete_partition(&self, fp: &QueryFingerprint) -> FleetResult<usize> {
        Ok(self.delete_matching(&self.keys.partition_pattern(fp)).await?)
    }

    async fn flush(&self) -> FleetResult<usize> {
        Ok(self.delete_matching(&self.keys.all_pattern()).await?)
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
