//! Cached Inventory Client
//!
//! [`CachedInventory`] wraps any [`InventoryStore`] with a [`QueryCache`] and
//! is itself an `InventoryStore`, so handlers call it exactly like the store.
//!
//! Reads: only list queries in the store's natural order (unset or
//! `created_at`) are cached, keyed by the query fingerprint. A cache failure
//! on the read path is logged and the read falls through to the store.
//!
//! Writes: the store is written first. Updates compare the record before and
//! after the write. When status, name or ipv4 changed, the record may have
//! left a status or search partition, so every partition holding it is
//! dropped. Otherwise every cached copy is rewritten in place. Deletes drop
//! every cached copy. Cache failures on the write path are returned to the
//! caller; the store write has already happened.
//!
//! Creates never touch the cache, so a new row becomes visible in a cached
//! partition only after the partition expires.

use async_trait::async_trait;
use fleet_core::{
    FleetError, FleetResult, ImportReport, NewServer, QueryFingerprint, ServerId, ServerPatch,
    ServerQuery, ServerRecord, UserId,
};
use fleet_storage::{InventoryStore, QueryCache};
use std::sync::Arc;

use crate::telemetry::{with_metrics, CacheOutcome};

/// Cache-aside proxy over an inventory store.
pub struct CachedInventory<S, C> {
    /// The system of record.
    store: Arc<S>,
    /// The list query cache.
    cache: Arc<C>,
}

impl<S, C> Clone for CachedInventory<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S, C> CachedInventory<S, C>
where
    S: InventoryStore,
    C: QueryCache,
{
    pub fn new(store: Arc<S>, cache: Arc<C>) -> Self {
        Self { store, cache }
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Serve a cacheable query from the cache, or `None` when the partition
    /// is absent or the cache could not be read.
    async fn read_cached(&self, fp: &QueryFingerprint) -> Option<Vec<ServerRecord>> {
        match self.cache.exists(fp).await {
            Ok(true) => {}
            Ok(false) => {
                with_metrics(|m| m.record_cache_lookup(CacheOutcome::Miss));
                return None;
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fp, error = %e, "Cache lookup failed, reading store");
                with_metrics(|m| m.record_cache_lookup(CacheOutcome::Error));
                return None;
            }
        }
        match self.cache.get(fp).await {
            // Entries can expire between the two calls.
            Ok(records) if records.is_empty() => {
                with_metrics(|m| m.record_cache_lookup(CacheOutcome::Miss));
                None
            }
            Ok(records) => {
                with_metrics(|m| m.record_cache_lookup(CacheOutcome::Hit));
                Some(records)
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fp, error = %e, "Cache read failed, reading store");
                with_metrics(|m| m.record_cache_lookup(CacheOutcome::Error));
                None
            }
        }
    }

    /// Bring the cache in line with an updated record. `before` is `None`
    /// when the record could not be read ahead of the write.
    async fn refresh_after_update(
        &self,
        before: Option<&ServerRecord>,
        updated: &ServerRecord,
    ) -> FleetResult<()> {
        let membership_may_change = before.map_or(true, |b| b.filtered_fields_differ(updated));
        if membership_may_change {
            // The record may now belong to a different set of partitions.
            let partitions = self.cache.partitions_containing(updated.id).await?;
            let mut purged = 0;
            for fp in &partitions {
                purged += self.cache.delete_partition(fp).await?;
            }
            tracing::debug!(
                server_id = %updated.id,
                partitions = partitions.len(),
                entries = purged,
                "Purged partitions after filtered-field update"
            );
            with_metrics(|m| m.record_cache_invalidation("partition_purge", purged));
        } else {
            let rewritten = self.cache.update_all_occurrences_of(updated).await?;
            tracing::debug!(
                server_id = %updated.id,
                entries = rewritten,
                "Rewrote cached copies after update"
            );
            with_metrics(|m| m.record_cache_invalidation("rewrite", rewritten));
        }
        Ok(())
    }

    async fn purge_after_delete(&self, id: ServerId) -> FleetResult<()> {
        let removed = self.cache.delete_all_occurrences_of(id).await?;
        tracing::debug!(server_id = %id, entries = removed, "Dropped cached copies after delete");
        with_metrics(|m| m.record_cache_invalidation("delete", removed));
        Ok(())
    }
}

#[async_trait]
impl<S, C> InventoryStore for CachedInventory<S, C>
where
    S: InventoryStore,
    C: QueryCache,
{
    async fn find(&self, query: &ServerQuery) -> FleetResult<Vec<ServerRecord>> {
        if !query.uses_default_order() {
            with_metrics(|m| m.record_cache_lookup(CacheOutcome::Bypass));
            return self.store.find(query).await;
        }

        let fp = QueryFingerprint::of(query)?;
        if let Some(records) = self.read_cached(&fp).await {
            return Ok(records);
        }

        let records = self.store.find(query).await?;
        if let Err(e) = self.cache.put(&fp, &records).await {
            tracing::warn!(fingerprint = %fp, error = %e, "Failed to backfill query cache");
        }
        Ok(records)
    }

    async fn count(&self, query: &ServerQuery) -> FleetResult<i64> {
        self.store.count(query).await
    }

    async fn find_by_id(&self, id: ServerId) -> FleetResult<Option<ServerRecord>> {
        self.store.find_by_id(id).await
    }

    async fn find_by_name(&self, name: &str) -> FleetResult<Option<ServerRecord>> {
        self.store.find_by_name(name).await
    }

    async fn exists(&self, candidate: &NewServer) -> FleetResult<bool> {
        self.store.exists(candidate).await
    }

    async fn create(&self, server: NewServer) -> FleetResult<ServerRecord> {
        self.store.create(server).await
    }

    async fn update_by_id(&self, id: ServerId, patch: ServerPatch) -> FleetResult<ServerRecord> {
        let before = self.store.find_by_id(id).await?;
        let updated = self.store.update_by_id(id, patch).await?;
        self.refresh_after_update(before.as_ref(), &updated).await?;
        Ok(updated)
    }

    async fn update_by_name(&self, name: &str, patch: ServerPatch) -> FleetResult<ServerRecord> {
        let before = self.store.find_by_name(name).await?;
        let updated = self.store.update_by_name(name, patch).await?;
        self.refresh_after_update(before.as_ref(), &updated).await?;
        Ok(updated)
    }

    async fn delete_by_id(&self, id: ServerId, actor: Option<UserId>) -> FleetResult<ServerRecord> {
        let deleted = self.store.delete_by_id(id, actor).await?;
        self.purge_after_delete(deleted.id).await?;
        Ok(deleted)
    }

    async fn delete_by_name(
        &self,
        name: &str,
        actor: Option<UserId>,
    ) -> FleetResult<ServerRecord> {
        let id = self
            .store
            .find_by_name(name)
            .await?
            .map(|r| r.id)
            .ok_or_else(|| FleetError::server_not_found(name))?;
        let deleted = self.store.delete_by_name(name, actor).await?;
        self.purge_after_delete(id).await?;
        Ok(deleted)
    }

    async fn create_batch(
        &self,
        actor: UserId,
        candidates: Vec<NewServer>,
    ) -> FleetResult<ImportReport> {
        self.store.create_batch(actor, candidates).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{ServerStatus, SortColumn, SortDirection};
    use fleet_test_utils::fixtures::{seeded_inventory, servers};
    use fleet_test_utils::{CacheCall, FailingQueryCache, MockInventory, SpyQueryCache};

    fn proxy(n: usize) -> (CachedInventory<MockInventory, SpyQueryCache>, SpyQueryCache) {
        let spy = SpyQueryCache::new();
        let proxy = CachedInventory::new(Arc::new(seeded_inventory(n)), Arc::new(spy.clone()));
        (proxy, spy)
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let (proxy, spy) = proxy(4);
        let first = proxy.find(&ServerQuery::all()).await.unwrap();
        let second = proxy.find(&ServerQuery::all()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(spy.count(CacheCall::Put), 1);
        assert_eq!(spy.count(CacheCall::Get), 1);
    }

    #[tokio::test]
    async fn test_created_at_desc_is_cacheable() {
        let (proxy, spy) = proxy(3);
        let query = ServerQuery::all().ordered_by(SortColumn::CreatedAt, SortDirection::Desc);
        proxy.find(&query).await.unwrap();
        assert_eq!(spy.count(CacheCall::Put), 1);
    }

    #[tokio::test]
    async fn test_explicit_sort_bypasses_cache() {
        let (proxy, spy) = proxy(3);
        let query = ServerQuery::all().ordered_by(SortColumn::Name, SortDirection::Asc);
        let rows = proxy.find(&query).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(spy.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_cached() {
        let (proxy, spy) = proxy(0);
        assert!(proxy.find(&ServerQuery::all()).await.unwrap().is_empty());
        assert!(spy.inner().is_empty().await);
    }

    #[tokio::test]
    async fn test_unreachable_cache_degrades_to_store() {
        let store = Arc::new(seeded_inventory(2));
        let proxy = CachedInventory::new(store, Arc::new(FailingQueryCache::unreachable()));
        assert_eq!(proxy.find(&ServerQuery::all()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_without_filtered_change_rewrites_in_place() {
        let (proxy, spy) = proxy(3);
        let cached = proxy.find(&ServerQuery::all()).await.unwrap();
        let target = &cached[1];

        let updated = proxy
            .update_by_id(target.id, ServerPatch::new().with_ipv4(target.ipv4.clone()).by(7))
            .await
            .unwrap();
        assert_eq!(spy.count(CacheCall::UpdateAllOccurrences), 1);
        assert_eq!(spy.count(CacheCall::DeletePartition), 0);

        let again = proxy.find(&ServerQuery::all()).await.unwrap();
        assert_eq!(again[1].id, updated.id);
        assert_eq!(again[1].updated_by, Some(7));
    }

    #[tokio::test]
    async fn test_rename_drops_search_partition_it_left() {
        let (proxy, spy) = proxy(4);
        let search = ServerQuery::all().searching("srv-001");
        assert_eq!(proxy.find(&search).await.unwrap().len(), 1);

        proxy
            .update_by_name("srv-001", ServerPatch::new().with_name("db-primary").by(2))
            .await
            .unwrap();
        assert_eq!(spy.count(CacheCall::UpdateAllOccurrences), 0);
        assert_eq!(spy.count(CacheCall::DeletePartition), 1);

        assert!(proxy.find(&search).await.unwrap().is_empty());
        assert!(proxy.store().find(&search).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_readdress_drops_search_partition_it_left() {
        let (proxy, _spy) = proxy(4);
        let target = proxy.find_by_name("srv-002").await.unwrap().unwrap();
        let search = ServerQuery::all().searching(&target.ipv4);
        proxy.find(&search).await.unwrap();

        proxy
            .update_by_id(target.id, ServerPatch::new().with_ipv4("192.0.2.200"))
            .await
            .unwrap();
        let cached = proxy.find(&search).await.unwrap();
        let fresh = proxy.store().find(&search).await.unwrap();
        assert_eq!(cached, fresh);
    }

    #[tokio::test]
    async fn test_status_update_purges_partitions() {
        let (proxy, spy) = proxy(3);
        proxy.find(&ServerQuery::all()).await.unwrap();
        let target = servers(3)[0].name.clone();

        proxy
            .update_by_name(&target, ServerPatch::new().with_status(ServerStatus::Off))
            .await
            .unwrap();
        assert_eq!(spy.count(CacheCall::PartitionsContaining), 1);
        assert_eq!(spy.count(CacheCall::DeletePartition), 1);
        assert!(spy.inner().is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_by_name_purges_every_copy() {
        let (proxy, _spy) = proxy(3);
        let rows = proxy.find(&ServerQuery::all()).await.unwrap();
        proxy
            .delete_by_name(&rows[0].name, Some(1))
            .await
            .unwrap();
        let after = proxy.find(&ServerQuery::all()).await.unwrap();
        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|r| r.id != rows[0].id));
    }

    #[tokio::test]
    async fn test_delete_unknown_name_is_not_found() {
        let (proxy, spy) = proxy(1);
        let err = proxy.delete_by_name("ghost", None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(spy.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalidation_failure_is_surfaced() {
        let store = Arc::new(seeded_inventory(2));
        let id = store.find(&ServerQuery::all()).await.unwrap()[0].id;
        let cache = FailingQueryCache::new().failing_on(&[CacheCall::DeleteAllOccurrences]);
        let proxy = CachedInventory::new(store.clone(), Arc::new(cache));

        let err = proxy.delete_by_id(id, None).await.unwrap_err();
        assert!(matches!(err, FleetError::Cache(_)));
        // The store write is not rolled back.
        assert!(store.find_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_does_not_touch_cache() {
        let (proxy, spy) = proxy(0);
        proxy
            .create(NewServer::new("fresh", "10.1.1.1"))
            .await
            .unwrap();
        assert_eq!(spy.total_calls(), 0);
    }
}
