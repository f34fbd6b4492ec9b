//! Fleet Test Utilities
//!
//! Centralized test infrastructure for the fleet workspace:
//! - Proptest generators for records, payloads and list requests
//! - Spy and failing query caches for observing the cache-aside layer
//! - Test fixtures for common scenarios
//! - Custom assertions for fleet error kinds

// Re-export in-memory stores from their source crate
pub use fleet_storage::{InMemoryQueryCache, MockFileArtifacts, MockInventory};

// Re-export core types for convenience
pub use fleet_core::{
    CacheError, FleetError, FleetResult, ListServersRequest, NewServer, Pagination,
    QueryFingerprint, ServerFilter, ServerId, ServerPatch, ServerQuery, ServerRecord,
    ServerStatus, SortColumn, SortDirection, StorageError, Timestamp, UserId, ValidationError,
};

use async_trait::async_trait;
use chrono::Utc;
use fleet_storage::{CacheStats, QueryCache};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ============================================================================
// CACHE DOUBLES
// ============================================================================

/// One query cache operation, as recorded by [`SpyQueryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCall {
    Exists,
    Put,
    Get,
    UpdateAllOccurrences,
    DeleteAllOccurrences,
    PartitionsContaining,
    DeletePartition,
    Flush,
}

/// Query cache that records every call before delegating to an inner cache.
/// Clones share the inner cache and the call log.
#[derive(Debug)]
pub struct SpyQueryCache<C = InMemoryQueryCache> {
    inner: Arc<C>,
    calls: Arc<Mutex<Vec<CacheCall>>>,
}

impl<C> Clone for SpyQueryCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl SpyQueryCache<InMemoryQueryCache> {
    /// Spy over a fresh in-memory cache.
    pub fn new() -> Self {
        Self::wrap(InMemoryQueryCache::default())
    }
}

impl Default for SpyQueryCache<InMemoryQueryCache> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: QueryCache> SpyQueryCache<C> {
    pub fn wrap(inner: C) -> Self {
        Self {
            inner: Arc::new(inner),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<CacheCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls().len()
    }

    pub fn count(&self, call: CacheCall) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    pub fn reset(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record(&self, call: CacheCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl<C: QueryCache> QueryCache for SpyQueryCache<C> {
    async fn exists(&self, fp: &QueryFingerprint) -> FleetResult<bool> {
        self.record(CacheCall::Exists);
        self.inner.exists(fp).await
    }

    async fn put(&self, fp: &QueryFingerprint, records: &[ServerRecord]) -> FleetResult<()> {
        self.record(CacheCall::Put);
        self.inner.put(fp, records).await
    }

    async fn get(&self, fp: &QueryFingerprint) -> FleetResult<Vec<ServerRecord>> {
        self.record(CacheCall::Get);
        self.inner.get(fp).await
    }

    async fn update_all_occurrences_of(&self, record: &ServerRecord) -> FleetResult<usize> {
        self.record(CacheCall::UpdateAllOccurrences);
        self.inner.update_all_occurrences_of(record).await
    }

    async fn delete_all_occurrences_of(&self, id: ServerId) -> FleetResult<usize> {
        self.record(CacheCall::DeleteAllOccurrences);
        self.inner.delete_all_occurrences_of(id).await
    }

    async fn partitions_containing(&self, id: ServerId) -> FleetResult<Vec<QueryFingerprint>> {
        self.record(CacheCall::PartitionsContaining);
        self.inner.partitions_containing(id).await
    }

    async fn delete_partition(&self, fp: &QueryFingerprint) -> FleetResult<usize> {
        self.record(CacheCall::DeletePartition);
        self.inner.delete_partition(fp).await
    }

    async fn flush(&self) -> FleetResult<usize> {
        self.record(CacheCall::Flush);
        self.inner.flush().await
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

/// Query cache whose selected operations fail with a backend error.
#[derive(Debug)]
pub struct FailingQueryCache<C = InMemoryQueryCache> {
    inner: Arc<C>,
    failing: HashSet<CacheCall>,
}

impl<C> Clone for FailingQueryCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            failing: self.failing.clone(),
        }
    }
}

impl FailingQueryCache<InMemoryQueryCache> {
    pub fn new() -> Self {
        Self::wrap(InMemoryQueryCache::default())
    }

    /// Every operation fails.
    pub fn unreachable() -> Self {
        use CacheCall::*;
        Self::new().failing_on(&[
            Exists,
            Put,
            Get,
            UpdateAllOccurrences,
            DeleteAllOccurrences,
            PartitionsContaining,
            DeletePartition,
            Flush,
        ])
    }
}

impl Default for FailingQueryCache<InMemoryQueryCache> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: QueryCache> FailingQueryCache<C> {
    pub fn wrap(inner: C) -> Self {
        Self {
            inner: Arc::new(inner),
            failing: HashSet::new(),
        }
    }

    pub fn failing_on(mut self, calls: &[CacheCall]) -> Self {
        self.failing.extend(calls.iter().copied());
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn check(&self, call: CacheCall) -> FleetResult<()> {
        if self.failing.contains(&call) {
            return Err(CacheError::Backend {
                reason: format!("injected failure on {:?}", call),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl<C: QueryCache> QueryCache for FailingQueryCache<C> {
    async fn exists(&self, fp: &QueryFingerprint) -> FleetResult<bool> {
        self.check(CacheCall::Exists)?;
        self.inner.exists(fp).await
    }

    async fn put(&self, fp: &QueryFingerprint, records: &[ServerRecord]) -> FleetResult<()> {
        self.check(CacheCall::Put)?;
        self.inner.put(fp, records).await
    }

    async fn get(&self, fp: &QueryFingerprint) -> FleetResult<Vec<ServerRecord>> {
        self.check(CacheCall::Get)?;
        self.inner.get(fp).await
    }

    async fn update_all_occurrences_of(&self, record: &ServerRecord) -> FleetResult<usize> {
        self.check(CacheCall::UpdateAllOccurrences)?;
        self.inner.update_all_occurrences_of(record).await
    }

    async fn delete_all_occurrences_of(&self, id: ServerId) -> FleetResult<usize> {
        self.check(CacheCall::DeleteAllOccurrences)?;
        self.inner.delete_all_occurrences_of(id).await
    }

    async fn partitions_containing(&self, id: ServerId) -> FleetResult<Vec<QueryFingerprint>> {
        self.check(CacheCall::PartitionsContaining)?;
        self.inner.partitions_containing(id).await
    }

    async fn delete_partition(&self, fp: &QueryFingerprint) -> FleetResult<usize> {
        self.check(CacheCall::DeletePartition)?;
        self.inner.delete_partition(fp).await
    }

    async fn flush(&self) -> FleetResult<usize> {
        self.check(CacheCall::Flush)?;
        self.inner.flush().await
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating fleet types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_server_status() -> impl Strategy<Value = ServerStatus> {
        prop_oneof![
            Just(ServerStatus::On),
            Just(ServerStatus::Off),
            Just(ServerStatus::None),
        ]
    }

    /// Generate a dotted-quad address.
    pub fn arb_ipv4() -> impl Strategy<Value = String> {
        any::<[u8; 4]>().prop_map(|o| format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3]))
    }

    /// Generate a host-like server name.
    pub fn arb_server_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}"
    }

    pub fn arb_sort_column() -> impl Strategy<Value = SortColumn> {
        prop_oneof![
            Just(SortColumn::Id),
            Just(SortColumn::Name),
            Just(SortColumn::Ipv4),
            Just(SortColumn::Status),
            Just(SortColumn::CreatedAt),
            Just(SortColumn::UpdatedAt),
        ]
    }

    pub fn arb_sort_direction() -> impl Strategy<Value = SortDirection> {
        prop_oneof![
            Just(SortDirection::None),
            Just(SortDirection::Asc),
            Just(SortDirection::Desc),
        ]
    }

    pub fn arb_new_server() -> impl Strategy<Value = NewServer> {
        (
            proptest::option::of(arb_uuid()),
            arb_server_name(),
            arb_ipv4(),
            arb_server_status(),
            proptest::option::of(1i64..1000),
        )
            .prop_map(|(id, name, ipv4, status, created_by)| NewServer {
                id,
                name,
                ipv4,
                status,
                created_by,
            })
    }

    /// Generate a live stored record.
    pub fn arb_server_record() -> impl Strategy<Value = ServerRecord> {
        (
            arb_uuid(),
            arb_new_server(),
            arb_timestamp(),
            proptest::option::of(arb_timestamp()),
            proptest::option::of(1i64..1000),
        )
            .prop_map(|(id, server, created_at, updated_at, updated_by)| {
                let mut record = server.with_id(id).into_record(created_at);
                record.updated_at = updated_at;
                record.updated_by = updated_by;
                record
            })
    }

    /// Generate a filter whose bounds are well-formed RFC3339.
    pub fn arb_server_filter() -> impl Strategy<Value = ServerFilter> {
        (
            proptest::option::of(arb_timestamp()),
            proptest::option::of(arb_timestamp()),
            proptest::option::of(arb_server_status()),
        )
            .prop_map(|(from, updated_from, status)| ServerFilter {
                created_at_from: from.map(|t| t.to_rfc3339()),
                created_at_to: None,
                updated_at_from: updated_from.map(|t| t.to_rfc3339()),
                updated_at_to: None,
                status,
            })
    }

    pub fn arb_pagination() -> impl Strategy<Value = Pagination> {
        (
            proptest::option::of(0i64..200),
            proptest::option::of(1i64..50),
            proptest::option::of(1i64..100),
            proptest::option::of(arb_sort_column()),
            arb_sort_direction(),
        )
            .prop_map(|(limit, page, page_size, column, sort)| Pagination {
                limit,
                page,
                page_size,
                sort_by: column.map(|c| c.as_sql().to_string()),
                sort,
            })
    }

    /// Generate a list request that resolves without error.
    pub fn arb_list_request() -> impl Strategy<Value = ListServersRequest> {
        (
            proptest::option::of("[a-z0-9.]{1,6}"),
            proptest::option::of(arb_server_filter()),
            proptest::option::of(arb_pagination()),
        )
            .prop_map(|(query, filter, pagination)| ListServersRequest {
                query,
                filter,
                pagination,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::Duration;

    /// A live record created now.
    pub fn server(name: &str, ipv4: &str) -> ServerRecord {
        NewServer::new(name, ipv4).into_record(Utc::now())
    }

    /// `n` live records with strictly increasing `created_at`, alternating
    /// `On` and `Off`.
    pub fn servers(n: usize) -> Vec<ServerRecord> {
        let base = Utc::now() - Duration::hours(1);
        (0..n)
            .map(|i| {
                let status = if i % 2 == 0 {
                    ServerStatus::On
                } else {
                    ServerStatus::Off
                };
                NewServer::new(format!("srv-{:03}", i), format!("10.0.{}.{}", i / 256, i % 256))
                    .with_status(status)
                    .into_record(base + Duration::seconds(i as i64))
            })
            .collect()
    }

    /// An in-memory inventory seeded with [`servers`].
    pub fn seeded_inventory(n: usize) -> MockInventory {
        MockInventory::with_records(servers(n))
    }

    /// Sheet rows from string literals, header first.
    pub fn sheet(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    /// A list request filtering on status only.
    pub fn status_request(status: ServerStatus) -> ListServersRequest {
        ListServersRequest {
            filter: Some(ServerFilter::with_status(status)),
            ..Default::default()
        }
    }

    /// A list request sorted on an explicit column.
    pub fn sorted_request(column: &str, sort: SortDirection) -> ListServersRequest {
        ListServersRequest {
            pagination: Some(Pagination {
                sort_by: Some(column.to_string()),
                sort,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for fleet error kinds.

    use super::*;

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &FleetResult<T>) {
        match result {
            Err(FleetError::Storage(StorageError::NotFound { .. })) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_already_exists<T: std::fmt::Debug>(result: &FleetResult<T>) {
        match result {
            Err(FleetError::Storage(StorageError::AlreadyExists { .. })) => {}
            other => panic!("Expected AlreadyExists error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_input<T: std::fmt::Debug>(result: &FleetResult<T>) {
        match result {
            Err(FleetError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_cache_error<T: std::fmt::Debug>(result: &FleetResult<T>) {
        match result {
            Err(FleetError::Cache(_)) => {}
            other => panic!("Expected Cache error, got: {:?}", other),
        }
    }

    /// Assert two result sets hold the same records in the same order.
    #[track_caller]
    pub fn assert_same_ids(left: &[ServerRecord], right: &[ServerRecord]) {
        let ids = |rows: &[ServerRecord]| rows.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(left), ids(right), "Result sets differ");
    }
}

// ============================================================================
// TESTS
// ============================================================================
