//! Property-Based Tests for Cache-Aside Consistency
//!
//! For any sequence of updates and deletes issued through the cached client,
//! a default-ordered list read through the cache SHALL return the same rows
//! as the same read against the store.

use fleet_api::CachedInventory;
use fleet_core::{ServerPatch, ServerQuery, ServerRecord, ServerStatus};
use fleet_storage::{InMemoryQueryCache, InventoryStore, QueryCache};
use fleet_test_utils::assertions::assert_not_found;
use fleet_test_utils::fixtures::{seeded_inventory, status_request};
use fleet_test_utils::generators::{arb_ipv4, arb_server_status};
use fleet_test_utils::{CacheCall, MockInventory, SpyQueryCache};
use proptest::prelude::*;
use std::sync::Arc;
use tokio::runtime::Runtime;

const SEEDED: usize = 8;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

type Proxy = CachedInventory<MockInventory, InMemoryQueryCache>;

fn proxy() -> Proxy {
    CachedInventory::new(
        Arc::new(seeded_inventory(SEEDED)),
        Arc::new(InMemoryQueryCache::default()),
    )
}

/// Compare what a caller sees, field by field.
fn visible(rows: &[ServerRecord]) -> Vec<(String, String, ServerStatus)> {
    rows.iter()
        .map(|r| (r.name.clone(), r.ipv4.clone(), r.status))
        .collect()
}

// ============================================================================
// PROPERTY TEST STRATEGIES
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Rename { target: usize, suffix: u16 },
    Readdress { target: usize, ipv4: String },
    SetStatus { target: usize, status: ServerStatus },
    Delete { target: usize },
    Read,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let target = 0..SEEDED;
    prop_oneof![
        (target.clone(), any::<u16>()).prop_map(|(target, suffix)| Op::Rename { target, suffix }),
        (target.clone(), arb_ipv4()).prop_map(|(target, ipv4)| Op::Readdress { target, ipv4 }),
        (target.clone(), arb_server_status())
            .prop_map(|(target, status)| Op::SetStatus { target, status }),
        target.prop_map(|target| Op::Delete { target }),
        Just(Op::Read),
    ]
}

async fn apply(proxy: &Proxy, names: &mut [String], op: &Op) {
    let outcome = match op {
        Op::Rename { target, suffix } => {
            let new_name = format!("host-{}-{}", target, suffix);
            let result = proxy
                .update_by_name(&names[*target], ServerPatch::new().with_name(new_name.clone()).by(1))
                .await;
            if result.is_ok() {
                names[*target] = new_name;
            }
            result.map(|_| ())
        }
        Op::Readdress { target, ipv4 } => proxy
            .update_by_name(&names[*target], ServerPatch::new().with_ipv4(ipv4.clone()).by(1))
            .await
            .map(|_| ()),
        Op::SetStatus { target, status } => proxy
            .update_by_name(&names[*target], ServerPatch::new().with_status(*status).by(1))
            .await
            .map(|_| ()),
        Op::Delete { target } => proxy.delete_by_name(&names[*target], Some(1)).await.map(|_| ()),
        Op::Read => proxy.find(&ServerQuery::all()).await.map(|_| ()),
    };
    // Targets may already be deleted; that is the only expected failure.
    if let Err(e) = outcome {
        assert!(e.is_not_found(), "unexpected failure: {:?}", e);
    }
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_cached_reads_match_store_after_writes(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let proxy = proxy();
            let mut names: Vec<String> = (0..SEEDED).map(|i| format!("srv-{:03}", i)).collect();
            // Renamed hosts are called `host-*`, so they leave the search partition.
            let queries = [ServerQuery::all(), ServerQuery::all().searching("srv-00")];

            // Warm every partition before any write.
            for query in &queries {
                proxy.find(query).await.unwrap();
            }

            for op in &ops {
                apply(&proxy, &mut names, op).await;

                for query in &queries {
                    let cached = proxy.find(query).await.unwrap();
                    let fresh = proxy.store().find(query).await.unwrap();
                    assert_eq!(visible(&cached), visible(&fresh), "{:?} after {:?}", query, op);
                }
            }
        });
    }

    #[test]
    fn prop_windowed_partition_holds_only_current_rows(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let proxy = proxy();
            let mut names: Vec<String> = (0..SEEDED).map(|i| format!("srv-{:03}", i)).collect();
            let window = ServerQuery {
                limit: Some(3),
                offset: Some(2),
                ..ServerQuery::all()
            };
            proxy.find(&window).await.unwrap();

            for op in &ops {
                apply(&proxy, &mut names, op).await;

                // A delete can leave the window short until it expires, but
                // every row it still holds is live and current.
                let cached = proxy.find(&window).await.unwrap();
                prop_assert!(cached.len() <= 3);
                for row in &cached {
                    let current = proxy.store().find_by_id(row.id).await.unwrap();
                    prop_assert_eq!(
                        current.map(|c| visible(std::slice::from_ref(&c))),
                        Some(visible(std::slice::from_ref(row)))
                    );
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_status_partition_never_holds_wrong_status(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let proxy = proxy();
            let mut names: Vec<String> = (0..SEEDED).map(|i| format!("srv-{:03}", i)).collect();
            let on = status_request(ServerStatus::On).resolve().unwrap();

            for op in &ops {
                apply(&proxy, &mut names, op).await;
                let rows = proxy.find(&on).await.unwrap();
                prop_assert!(rows.iter().all(|r| r.status == ServerStatus::On));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_replicas_sharing_a_cache_see_each_others_writes() {
    let store = Arc::new(seeded_inventory(4));
    let cache = Arc::new(InMemoryQueryCache::default());
    let first = CachedInventory::new(store.clone(), cache.clone());
    let second = CachedInventory::new(store, cache);

    let query = ServerQuery::all();
    assert_eq!(first.find(&query).await.unwrap().len(), 4);

    second
        .update_by_name("srv-002", ServerPatch::new().with_ipv4("192.168.7.7").by(3))
        .await
        .unwrap();
    second.delete_by_name("srv-003", Some(3)).await.unwrap();

    let rows = first.find(&query).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().any(|r| r.name == "srv-002" && r.ipv4 == "192.168.7.7"));
    assert!(rows.iter().all(|r| r.name != "srv-003"));
}

#[tokio::test]
async fn test_create_on_empty_store_is_visible_to_next_read() {
    let proxy = CachedInventory::new(
        Arc::new(MockInventory::new()),
        Arc::new(InMemoryQueryCache::default()),
    );
    let query = ServerQuery::all();
    assert!(proxy.find(&query).await.unwrap().is_empty());

    let created = proxy
        .create(fleet_core::NewServer::new("first", "10.9.9.9").by(1))
        .await
        .unwrap();

    let rows = proxy.find(&query).await.unwrap();
    assert_eq!(rows, vec![created]);
}

#[tokio::test]
async fn test_create_is_invisible_until_partition_expires() {
    let proxy = proxy();
    let query = ServerQuery::all();
    proxy.find(&query).await.unwrap();

    proxy
        .create(fleet_core::NewServer::new("late", "10.10.10.10").by(1))
        .await
        .unwrap();

    assert_eq!(proxy.find(&query).await.unwrap().len(), SEEDED);
    assert_eq!(proxy.store().find(&query).await.unwrap().len(), SEEDED + 1);

    // Flushing stands in for expiry.
    proxy.cache().flush().await.unwrap();
    assert_eq!(proxy.find(&query).await.unwrap().len(), SEEDED + 1);
}

#[tokio::test]
async fn test_counts_never_touch_the_cache() {
    let spy = SpyQueryCache::new();
    let proxy = CachedInventory::new(Arc::new(seeded_inventory(5)), Arc::new(spy.clone()));

    let total = proxy.count(&ServerQuery::all()).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(spy.total_calls(), 0);
}

#[tokio::test]
async fn test_status_update_drops_only_partitions_holding_the_record() {
    let spy = SpyQueryCache::new();
    let proxy = CachedInventory::new(Arc::new(seeded_inventory(6)), Arc::new(spy.clone()));
    let on = status_request(ServerStatus::On).resolve().unwrap();
    let off = status_request(ServerStatus::Off).resolve().unwrap();
    proxy.find(&on).await.unwrap();
    proxy.find(&off).await.unwrap();
    spy.reset();

    // srv-000 is On, so only the On partition holds it.
    proxy
        .update_by_name("srv-000", ServerPatch::new().with_status(ServerStatus::Off).by(2))
        .await
        .unwrap();
    assert_eq!(spy.count(CacheCall::DeletePartition), 1);

    spy.reset();
    let off_rows = proxy.find(&off).await.unwrap();
    // The Off partition survived, so it is served from cache without srv-000.
    assert_eq!(spy.count(CacheCall::Put), 0);
    assert!(off_rows.iter().all(|r| r.name != "srv-000"));
}

#[tokio::test]
async fn test_missing_targets_leave_cache_untouched() {
    let spy = SpyQueryCache::new();
    let proxy = CachedInventory::new(Arc::new(seeded_inventory(2)), Arc::new(spy.clone()));

    assert_not_found(
        &proxy
            .update_by_name("ghost", ServerPatch::new().with_ipv4("10.0.0.1"))
            .await,
    );
    assert_not_found(&proxy.delete_by_id(uuid::Uuid::now_v7(), None).await);
    assert_eq!(spy.total_calls(), 0);
}
