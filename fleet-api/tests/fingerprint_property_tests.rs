//! Property-Based Tests for Query Fingerprints
//!
//! **Property: Equivalent requests share a partition**
//!
//! Two list requests that resolve to the same query SHALL produce the same
//! fingerprint, and therefore read and write the same cache partition.
//! Requests that select different rows SHALL NOT collide.

use fleet_api::CachedInventory;
use fleet_core::{
    ListServersRequest, Pagination, QueryFingerprint, ServerFilter, ServerStatus, SortColumn,
};
use fleet_storage::InventoryStore;
use fleet_test_utils::fixtures::seeded_inventory;
use fleet_test_utils::generators::{arb_list_request, arb_server_status, arb_sort_column};
use fleet_test_utils::{CacheCall, SpyQueryCache};
use proptest::prelude::*;
use std::sync::Arc;

fn fingerprint(req: &ListServersRequest) -> QueryFingerprint {
    let query = req.resolve().expect("generated requests resolve");
    QueryFingerprint::of(&query).expect("queries serialize")
}

proptest! {
    #[test]
    fn prop_fingerprint_is_stable_hex(req in arb_list_request()) {
        let first = fingerprint(&req);
        let second = fingerprint(&req.clone());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.as_str().len(), 64);
        prop_assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn prop_ignored_inputs_do_not_split_partitions(
        req in arb_list_request(),
        ignored_limit in prop_oneof![Just(None), Just(Some(0i64)), Just(Some(1i64))],
    ) {
        let mut base = req.clone();
        let mut variant = req;
        for r in [&mut base, &mut variant] {
            r.pagination.get_or_insert_with(Pagination::default).limit = None;
        }
        if let Some(p) = variant.pagination.as_mut() {
            p.limit = ignored_limit;
        }
        if variant.query.is_none() {
            variant.query = Some(String::new());
        }
        prop_assert_eq!(fingerprint(&base), fingerprint(&variant));
    }

    #[test]
    fn prop_status_filters_never_collide(a in arb_server_status(), b in arb_server_status()) {
        let req = |s| ListServersRequest {
            filter: Some(ServerFilter::with_status(s)),
            ..Default::default()
        };
        // NONE is "no predicate", so it collides only with itself.
        prop_assert_eq!(a == b, fingerprint(&req(a)) == fingerprint(&req(b)));
    }

    #[test]
    fn prop_only_natural_order_is_cacheable(column in arb_sort_column()) {
        let req = ListServersRequest {
            pagination: Some(Pagination {
                sort_by: Some(column.as_sql().to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let query = req.resolve().unwrap();
        prop_assert_eq!(query.uses_default_order(), column == SortColumn::CreatedAt);
    }
}

#[test]
fn test_none_status_matches_unfiltered_request() {
    let unfiltered = ListServersRequest::default();
    let none = ListServersRequest {
        filter: Some(ServerFilter::with_status(ServerStatus::None)),
        ..Default::default()
    };
    assert_eq!(fingerprint(&unfiltered), fingerprint(&none));
}

#[tokio::test]
async fn test_equivalent_requests_share_one_cached_partition() {
    let spy = SpyQueryCache::new();
    let proxy = CachedInventory::new(Arc::new(seeded_inventory(3)), Arc::new(spy.clone()));

    let plain = ListServersRequest::default().resolve().unwrap();
    let padded = ListServersRequest {
        query: Some(String::new()),
        pagination: Some(Pagination {
            limit: Some(1),
            ..Default::default()
        }),
        ..Default::default()
    }
    .resolve()
    .unwrap();

    proxy.find(&plain).await.unwrap();
    proxy.find(&padded).await.unwrap();
    assert_eq!(spy.count(CacheCall::Put), 1);
    assert_eq!(spy.count(CacheCall::Get), 1);
}
