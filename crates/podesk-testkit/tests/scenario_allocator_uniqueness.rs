//! Scenario: SequenceAllocator never issues a duplicate identifier.
//!
//! # Invariants under test
//! - N concurrent `allocate(P)` calls yield N distinct identifiers forming
//!   `[base+1 ..= base+N]`.
//! - Two concurrent `allocate("2025-05")` on an empty counter yield
//!   `CMD/2025/05/0001` and `CMD/2025/05/0002` in either order.
//! - Transient conflicts are retried; exhaustion is an error and creates
//!   no order.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use podesk_runtime::SequenceAllocator;
use podesk_schemas::{OrderId, YearMonth};
use podesk_testkit::{draft, Harness, MemSequenceStore};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocations_form_contiguous_range() {
    let store = Arc::new(MemSequenceStore::new());
    let period = YearMonth::new(2025, 4).unwrap();
    store.seed(period, 17).await;
    let allocator = SequenceAllocator::new(store.clone());

    const N: i64 = 64;
    let mut handles = Vec::new();
    for _ in 0..N {
        let a = allocator.clone();
        handles.push(tokio::spawn(async move { a.allocate(period).await }));
    }

    let mut ids = BTreeSet::new();
    for h in handles {
        let id = h.await.unwrap().unwrap();
        assert!(ids.insert(id.clone()), "duplicate id {id}");
    }

    let expected: BTreeSet<OrderId> = (18..=17 + N).map(|n| OrderId::new(period, n)).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn two_concurrent_allocations_on_empty_counter() {
    let allocator = SequenceAllocator::new(Arc::new(MemSequenceStore::new()));

    let results = join_all([
        allocator.allocate_key("2025-05"),
        allocator.allocate_key("2025-05"),
    ])
    .await;
    let got: BTreeSet<String> = results
        .into_iter()
        .map(|r| r.unwrap().as_str().to_string())
        .collect();

    let expected: BTreeSet<String> = ["CMD/2025/05/0001", "CMD/2025/05/0002"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn periods_are_independent() {
    let allocator = SequenceAllocator::new(Arc::new(MemSequenceStore::new()));
    assert_eq!(allocator.allocate_key("2025-05").await.unwrap().as_str(), "CMD/2025/05/0001");
    assert_eq!(allocator.allocate_key("2025-06").await.unwrap().as_str(), "CMD/2025/06/0001");
    assert_eq!(allocator.allocate_key("2025-05").await.unwrap().as_str(), "CMD/2025/05/0002");
}

#[tokio::test]
async fn conflicts_are_retried_without_skipping() {
    let store = Arc::new(MemSequenceStore::new());
    store.inject_conflicts(2);
    let allocator = SequenceAllocator::with_max_attempts(store.clone(), 5);

    let id = allocator.allocate_key("2025-07").await.unwrap();
    assert_eq!(id.as_str(), "CMD/2025/07/0001", "failed attempts must not consume numbers");
    assert_eq!(store.calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_order_creation() {
    let h = Harness::new(Utc.with_ymd_and_hms(2025, 7, 10, 9, 0, 0).unwrap());
    h.sequences.inject_conflicts(100);

    let requested = chrono::NaiveDate::from_ymd_opt(2025, 7, 11).unwrap();
    let valid = h.desk.validate(draft("Badges", requested)).unwrap();
    let err = h.desk.create_order(valid).await.unwrap_err();
    assert!(format!("{err:#}").contains("allocation"), "got: {err:#}");
    assert!(h.repo.is_empty().await, "no order without an identifier");
    assert_eq!(h.sequences.calls(), podesk_runtime::DEFAULT_MAX_ATTEMPTS as usize);
}

#[tokio::test]
async fn store_errors_are_not_retried() {
    let store = Arc::new(MemSequenceStore::new());
    store.set_fail_hard(true);
    let allocator = SequenceAllocator::new(store.clone());

    assert!(allocator.allocate_key("2025-08").await.is_err());
    assert_eq!(store.calls(), 1);
}
