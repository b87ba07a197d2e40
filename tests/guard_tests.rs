mod common;

use common::{Harness, item};
use deltasnap::{DeltaCode, EmptyDatasetGuard, StorageStrategy};

async fn seed(strategy: StorageStrategy, k: usize) -> Harness {
    let mut h = Harness::new(strategy);
    let items = (0..k).map(|i| item(&format!("K{}", i), i as i32)).collect();
    let seeded = h.run(items, EmptyDatasetGuard::DeleteAll).await;
    assert!(seeded.success);
    h
}

#[tokio::test]
async fn test_bypass_keeps_all_rows_latest() {
    for strategy in [StorageStrategy::AppendOnly, StorageStrategy::LatestState] {
        let mut h = seed(strategy, 7).await;
        let rows_before = h.db.row_count().await;

        let result = h.run(vec![], EmptyDatasetGuard::BypassDeletes).await;
        assert!(result.success);
        assert!(result.bypassed);
        assert!(result.events.iter().all(|e| e.code != DeltaCode::Delete));
        assert_eq!(h.live().await.len(), 7);
        assert_eq!(h.db.row_count().await, rows_before);
    }
}

#[tokio::test]
async fn test_delete_all_emits_exactly_k_deletes() {
    for strategy in [StorageStrategy::AppendOnly, StorageStrategy::LatestState] {
        let mut h = seed(strategy, 7).await;

        let result = h.run(vec![], EmptyDatasetGuard::DeleteAll).await;
        assert!(result.success);
        assert!(!result.bypassed);
        assert_eq!(result.events.len(), 7);
        assert!(result.events.iter().all(|e| e.code == DeltaCode::Delete && e.current.is_none()));
        assert!(h.live().await.is_empty());
    }
}

#[tokio::test]
async fn test_guard_only_applies_to_empty_pulls() {
    let mut h = seed(StorageStrategy::AppendOnly, 3).await;
    let result = h.run(vec![item("K0", 0)], EmptyDatasetGuard::BypassDeletes).await;
    assert!(!result.bypassed);
    assert_eq!(result.events.len(), 2);
    assert!(result.events.iter().all(|e| e.code == DeltaCode::Delete));
}

#[tokio::test]
async fn test_bypass_after_bypass_still_compares_with_last_real_run() {
    let mut h = seed(StorageStrategy::AppendOnly, 2).await;
    h.run(vec![], EmptyDatasetGuard::BypassDeletes).await;
    h.run(vec![], EmptyDatasetGuard::BypassDeletes).await;

    let result = h.run(vec![item("K0", 0)], EmptyDatasetGuard::DeleteAll).await;
    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].identifier, "K1");
    assert_eq!(result.events[0].code, DeltaCode::Delete);
}
