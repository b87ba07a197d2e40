mod common;

use common::{DS, FailingStore, Harness, codes, item, item_id, same_item};
use deltasnap::{
    BoxError, DeltaCode, DeltaEngine, DeltaError, EmptyDatasetGuard, EngineConfig, EntityStream, RunId,
    StorageStrategy, VecSource, open_store,
};
use futures::StreamExt;
use futures::stream;

const BOTH: [StorageStrategy; 2] = [StorageStrategy::AppendOnly, StorageStrategy::LatestState];

#[tokio::test]
async fn test_lifecycle_add_none_update_delete() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);

        let run1 = h.run(vec![item("A", 1)], EmptyDatasetGuard::DeleteAll).await;
        assert!(run1.success, "{:?}", run1.errors);
        assert_eq!(run1.dataset_count, 1);
        assert_eq!(run1.delta_count, 1);
        assert_eq!(codes(&run1.events), vec![("A".to_string(), DeltaCode::Add)]);
        assert_eq!(run1.events[0].previous, None);
        assert!(run1.events[0].success);

        let run2 = h.run(vec![item("A", 1)], EmptyDatasetGuard::DeleteAll).await;
        assert!(run2.success);
        assert_eq!(run2.dataset_count, 1);
        assert_eq!(run2.delta_count, 0);
        assert!(run2.events.is_empty());

        let run3 = h.run(vec![item("A", 2)], EmptyDatasetGuard::DeleteAll).await;
        assert_eq!(codes(&run3.events), vec![("A".to_string(), DeltaCode::Update)]);
        assert_eq!(run3.events[0].previous, Some(item("A", 1)));
        assert_eq!(run3.events[0].current, Some(item("A", 2)));

        let run4 = h.run(vec![], EmptyDatasetGuard::DeleteAll).await;
        assert!(run4.success);
        assert_eq!(run4.dataset_count, 0);
        assert_eq!(run4.delta_count, 1);
        assert_eq!(codes(&run4.events), vec![("A".to_string(), DeltaCode::Delete)]);
        assert_eq!(run4.events[0].current, None);
        assert_eq!(run4.events[0].previous, Some(item("A", 2)));
        assert!(h.live().await.is_empty(), "{}", strategy);
    }
}

#[tokio::test]
async fn test_empty_pull_with_bypass_keeps_cache() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);
        h.run(vec![item("A", 1)], EmptyDatasetGuard::DeleteAll).await;
        h.run(vec![item("A", 2)], EmptyDatasetGuard::DeleteAll).await;

        let bypassed = h.run(vec![], EmptyDatasetGuard::BypassDeletes).await;
        assert!(bypassed.success);
        assert!(bypassed.bypassed);
        assert!(bypassed.events.is_empty());
        assert_eq!(bypassed.dataset_count, 0);
        assert_eq!(bypassed.delta_count, 0);
        assert_eq!(h.live().await, vec![("A".to_string(), 2)]);
    }
}

#[tokio::test]
async fn test_unchanged_entities_emit_none_only_when_asked() {
    for strategy in BOTH {
        let config = EngineConfig::new().emit_unchanged(true);
        let mut h = Harness::with_config(strategy, config);
        h.run(vec![item("A", 1), item("B", 1)], EmptyDatasetGuard::DeleteAll).await;

        let run2 = h.run(vec![item("A", 1), item("B", 2)], EmptyDatasetGuard::DeleteAll).await;
        assert_eq!(
            codes(&run2.events),
            vec![("A".to_string(), DeltaCode::None), ("B".to_string(), DeltaCode::Update)]
        );
        assert_eq!(run2.delta_count, 1);
        assert_eq!(run2.events[0].previous, Some(item("A", 1)));
    }
}

#[tokio::test]
async fn test_events_follow_source_order_then_deletes() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);
        h.run(vec![item("A", 1), item("B", 1), item("C", 1)], EmptyDatasetGuard::DeleteAll)
            .await;

        let run2 = h
            .run(vec![item("D", 1), item("B", 5), item("E", 1)], EmptyDatasetGuard::DeleteAll)
            .await;
        assert_eq!(
            codes(&run2.events),
            vec![
                ("D".to_string(), DeltaCode::Add),
                ("B".to_string(), DeltaCode::Update),
                ("E".to_string(), DeltaCode::Add),
                ("A".to_string(), DeltaCode::Delete),
                ("C".to_string(), DeltaCode::Delete),
            ]
        );
    }
}

#[tokio::test]
async fn test_deletion_is_complete_across_pages() {
    for strategy in BOTH {
        let config = EngineConfig::new().deletion_page_size(4);
        let mut h = Harness::with_config(strategy, config);
        let all: Vec<_> = (0..25).map(|i| item(&format!("E{:02}", i), i)).collect();
        h.run(all.clone(), EmptyDatasetGuard::DeleteAll).await;

        let kept: Vec<_> = all.iter().filter(|e| e.v % 2 == 1).cloned().collect();
        let run2 = h.run(kept, EmptyDatasetGuard::DeleteAll).await;
        assert!(run2.success);

        let mut deleted: Vec<_> = run2
            .events
            .iter()
            .filter(|e| e.code == DeltaCode::Delete)
            .map(|e| (e.identifier.clone(), e.previous.clone().map(|p| p.v)))
            .collect();
        deleted.sort();
        let expected: Vec<_> = all
            .iter()
            .filter(|e| e.v % 2 == 0)
            .map(|e| (e.id.clone(), Some(e.v)))
            .collect();
        assert_eq!(deleted, expected, "{}", strategy);
        assert_eq!(run2.delta_count, 13);
    }
}

#[tokio::test]
async fn test_deleted_identifier_reappears_as_add() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);
        h.run(vec![item("A", 1), item("B", 1)], EmptyDatasetGuard::DeleteAll).await;
        h.run(vec![item("B", 1)], EmptyDatasetGuard::DeleteAll).await;

        let run3 = h.run(vec![item("A", 1), item("B", 1)], EmptyDatasetGuard::DeleteAll).await;
        assert_eq!(codes(&run3.events), vec![("A".to_string(), DeltaCode::Add)]);
        assert_eq!(run3.events[0].previous, None);
    }
}

#[tokio::test]
async fn test_deleted_rows_are_not_deleted_again() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);
        h.run(vec![item("A", 1)], EmptyDatasetGuard::DeleteAll).await;
        let run2 = h.run(vec![], EmptyDatasetGuard::DeleteAll).await;
        assert_eq!(run2.delta_count, 1);
        let run3 = h.run(vec![], EmptyDatasetGuard::DeleteAll).await;
        assert!(run3.success);
        assert!(run3.events.is_empty());
    }
}

#[tokio::test]
async fn test_store_failure_rolls_back_everything() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);
        h.run(vec![item("A", 1), item("B", 1)], EmptyDatasetGuard::DeleteAll).await;
        let before = h.live().await;

        let mut store = FailingStore::new(strategy, h.db.clone(), 1);
        let failed = h
            .run_with_store(vec![item("A", 2), item("B", 2), item("C", 1)], &mut store)
            .await;

        assert!(!failed.success);
        assert!(failed.events.is_empty());
        assert!(matches!(failed.error(), Some(DeltaError::Store(_))));
        assert_eq!(failed.errors.len(), 1);
        assert_eq!(h.live().await, before, "{}", strategy);

        // The next run still sees the pre-failure state as its previous run.
        let next = h.run(vec![item("A", 1)], EmptyDatasetGuard::DeleteAll).await;
        assert_eq!(codes(&next.events), vec![("B".to_string(), DeltaCode::Delete)]);
    }
}

#[tokio::test]
async fn test_source_failure_aborts_before_deletes() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);
        h.run(vec![item("A", 1), item("B", 1)], EmptyDatasetGuard::DeleteAll).await;

        let source = |_ds: deltasnap::DatasetId| -> EntityStream<'static, common::Item> {
            let failure: BoxError = "connection reset".into();
            stream::iter(vec![Ok(item("A", 9)), Err(failure)]).boxed()
        };
        let mut store = open_store(strategy, h.db.clone());
        let run_id = h.next_run_id();
        let result = h
            .engine
            .run(DS, run_id, &source, &item_id, &same_item, Some(EmptyDatasetGuard::DeleteAll), store.as_mut())
            .await;

        assert!(!result.success);
        assert_eq!(result.dataset_count, 1);
        assert!(result.first_error().unwrap().contains("connection reset"));
        assert!(matches!(result.into_result(), Err(DeltaError::Source(_))));
        assert_eq!(h.live().await, vec![("A".to_string(), 1), ("B".to_string(), 1)]);
    }
}

#[tokio::test]
async fn test_predicate_failure_aborts_run() {
    let mut h = Harness::new(StorageStrategy::AppendOnly);
    h.run(vec![item("A", 1)], EmptyDatasetGuard::DeleteAll).await;

    struct Broken;
    impl deltasnap::EqualityPredicate<common::Item> for Broken {
        fn is_equal(&self, _: &common::Item, _: &common::Item) -> deltasnap::Result<bool> {
            Err(DeltaError::Predicate("comparison exploded".into()))
        }
    }

    let mut store = open_store(StorageStrategy::AppendOnly, h.db.clone());
    let result = h
        .engine
        .run(
            DS,
            RunId(2),
            &VecSource::new(vec![item("A", 2)]),
            &item_id,
            &Broken,
            Some(EmptyDatasetGuard::DeleteAll),
            store.as_mut(),
        )
        .await;
    assert!(matches!(result.error(), Some(DeltaError::Predicate(_))));
    assert_eq!(h.live().await, vec![("A".to_string(), 1)]);
}

#[tokio::test]
async fn test_duplicate_identifier_aborts_run() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);
        let result = h
            .run(vec![item("A", 1), item("B", 1), item("A", 2)], EmptyDatasetGuard::DeleteAll)
            .await;
        assert!(matches!(result.error(), Some(DeltaError::DuplicateIdentifier(id)) if id == "A"));
        assert_eq!(h.db.row_count().await, 0);
    }
}

#[tokio::test]
async fn test_missing_guard_refuses_to_run() {
    let h = Harness::new(StorageStrategy::AppendOnly);
    let mut store = open_store(StorageStrategy::AppendOnly, h.db.clone());
    let result = DeltaEngine::default()
        .run(
            DS,
            RunId(1),
            &VecSource::new(vec![common::item("A", 1)]),
            &item_id,
            &same_item,
            None,
            store.as_mut(),
        )
        .await;
    assert!(!result.success);
    assert!(matches!(result.error(), Some(DeltaError::GuardNotConfigured)));
    assert_eq!(result.dataset_count, 0);
    assert_eq!(h.db.row_count().await, 0);
}

#[tokio::test]
async fn test_append_only_keeps_history_latest_state_does_not() {
    let mut append = Harness::new(StorageStrategy::AppendOnly);
    let mut latest = Harness::new(StorageStrategy::LatestState);
    for v in 1..=3 {
        append.run(vec![item("A", v)], EmptyDatasetGuard::DeleteAll).await;
        latest.run(vec![item("A", v)], EmptyDatasetGuard::DeleteAll).await;
    }
    assert_eq!(append.db.row_count().await, 3);
    assert_eq!(latest.db.row_count().await, 1);

    let row = latest.db.latest_rows(DS).await.remove(0);
    assert_eq!(row.code, DeltaCode::Update);
    assert_eq!(row.run_id, RunId(3));
    assert_eq!(row.previous.map(|p| p.v), Some(2));
}

#[tokio::test]
async fn test_datasets_are_isolated() {
    let mut h = Harness::new(StorageStrategy::AppendOnly);
    h.run(vec![item("A", 1)], EmptyDatasetGuard::DeleteAll).await;

    let other = deltasnap::DatasetId(2);
    let mut store = open_store(StorageStrategy::AppendOnly, h.db.clone());
    let result = h
        .engine
        .run(
            other,
            RunId(2),
            &VecSource::new(vec![item("Z", 1)]),
            &item_id,
            &same_item,
            Some(EmptyDatasetGuard::DeleteAll),
            store.as_mut(),
        )
        .await;
    assert_eq!(codes(&result.events), vec![("Z".to_string(), DeltaCode::Add)]);
    assert_eq!(h.live().await, vec![("A".to_string(), 1)]);
}

#[tokio::test]
async fn test_run_id_must_be_newer_than_cached_runs() {
    for strategy in BOTH {
        let mut h = Harness::new(strategy);
        h.run(vec![item("A", 1), item("B", 1)], EmptyDatasetGuard::DeleteAll).await;

        let mut store = open_store(strategy, h.db.clone());
        let result = h
            .engine
            .run(
                DS,
                RunId(1),
                &VecSource::new(vec![item("A", 2)]),
                &item_id,
                &same_item,
                Some(EmptyDatasetGuard::DeleteAll),
                store.as_mut(),
            )
            .await;
        assert!(matches!(result.error(), Some(DeltaError::Config(_))));
        assert_eq!(h.live().await, vec![("A".to_string(), 1), ("B".to_string(), 1)]);
    }
}
