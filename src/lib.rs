// ============================================================================
// deltasnap Library
// ============================================================================
//
// Change detection between successive full pulls of a dataset. Each run
// classifies every pulled entity against the cached state of the previous
// run as ADD, UPDATE, NONE or DELETE, persists the new cache state in one
// transaction and records the outcome of the run.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod engine;
pub mod facade;
pub mod run;
pub mod storage;
pub mod transaction;

pub use config::EngineConfig;
pub use self::core::{
    BoxError, CacheRow, DatasetId, DeltaCode, DeltaError, DeltaEvent, EntityIdentity, EqualityPredicate,
    JsonEquality, JsonField, Result, RowKey, RunId,
};
pub use engine::{
    DeltaEngine, EmptyDatasetGuard, EntityStream, NdjsonSource, RetentionPolicy, RetentionPruner, RunResult,
    SourceProducer, VecSource, classify,
};
pub use facade::{Subscriber, SubscriberOutcome};
pub use run::{InMemoryRunTracker, Run, RunCompletion, RunMode, RunStatus, RunTracker};
pub use storage::{
    AppendOnlyStore, CacheDatabase, CacheStore, DatabaseSnapshot, LatestStateStore, RowPage, SnapshotFile,
    StorageStrategy, open_store,
};
