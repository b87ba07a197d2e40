use crate::config::EngineConfig;
use crate::core::{CacheRow, DatasetId, DeltaError, EntityIdentity, EqualityPredicate, Result};
use crate::engine::{DeltaEngine, RetentionPruner, RunResult, SourceProducer};
use crate::run::{Run, RunCompletion, RunTracker};
use crate::storage::{CacheDatabase, StorageStrategy, open_store};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Everything one subscriber run produced.
#[derive(Debug)]
pub struct SubscriberOutcome<E> {
    pub result: RunResult<E>,
    /// The run row as recorded by the tracker.
    pub run: Run,
    pub pruned: usize,
    /// Retention failures never fail the run; they surface here.
    pub prune_error: Option<DeltaError>,
}

/// Ties a cache database, a run tracker and an engine configuration together
/// and runs delta detection one dataset at a time.
///
/// Runs of the same dataset are serialized; runs of different datasets may
/// proceed concurrently, each in its own transaction.
pub struct Subscriber<E> {
    db: CacheDatabase<E>,
    tracker: Arc<dyn RunTracker>,
    config: EngineConfig,
    locks: Mutex<HashMap<DatasetId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<E> Subscriber<E>
where
    E: Clone + Send + Sync + 'static,
{
    pub fn new(db: CacheDatabase<E>, tracker: Arc<dyn RunTracker>, config: EngineConfig) -> Self {
        Self {
            db,
            tracker,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn database(&self) -> &CacheDatabase<E> {
        &self.db
    }

    pub fn tracker(&self) -> &Arc<dyn RunTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn dataset_lock(&self, dataset: DatasetId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock()?;
        Ok(Arc::clone(locks.entry(dataset).or_default()))
    }

    /// Start a run, detect deltas, record the outcome and prune.
    ///
    /// Errors are returned only when the run could not be started or its
    /// outcome could not be recorded; a failed run is a successful call with
    /// `result.success == false`.
    pub async fn run<I, P>(
        &self,
        dataset: DatasetId,
        source: &(dyn SourceProducer<E> + '_),
        identity: &I,
        predicate: &P,
    ) -> Result<SubscriberOutcome<E>>
    where
        I: EntityIdentity<E> + ?Sized,
        P: EqualityPredicate<E> + ?Sized,
    {
        let lock = self.dataset_lock(dataset)?;
        let _serialized = lock.lock().await;

        let run_id = self.tracker.start_run(dataset, self.config.run_mode).await?;
        let mut store = open_store(self.config.storage, self.db.clone());

        let result = match self.config.validate() {
            Ok(()) => {
                DeltaEngine::new(&self.config)
                    .run(
                        dataset,
                        run_id,
                        source,
                        identity,
                        predicate,
                        self.config.empty_guard,
                        store.as_mut(),
                    )
                    .await
            }
            Err(e) => {
                warn!("{}: invalid configuration for dataset {}: {}", run_id, dataset, e);
                RunResult::started(run_id).fail(e)
            }
        };

        let completion = if result.success {
            RunCompletion::success(result.dataset_count, result.delta_count)
        } else {
            RunCompletion::failure(
                result.first_error().unwrap_or("run failed"),
                result.dataset_count,
                result.delta_count,
            )
        };
        let run = self.tracker.complete_run(run_id, completion).await?;

        let mut pruned = 0;
        let mut prune_error = None;
        let retention = &self.config.retention;
        if result.success
            && !result.bypassed
            && self.config.storage == StorageStrategy::AppendOnly
            && !retention.is_disabled()
        {
            let pruner = RetentionPruner::new(retention.clone());
            match pruner.prune_policy(store.as_mut(), dataset, run_id).await {
                Ok(count) => pruned = count,
                Err(e) => {
                    warn!("{}: retention pruning of dataset {} failed: {}", run_id, dataset, e);
                    prune_error = Some(e);
                }
            }
        }

        Ok(SubscriberOutcome {
            result,
            run,
            pruned,
            prune_error,
        })
    }

    /// Delete every cache row of a dataset. Run rows are kept so run ids are
    /// never reissued.
    pub async fn reset_dataset(&self, dataset: DatasetId) -> Result<usize> {
        let lock = self.dataset_lock(dataset)?;
        let _serialized = lock.lock().await;

        let mut store = open_store(self.config.storage, self.db.clone());
        store.begin().await?;
        let removed = match store.delete_dataset(dataset).await {
            Ok(removed) => removed,
            Err(e) => {
                store.rollback().await?;
                return Err(e);
            }
        };
        store.commit().await?;
        info!("dataset {}: reset, {} cache rows removed", dataset, removed);
        Ok(removed)
    }

    /// Latest cache row per identifier, including DELETE rows.
    pub async fn latest(&self, dataset: DatasetId) -> Vec<CacheRow<E>> {
        self.db.latest_rows(dataset).await
    }
}
