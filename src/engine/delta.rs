// ============================================================================
// Delta Engine
// ============================================================================
//
// One run, inside one cache transaction:
//
//   pull entity -> classify against latest row -> write row -> next entity
//   ...
//   rows at previous run whose identifier has no row at this run -> DELETE rows
//   commit (or roll back on any failure)
//
// Every pulled entity leaves a row at the current run, so "seen this run" is
// a store lookup rather than an in-memory set. Memory stays bounded by one
// entity plus one page of previous-run rows.
//
// ============================================================================

use super::guard::EmptyDatasetGuard;
use super::result::RunResult;
use super::source::SourceProducer;
use crate::config::EngineConfig;
use crate::core::{
    CacheRow, DatasetId, DeltaCode, DeltaError, DeltaEvent, EntityIdentity, EqualityPredicate, Result, RunId,
    values_equal,
};
use crate::storage::{CacheStore, RowPage};
use futures::StreamExt;
use log::{debug, error, info, warn};

/// Classify one pulled entity against the authoritative prior row.
///
/// `prior` must already exclude rows that do not represent a live entity;
/// see [`DeltaEngine::live_prior`].
pub fn classify<E, P>(predicate: &P, prior: Option<&CacheRow<E>>, entity: &E) -> Result<DeltaCode>
where
    P: EqualityPredicate<E> + ?Sized,
{
    match prior {
        None => Ok(DeltaCode::Add),
        Some(row) => {
            if values_equal(predicate, row.current.as_ref(), Some(entity))? {
                Ok(DeltaCode::None)
            } else {
                Ok(DeltaCode::Update)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeltaEngine {
    emit_unchanged: bool,
    page_size: usize,
}

impl Default for DeltaEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl DeltaEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            emit_unchanged: config.emit_unchanged,
            page_size: config.deletion_page_size.max(1),
        }
    }

    /// Run delta detection for one dataset under an already allocated run id.
    ///
    /// Never returns early with an error: every failure rolls the cache
    /// transaction back and is reported through the returned [`RunResult`].
    #[allow(clippy::too_many_arguments)]
    pub async fn run<E, I, P, S>(
        &self,
        dataset: DatasetId,
        run_id: RunId,
        source: &(dyn SourceProducer<E> + '_),
        identity: &I,
        predicate: &P,
        guard: Option<EmptyDatasetGuard>,
        store: &mut S,
    ) -> RunResult<E>
    where
        E: Clone + Send + Sync + 'static,
        I: EntityIdentity<E> + ?Sized,
        P: EqualityPredicate<E> + ?Sized,
        S: CacheStore<E> + ?Sized,
    {
        let mut result = RunResult::started(run_id);

        let Some(guard) = guard else {
            error!("{}: refusing to run dataset {} without an empty-dataset guard", run_id, dataset);
            return result.fail(DeltaError::GuardNotConfigured);
        };

        info!("{}: delta run for dataset {} ({} storage)", run_id, dataset, store.strategy());
        if let Err(e) = store.begin().await {
            return result.fail(e);
        }

        let outcome = self
            .execute(dataset, run_id, source, identity, predicate, guard, store, &mut result)
            .await;

        match outcome {
            Ok(()) => match store.commit().await {
                Ok(()) => {
                    info!(
                        "{}: dataset {} committed: {} entities, {} changes{}",
                        run_id,
                        dataset,
                        result.dataset_count,
                        result.delta_count,
                        if result.bypassed { " (deletes bypassed)" } else { "" }
                    );
                    result.succeed()
                }
                Err(e) => {
                    warn!("{}: commit failed: {}", run_id, e);
                    result.fail(e)
                }
            },
            Err(e) => {
                match store.rollback().await {
                    Ok(()) => warn!("{}: rolled back after failure: {}", run_id, e),
                    Err(rb) => error!("{}: rollback failed ({}) after failure: {}", run_id, rb, e),
                }
                result.fail(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute<E, I, P, S>(
        &self,
        dataset: DatasetId,
        run_id: RunId,
        source: &(dyn SourceProducer<E> + '_),
        identity: &I,
        predicate: &P,
        guard: EmptyDatasetGuard,
        store: &mut S,
        result: &mut RunResult<E>,
    ) -> Result<()>
    where
        E: Clone + Send + Sync + 'static,
        I: EntityIdentity<E> + ?Sized,
        P: EqualityPredicate<E> + ?Sized,
        S: CacheStore<E> + ?Sized,
    {
        let previous_run = store.max_run_id(dataset).await?;
        debug!("{}: previous run of dataset {} is {:?}", run_id, dataset, previous_run);
        if let Some(previous) = previous_run.filter(|p| *p >= run_id) {
            return Err(DeltaError::Config(format!(
                "run {} is not newer than run {} already cached for dataset {}",
                run_id, previous, dataset
            )));
        }

        let mut entities = source.pull(dataset);

        while let Some(pulled) = entities.next().await {
            let entity = pulled.map_err(DeltaError::source_failure)?;
            result.dataset_count += 1;

            let identifier = identity.identifier(&entity)?;
            let prior = store.find_latest(dataset, &identifier).await?;
            if prior.as_ref().is_some_and(|row| row.run_id == run_id) {
                return Err(DeltaError::DuplicateIdentifier(identifier));
            }
            let live = Self::live_prior(prior.as_ref(), previous_run);
            let previous = live.and_then(|row| row.current.clone());
            let row = match classify(predicate, live, &entity)? {
                DeltaCode::Add => CacheRow::added(dataset, run_id, identifier, entity),
                DeltaCode::None => CacheRow::unchanged(dataset, run_id, identifier, entity, previous),
                _ => CacheRow::updated(dataset, run_id, identifier, entity, previous),
            };
            self.record(store, row, prior.as_ref(), result).await?;
        }
        drop(entities);

        if result.dataset_count == 0 {
            match guard {
                EmptyDatasetGuard::BypassDeletes => {
                    warn!("{}: dataset {} pulled empty, deletion detection bypassed", run_id, dataset);
                    result.bypassed = true;
                    return Ok(());
                }
                EmptyDatasetGuard::DeleteAll => {
                    info!("{}: dataset {} pulled empty, deleting all live entities", run_id, dataset);
                }
            }
        }

        let Some(previous_run) = previous_run else {
            return Ok(());
        };

        let mut page = Some(RowPage::first(self.page_size));
        while let Some(current) = page {
            let rows = store
                .find_rows_at_run(dataset, previous_run, DeltaCode::Delete, current)
                .await?;
            page = current.next(&rows);
            debug!("{}: deletion pass read {} rows of {}", run_id, rows.len(), previous_run);

            for prior in &rows {
                let seen = store
                    .find_latest(dataset, &prior.identifier)
                    .await?
                    .is_some_and(|latest| latest.run_id == run_id);
                if seen {
                    continue;
                }
                let row = CacheRow::deleted(dataset, run_id, prior.identifier.clone(), prior.current.clone());
                self.record(store, row, Some(prior), result).await?;
            }
        }
        Ok(())
    }

    /// The prior row an entity is compared against, if it still stands for a
    /// live entity.
    ///
    /// A DELETE row means the identifier is absent. A live row older than the
    /// previous run is stale as well: every entity alive after a committed run
    /// has a row at that run, so such a row was superseded by rows that are
    /// no longer cached.
    pub fn live_prior<E>(prior: Option<&CacheRow<E>>, previous_run: Option<RunId>) -> Option<&CacheRow<E>> {
        prior.filter(|row| row.is_live() && previous_run.is_none_or(|prev| row.run_id >= prev))
    }

    async fn record<E, S>(
        &self,
        store: &mut S,
        row: CacheRow<E>,
        prior: Option<&CacheRow<E>>,
        result: &mut RunResult<E>,
    ) -> Result<()>
    where
        E: Clone + Send + Sync + 'static,
        S: CacheStore<E> + ?Sized,
    {
        let code = row.code;
        let event = (code.is_change() || self.emit_unchanged).then(|| DeltaEvent::from(&row));
        store.write(row, prior).await?;
        if code.is_change() {
            result.delta_count += 1;
        }
        if let Some(event) = event {
            result.events.push(event);
        }
        Ok(())
    }
}
