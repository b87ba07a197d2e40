use super::model::{Run, RunCompletion, RunMode};
use crate::core::{DatasetId, DeltaError, Result, RunId};
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// Run bookkeeping: allocates run ids and records terminal outcomes.
#[async_trait]
pub trait RunTracker: Send + Sync {
    async fn start_run(&self, dataset: DatasetId, mode: RunMode) -> Result<RunId>;

    /// Record the terminal status of a run. Fails if the run is unknown or
    /// was already completed.
    async fn complete_run(&self, run_id: RunId, completion: RunCompletion) -> Result<Run>;

    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>>;

    /// Runs of one dataset in ascending run id order.
    async fn runs_for_dataset(&self, dataset: DatasetId) -> Result<Vec<Run>>;
}

/// Tracker keeping run rows in memory, shareable across tasks.
#[derive(Clone)]
pub struct InMemoryRunTracker {
    runs: Arc<RwLock<BTreeMap<RunId, Run>>>,
    sequence: Arc<AtomicI64>,
}

impl Default for InMemoryRunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRunTracker {
    pub fn new() -> Self {
        Self::with_next_id(1)
    }

    pub fn with_next_id(next_id: i64) -> Self {
        Self {
            runs: Arc::new(RwLock::new(BTreeMap::new())),
            sequence: Arc::new(AtomicI64::new(next_id)),
        }
    }

    /// Restore previously recorded runs. The sequence continues past the
    /// largest restored id.
    pub fn from_runs(runs: impl IntoIterator<Item = Run>) -> Self {
        let runs: BTreeMap<RunId, Run> = runs.into_iter().map(|r| (r.run_id, r)).collect();
        let next = runs.keys().next_back().map_or(1, |id| id.0 + 1);
        Self {
            runs: Arc::new(RwLock::new(runs)),
            sequence: Arc::new(AtomicI64::new(next)),
        }
    }

    pub async fn all_runs(&self) -> Vec<Run> {
        self.runs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl RunTracker for InMemoryRunTracker {
    async fn start_run(&self, dataset: DatasetId, mode: RunMode) -> Result<RunId> {
        let run_id = RunId(self.sequence.fetch_add(1, Ordering::SeqCst));
        let run = Run::started(run_id, dataset, mode);
        self.runs.write().await.insert(run_id, run);
        info!("{} started for dataset {} ({})", run_id, dataset, mode);
        Ok(run_id)
    }

    async fn complete_run(&self, run_id: RunId, completion: RunCompletion) -> Result<Run> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&run_id).ok_or(DeltaError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            return Err(DeltaError::RunAlreadyCompleted(run_id));
        }
        run.status = completion.status();
        run.status_message = completion.message;
        run.dataset_count = completion.dataset_count;
        run.delta_count = completion.delta_count;
        run.end_time = Some(Utc::now());
        info!(
            "{} completed {} (dataset count {}, delta count {})",
            run_id, run.status, run.dataset_count, run.delta_count
        );
        Ok(run.clone())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn runs_for_dataset(&self, dataset: DatasetId) -> Result<Vec<Run>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.dataset == dataset)
            .cloned()
            .collect())
    }
}
