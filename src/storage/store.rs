use crate::core::{CacheRow, DatasetId, DeltaCode, Result, RowKey, RunId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How classified rows are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageStrategy {
    /// Every classification inserts a new row; history is kept until pruned.
    #[default]
    AppendOnly,
    /// One row per identifier, overwritten in place.
    LatestState,
}

impl fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageStrategy::AppendOnly => write!(f, "append-only"),
            StorageStrategy::LatestState => write!(f, "latest-state"),
        }
    }
}

impl FromStr for StorageStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "append-only" | "append" => Ok(StorageStrategy::AppendOnly),
            "latest-state" | "latest" => Ok(StorageStrategy::LatestState),
            other => Err(format!("unknown storage strategy '{}'", other)),
        }
    }
}

/// Keyset page over rows ordered by ascending row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPage {
    pub after: Option<RowKey>,
    pub limit: usize,
}

impl RowPage {
    pub fn first(limit: usize) -> Self {
        Self { after: None, limit }
    }

    /// The page following `rows`, or `None` when `rows` was the last page.
    pub fn next<E>(&self, rows: &[CacheRow<E>]) -> Option<Self> {
        if rows.len() < self.limit {
            return None;
        }
        rows.last().map(|r| Self {
            after: r.key,
            limit: self.limit,
        })
    }
}

/// Cache operations a delta run needs, with transaction demarcation.
///
/// Both storage strategies implement this surface; the engine only ever
/// writes through [`CacheStore::write`], so classification logic is shared.
#[async_trait]
pub trait CacheStore<E>: Send
where
    E: Clone + Send + Sync + 'static,
{
    fn strategy(&self) -> StorageStrategy;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Greatest run id holding rows for the dataset; `None` before the first run.
    async fn max_run_id(&mut self, dataset: DatasetId) -> Result<Option<RunId>>;

    async fn find_latest(&mut self, dataset: DatasetId, identifier: &str) -> Result<Option<CacheRow<E>>>;

    async fn find_rows_at_run(
        &mut self,
        dataset: DatasetId,
        run_id: RunId,
        excluding: DeltaCode,
        page: RowPage,
    ) -> Result<Vec<CacheRow<E>>>;

    async fn insert(&mut self, row: CacheRow<E>) -> Result<RowKey>;

    /// Overwrite `row.key` in place.
    async fn update(&mut self, row: CacheRow<E>) -> Result<()>;

    /// Remove rows with `code` whose run id is strictly below `below`.
    /// Pruned DELETE rows take their identifier's older rows with them.
    async fn delete_below_run(&mut self, dataset: DatasetId, code: DeltaCode, below: RunId) -> Result<usize>;

    async fn delete_dataset(&mut self, dataset: DatasetId) -> Result<usize>;

    /// Whether any row, of any age, exists for the identifier.
    async fn has_history(&mut self, dataset: DatasetId, identifier: &str) -> Result<bool>;

    /// Persist a classified row, superseding `prior` the way the strategy does.
    async fn write(&mut self, row: CacheRow<E>, prior: Option<&CacheRow<E>>) -> Result<RowKey> {
        match (self.strategy(), prior.and_then(|p| p.key)) {
            (StorageStrategy::LatestState, Some(key)) => {
                self.update(row.with_key(key)).await?;
                Ok(key)
            }
            _ => self.insert(row).await,
        }
    }
}
