use super::database::CacheDatabase;
use super::session::Session;
use super::store::{CacheStore, RowPage, StorageStrategy};
use crate::core::{CacheRow, DatasetId, DeltaCode, DeltaError, Result, RowKey, RunId};
use async_trait::async_trait;

/// Mutable latest-state cache: each identifier owns exactly one row,
/// addressed by a stable key and overwritten on every classification.
pub struct LatestStateStore<E> {
    session: Session<E>,
}

impl<E: Clone + Send + Sync> LatestStateStore<E> {
    pub fn new(db: CacheDatabase<E>) -> Self {
        Self {
            session: Session::new(db),
        }
    }

    pub fn session(&self) -> &Session<E> {
        &self.session
    }
}

#[async_trait]
impl<E> CacheStore<E> for LatestStateStore<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::LatestState
    }

    async fn begin(&mut self) -> Result<()> {
        self.session.begin().map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        self.session.commit().await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.session.rollback().map(|_| ())
    }

    async fn max_run_id(&mut self, dataset: DatasetId) -> Result<Option<RunId>> {
        self.session.max_run_id(dataset).await
    }

    async fn find_latest(&mut self, dataset: DatasetId, identifier: &str) -> Result<Option<CacheRow<E>>> {
        let mut rows = self.session.rows_for_identifier(dataset, identifier).await?;
        if rows.len() > 1 {
            return Err(DeltaError::ConstraintViolation(format!(
                "identifier '{}' owns {} rows in dataset {}",
                identifier,
                rows.len(),
                dataset
            )));
        }
        Ok(rows.pop())
    }

    async fn find_rows_at_run(
        &mut self,
        dataset: DatasetId,
        run_id: RunId,
        excluding: DeltaCode,
        page: RowPage,
    ) -> Result<Vec<CacheRow<E>>> {
        self.session
            .rows_at_run(dataset, run_id, excluding, page.after, page.limit)
            .await
    }

    async fn insert(&mut self, row: CacheRow<E>) -> Result<RowKey> {
        if self.has_history(row.dataset, &row.identifier).await? {
            return Err(DeltaError::ConstraintViolation(format!(
                "identifier '{}' already has a row in dataset {}",
                row.identifier, row.dataset
            )));
        }
        self.session.insert(row)
    }

    async fn update(&mut self, row: CacheRow<E>) -> Result<()> {
        let key = row.key.ok_or_else(|| {
            DeltaError::Store(format!("update of '{}' without a row key", row.identifier))
        })?;
        self.session.update(key, row).await
    }

    async fn delete_below_run(&mut self, dataset: DatasetId, code: DeltaCode, below: RunId) -> Result<usize> {
        Err(DeltaError::Unsupported(format!(
            "pruning {} rows below {} in dataset {}: latest-state caches keep no history",
            code, below, dataset
        )))
    }

    async fn delete_dataset(&mut self, dataset: DatasetId) -> Result<usize> {
        self.session.delete_dataset(dataset).await
    }

    async fn has_history(&mut self, dataset: DatasetId, identifier: &str) -> Result<bool> {
        Ok(!self.session.rows_for_identifier(dataset, identifier).await?.is_empty())
    }
}
