use super::database::CacheDatabase;
use super::session::Session;
use super::store::{CacheStore, RowPage, StorageStrategy};
use crate::core::{CacheRow, DatasetId, DeltaCode, DeltaError, Result, RowKey, RunId};
use async_trait::async_trait;

/// Append-only history: rows are never mutated once inserted and the latest
/// state of an identifier is its row with the greatest run id.
pub struct AppendOnlyStore<E> {
    session: Session<E>,
}

impl<E: Clone + Send + Sync> AppendOnlyStore<E> {
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
impl<E> CacheStore<E> for AppendOnlyStore<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::AppendOnly
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
        self.session.latest_for_identifier(dataset, identifier).await
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
        self.session.insert(row)
    }

    async fn update(&mut self, row: CacheRow<E>) -> Result<()> {
        Err(DeltaError::Unsupported(format!(
            "in-place update of '{}' on an append-only cache",
            row.identifier
        )))
    }

    async fn delete_below_run(&mut self, dataset: DatasetId, code: DeltaCode, below: RunId) -> Result<usize> {
        self.session.delete_below_run(dataset, code, below).await
    }

    async fn delete_dataset(&mut self, dataset: DatasetId) -> Result<usize> {
        self.session.delete_dataset(dataset).await
    }

    async fn has_history(&mut self, dataset: DatasetId, identifier: &str) -> Result<bool> {
        Ok(!self.session.rows_for_identifier(dataset, identifier).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_always_inserts() {
        let db = CacheDatabase::<i32>::new();
        let mut store = AppendOnlyStore::new(db.clone());
        let ds = DatasetId(1);

        store.begin().await.unwrap();
        let first = store
            .write(CacheRow::added(ds, RunId(1), "A".into(), 1), None)
            .await
            .unwrap();
        let prior = store.find_latest(ds, "A").await.unwrap().unwrap();
        let second = store
            .write(CacheRow::updated(ds, RunId(2), "A".into(), 2, Some(1)), Some(&prior))
            .await
            .unwrap();
        store.commit().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(db.row_count().await, 2);
        let latest = store.find_latest(ds, "A").await.unwrap().unwrap();
        assert_eq!(latest.run_id, RunId(2));
        assert_eq!(latest.current, Some(2));
    }

    #[tokio::test]
    async fn test_update_is_unsupported() {
        let mut store = AppendOnlyStore::new(CacheDatabase::<i32>::new());
        store.begin().await.unwrap();
        let row = CacheRow::added(DatasetId(1), RunId(1), "A".into(), 1).with_key(RowKey(1));
        assert!(matches!(store.update(row).await, Err(DeltaError::Unsupported(_))));
    }
}
