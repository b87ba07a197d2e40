#![allow(dead_code)]

use async_trait::async_trait;
use deltasnap::{
    CacheDatabase, CacheRow, CacheStore, DatasetId, DeltaCode, DeltaEngine, DeltaError, DeltaEvent,
    EmptyDatasetGuard, EngineConfig, Result, RowKey, RowPage, RunId, RunResult, StorageStrategy, VecSource,
    open_store,
};

pub const DS: DatasetId = DatasetId(1);

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub v: i32,
}

pub fn item(id: &str, v: i32) -> Item {
    Item { id: id.to_string(), v }
}

pub fn item_id(item: &Item) -> String {
    item.id.clone()
}

pub fn same_item(a: &Item, b: &Item) -> bool {
    a == b
}

pub fn codes(events: &[DeltaEvent<Item>]) -> Vec<(String, DeltaCode)> {
    events.iter().map(|e| (e.identifier.clone(), e.code)).collect()
}

/// Drives successive engine runs against one shared database.
pub struct Harness {
    pub db: CacheDatabase<Item>,
    pub strategy: StorageStrategy,
    pub engine: DeltaEngine,
    pub last_run: i64,
}

impl Harness {
    pub fn new(strategy: StorageStrategy) -> Self {
        Self::with_config(strategy, EngineConfig::new())
    }

    pub fn with_config(strategy: StorageStrategy, config: EngineConfig) -> Self {
        Self {
            db: CacheDatabase::new(),
            strategy,
            engine: DeltaEngine::new(&config),
            last_run: 0,
        }
    }

    pub fn next_run_id(&mut self) -> RunId {
        self.last_run += 1;
        RunId(self.last_run)
    }

    pub async fn run(&mut self, items: Vec<Item>, guard: EmptyDatasetGuard) -> RunResult<Item> {
        let run_id = self.next_run_id();
        let mut store = open_store(self.strategy, self.db.clone());
        self.engine
            .run(DS, run_id, &VecSource::new(items), &item_id, &same_item, Some(guard), store.as_mut())
            .await
    }

    pub async fn run_with_store<S>(&mut self, items: Vec<Item>, store: &mut S) -> RunResult<Item>
    where
        S: CacheStore<Item> + ?Sized,
    {
        let run_id = self.next_run_id();
        self.engine
            .run(
                DS,
                run_id,
                &VecSource::new(items),
                &item_id,
                &same_item,
                Some(EmptyDatasetGuard::DeleteAll),
                store,
            )
            .await
    }

    /// Latest live value per identifier, ordered by identifier.
    pub async fn live(&self) -> Vec<(String, i32)> {
        self.db
            .latest_rows(DS)
            .await
            .into_iter()
            .filter(|r| r.code != DeltaCode::Delete)
            .filter_map(|r| r.current.map(|c| (r.identifier, c.v)))
            .collect()
    }
}

/// Store wrapper that fails every write after the first `allowed` ones.
pub struct FailingStore {
    inner: Box<dyn CacheStore<Item>>,
    allowed: usize,
    writes: usize,
}

impl FailingStore {
    pub fn new(strategy: StorageStrategy, db: CacheDatabase<Item>, allowed: usize) -> Self {
        Self {
            inner: open_store(strategy, db),
            allowed,
            writes: 0,
        }
    }

    fn check(&mut self) -> Result<()> {
        self.writes += 1;
        if self.writes > self.allowed {
            return Err(DeltaError::Store(format!("injected failure on write {}", self.writes)));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore<Item> for FailingStore {
    fn strategy(&self) -> StorageStrategy {
        self.inner.strategy()
    }

    async fn begin(&mut self) -> Result<()> {
        self.inner.begin().await
    }

    async fn commit(&mut self) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await
    }

    async fn max_run_id(&mut self, dataset: DatasetId) -> Result<Option<RunId>> {
        self.inner.max_run_id(dataset).await
    }

    async fn find_latest(&mut self, dataset: DatasetId, identifier: &str) -> Result<Option<CacheRow<Item>>> {
        self.inner.find_latest(dataset, identifier).await
    }

    async fn find_rows_at_run(
        &mut self,
        dataset: DatasetId,
        run_id: RunId,
        excluding: DeltaCode,
        page: RowPage,
    ) -> Result<Vec<CacheRow<Item>>> {
        self.inner.find_rows_at_run(dataset, run_id, excluding, page).await
    }

    async fn insert(&mut self, row: CacheRow<Item>) -> Result<RowKey> {
        self.check()?;
        self.inner.insert(row).await
    }

    async fn update(&mut self, row: CacheRow<Item>) -> Result<()> {
        self.check()?;
        self.inner.update(row).await
    }

    async fn delete_below_run(&mut self, dataset: DatasetId, code: DeltaCode, below: RunId) -> Result<usize> {
        self.inner.delete_below_run(dataset, code, below).await
    }

    async fn delete_dataset(&mut self, dataset: DatasetId) -> Result<usize> {
        self.inner.delete_dataset(dataset).await
    }

    async fn has_history(&mut self, dataset: DatasetId, identifier: &str) -> Result<bool> {
        self.inner.has_history(dataset, identifier).await
    }
}
