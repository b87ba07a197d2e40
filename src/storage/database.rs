use super::table::CacheTable;
use crate::core::{CacheRow, DatasetId, Result, RowKey};
use crate::transaction::ChangeLog;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard};

/// Shared committed cache state.
///
/// Cloning yields another handle on the same table. Row keys come from a
/// sequence that is never rolled back, so keys burnt by an aborted
/// transaction are not reused.
pub struct CacheDatabase<E> {
    table: Arc<RwLock<CacheTable<E>>>,
    sequence: Arc<AtomicU64>,
}

impl<E> Clone for CacheDatabase<E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            sequence: Arc::clone(&self.sequence),
        }
    }
}

impl<E: Clone + Send + Sync> Default for CacheDatabase<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + Sync> CacheDatabase<E> {
    pub fn new() -> Self {
        Self::from_table(CacheTable::new(), 1)
    }

    /// Wrap an existing table; `next_key` is raised past the table's largest key.
    pub fn from_table(table: CacheTable<E>, next_key: u64) -> Self {
        let floor = table.max_key().map_or(1, |k| k.0 + 1);
        Self {
            table: Arc::new(RwLock::new(table)),
            sequence: Arc::new(AtomicU64::new(next_key.max(floor))),
        }
    }

    pub fn next_key(&self) -> RowKey {
        RowKey(self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    pub fn peek_next_key(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, CacheTable<E>> {
        self.table.read().await
    }

    /// Replay a committed change log atomically.
    ///
    /// Changes are applied to a copy which replaces the table only when every
    /// change succeeded.
    pub async fn apply(&self, log: ChangeLog<E>) -> Result<usize> {
        if log.is_empty() {
            return Ok(0);
        }
        let mut table = self.table.write().await;
        let mut next = (*table).clone();
        let changes = log.into_changes();
        let applied = changes.len();
        for change in changes {
            next.apply(change)?;
        }
        *table = next;
        Ok(applied)
    }

    pub async fn row_count(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn rows(&self) -> Vec<CacheRow<E>> {
        self.table.read().await.rows().cloned().collect()
    }

    pub async fn latest_rows(&self, dataset: DatasetId) -> Vec<CacheRow<E>> {
        self.table
            .read()
            .await
            .latest_rows(dataset)
            .into_iter()
            .cloned()
            .collect()
    }
}
