// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Command Pattern for cache writes. Each Change is recorded while the
// transaction is active, replayed against the committed table on COMMIT and
// discarded on ROLLBACK.
//
// ============================================================================

use crate::core::{CacheRow, DatasetId, Result, RowKey};
use crate::storage::table::CacheTable;
use std::collections::HashSet;

/// A single buffered cache write
#[derive(Debug, Clone)]
pub enum Change<E> {
    /// Insert a new row under a freshly allocated key
    InsertRow { row: CacheRow<E> },

    /// Overwrite an existing row in place
    UpdateRow { key: RowKey, row: CacheRow<E> },

    /// Remove an explicit set of rows, resolved while the transaction was active
    DeleteRows { dataset: DatasetId, keys: Vec<RowKey> },

    /// Remove every row of a dataset
    DeleteDataset { dataset: DatasetId },
}

impl<E> Change<E> {
    pub fn dataset(&self) -> DatasetId {
        match self {
            Change::InsertRow { row } => row.dataset,
            Change::UpdateRow { row, .. } => row.dataset,
            Change::DeleteRows { dataset, .. } => *dataset,
            Change::DeleteDataset { dataset } => *dataset,
        }
    }

    /// True for changes that write row content (as opposed to removing rows)
    pub fn is_write(&self) -> bool {
        matches!(self, Change::InsertRow { .. } | Change::UpdateRow { .. })
    }
}

/// Ordered change log plus the overlay reads need to see uncommitted state.
///
/// `written` holds the newest uncommitted version of every row touched by an
/// insert or update, indexed like the committed table. `removed` holds
/// keys hidden by a pending delete.
#[derive(Debug)]
pub struct ChangeLog<E> {
    changes: Vec<Change<E>>,
    written: CacheTable<E>,
    removed: HashSet<RowKey>,
    cleared: HashSet<DatasetId>,
}

impl<E> Default for ChangeLog<E> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            written: CacheTable::default(),
            removed: HashSet::new(),
            cleared: HashSet::new(),
        }
    }
}

impl<E> ChangeLog<E> {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<Change<E>> {
        self.changes
    }
}

impl<E: Clone> ChangeLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&mut self, key: RowKey, row: CacheRow<E>) -> Result<()> {
        let row = row.with_key(key);
        self.written.insert_at(key, row.clone())?;
        self.changes.push(Change::InsertRow { row });
        Ok(())
    }

    pub fn record_update(&mut self, key: RowKey, row: CacheRow<E>) -> Result<()> {
        let row = row.with_key(key);
        if self.written.get(&key).is_some() {
            self.written.update_at(key, row.clone())?;
        } else {
            self.written.insert_at(key, row.clone())?;
        }
        self.changes.push(Change::UpdateRow { key, row });
        Ok(())
    }

    /// Record the removal of rows resolved against the overlay. Keys of
    /// pending rows are dropped from `written` and stay hidden.
    pub fn record_delete_rows(&mut self, dataset: DatasetId, keys: impl IntoIterator<Item = RowKey>) -> usize {
        let mut keys: Vec<RowKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        let mut count = 0;
        for key in &keys {
            let pending = self.written.remove(key).is_some();
            if self.removed.insert(*key) || pending {
                count += 1;
            }
        }
        self.changes.push(Change::DeleteRows { dataset, keys });
        count
    }

    pub fn record_delete_dataset(&mut self, dataset: DatasetId) -> usize {
        let count = self.written.delete_dataset(dataset);
        self.cleared.insert(dataset);
        self.changes.push(Change::DeleteDataset { dataset });
        count
    }

    pub fn written(&self) -> &CacheTable<E> {
        &self.written
    }

    /// Whether a committed row is hidden from reads inside this transaction.
    pub fn hides(&self, dataset: DatasetId, key: &RowKey) -> bool {
        self.cleared.contains(&dataset) || self.removed.contains(key) || self.written.get(key).is_some()
    }
}
