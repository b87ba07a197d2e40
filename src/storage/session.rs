use super::database::CacheDatabase;
use crate::core::{CacheRow, DatasetId, DeltaCode, DeltaError, Result, RowKey, RunId};
use crate::transaction::{ChangeLog, Transaction, TransactionId};
use log::{debug, warn};
use std::collections::BTreeSet;

/// Connection-like handle on a `CacheDatabase`.
///
/// Reads outside a transaction see committed state; reads inside one see
/// committed state overlaid with the transaction's own pending changes.
/// Writes require an open transaction. Dropping the handle with an open
/// transaction rolls it back.
pub struct Session<E> {
    db: CacheDatabase<E>,
    txn: Option<Transaction<E>>,
}

impl<E: Clone + Send + Sync> Session<E> {
    pub fn new(db: CacheDatabase<E>) -> Self {
        Self { db, txn: None }
    }

    pub fn database(&self) -> &CacheDatabase<E> {
        &self.db
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.txn.as_ref().map(|t| t.id())
    }

    pub fn begin(&mut self) -> Result<TransactionId> {
        if let Some(txn) = &self.txn {
            return Err(DeltaError::TransactionState(format!(
                "transaction {} already active",
                txn.id()
            )));
        }
        let txn = Transaction::new();
        let id = txn.id();
        debug!("{}: begin", id);
        self.txn = Some(txn);
        Ok(id)
    }

    /// Commit the open transaction. The transaction is consumed even when
    /// replay fails, in which case nothing it wrote becomes visible.
    pub async fn commit(&mut self) -> Result<usize> {
        let mut txn = self.take_active()?;
        let log = txn.commit()?;
        let applied = self.db.apply(log).await?;
        debug!("{}: committed {} changes in {:?}", txn.id(), applied, txn.elapsed());
        Ok(applied)
    }

    pub fn rollback(&mut self) -> Result<usize> {
        let mut txn = self.take_active()?;
        let discarded = txn.rollback()?;
        debug!("{}: rolled back {} changes", txn.id(), discarded);
        Ok(discarded)
    }

    fn take_active(&mut self) -> Result<Transaction<E>> {
        self.txn
            .take()
            .ok_or_else(|| DeltaError::TransactionState("no active transaction".into()))
    }

    fn pending(&self) -> Option<&ChangeLog<E>> {
        self.txn.as_ref().map(|t| t.changes())
    }

    fn pending_mut(&mut self) -> Result<&mut ChangeLog<E>> {
        self.txn
            .as_mut()
            .ok_or_else(|| DeltaError::TransactionState("writes require an active transaction".into()))?
            .changes_mut()
    }

    fn hidden(&self, dataset: DatasetId, key: &RowKey) -> bool {
        self.pending().is_some_and(|p| p.hides(dataset, key))
    }

    pub async fn max_run_id(&self, dataset: DatasetId) -> Result<Option<RunId>> {
        let table = self.db.read().await;
        let committed = table
            .runs_desc(dataset)
            .find(|(_, keys)| keys.iter().any(|k| !self.hidden(dataset, k)))
            .map(|(run, _)| run);
        let pending = self
            .pending()
            .and_then(|p| p.written().runs_desc(dataset).next().map(|(run, _)| run));
        Ok(committed.max(pending))
    }

    /// Every visible row of one identifier, ordered by row key.
    pub async fn rows_for_identifier(&self, dataset: DatasetId, identifier: &str) -> Result<Vec<CacheRow<E>>> {
        let table = self.db.read().await;
        let mut rows: Vec<CacheRow<E>> = table
            .keys_for_identifier(dataset, identifier)
            .filter(|k| !self.hidden(dataset, k))
            .filter_map(|k| table.get(&k).cloned())
            .collect();
        if let Some(pending) = self.pending() {
            let written = pending.written();
            rows.extend(
                written
                    .keys_for_identifier(dataset, identifier)
                    .filter_map(|k| written.get(&k).cloned()),
            );
        }
        rows.sort_by_key(|r| r.key);
        Ok(rows)
    }

    /// Newest visible row of one identifier by (run id, row key).
    pub async fn latest_for_identifier(&self, dataset: DatasetId, identifier: &str) -> Result<Option<CacheRow<E>>> {
        let rows = self.rows_for_identifier(dataset, identifier).await?;
        Ok(rows.into_iter().max_by_key(|r| (r.run_id, r.key)))
    }

    /// One page of rows at a run, skipping a delta code, ascending by key.
    pub async fn rows_at_run(
        &self,
        dataset: DatasetId,
        run_id: RunId,
        excluding: DeltaCode,
        after: Option<RowKey>,
        limit: usize,
    ) -> Result<Vec<CacheRow<E>>> {
        let table = self.db.read().await;
        let mut rows: Vec<CacheRow<E>> = table
            .keys_at_run_after(dataset, run_id, after)
            .filter(|k| !self.hidden(dataset, k))
            .filter_map(|k| table.get(&k))
            .filter(|r| r.code != excluding)
            .take(limit)
            .cloned()
            .collect();
        if let Some(pending) = self.pending() {
            let written = pending.written();
            rows.extend(
                written
                    .keys_at_run_after(dataset, run_id, after)
                    .filter_map(|k| written.get(&k))
                    .filter(|r| r.code != excluding)
                    .take(limit)
                    .cloned(),
            );
        }
        rows.sort_by_key(|r| r.key);
        rows.truncate(limit);
        Ok(rows)
    }

    pub fn insert(&mut self, row: CacheRow<E>) -> Result<RowKey> {
        // Validate the transaction before burning a key.
        self.pending_mut()?;
        let key = self.db.next_key();
        self.pending_mut()?.record_insert(key, row)?;
        Ok(key)
    }

    pub async fn update(&mut self, key: RowKey, row: CacheRow<E>) -> Result<()> {
        let visible = {
            let pending_has = self.pending().is_some_and(|p| p.written().get(&key).is_some());
            let table = self.db.read().await;
            let committed_has = table
                .get(&key)
                .is_some_and(|r| !self.hidden(r.dataset, &key));
            pending_has || committed_has
        };
        if !visible {
            return Err(DeltaError::Store(format!("row key {} not found", key)));
        }
        self.pending_mut()?.record_update(key, row)
    }

    /// Remove visible rows coded `code` below `below`.
    ///
    /// A DELETE row takes the identifier's older rows with it, so the deleted
    /// state never degrades into an older live row.
    pub async fn delete_below_run(&mut self, dataset: DatasetId, code: DeltaCode, below: RunId) -> Result<usize> {
        self.pending_mut()?;
        let matched: Vec<CacheRow<E>> = {
            let table = self.db.read().await;
            let mut rows: Vec<CacheRow<E>> = table
                .keys_below_run_with_code(dataset, code, below)
                .into_iter()
                .filter(|k| !self.hidden(dataset, k))
                .filter_map(|k| table.get(&k).cloned())
                .collect();
            if let Some(pending) = self.pending() {
                let written = pending.written();
                rows.extend(
                    written
                        .keys_below_run_with_code(dataset, code, below)
                        .into_iter()
                        .filter_map(|k| written.get(&k).cloned()),
                );
            }
            rows
        };

        let mut doomed: BTreeSet<RowKey> = matched.iter().filter_map(|r| r.key).collect();
        if code == DeltaCode::Delete {
            for deleted in &matched {
                let history = self.rows_for_identifier(dataset, &deleted.identifier).await?;
                doomed.extend(
                    history
                        .iter()
                        .filter(|r| (r.run_id, r.key) < (deleted.run_id, deleted.key))
                        .filter_map(|r| r.key),
                );
            }
        }
        Ok(self.pending_mut()?.record_delete_rows(dataset, doomed))
    }

    pub async fn delete_dataset(&mut self, dataset: DatasetId) -> Result<usize> {
        self.pending_mut()?;
        let committed = {
            let table = self.db.read().await;
            table.keys_of_dataset(dataset).filter(|k| !self.hidden(dataset, k)).count()
        };
        Ok(committed + self.pending_mut()?.record_delete_dataset(dataset))
    }
}

impl<E> Drop for Session<E> {
    fn drop(&mut self) {
        if let Some(mut txn) = self.txn.take()
            && let Ok(discarded) = txn.rollback()
        {
            warn!(
                "{}: handle dropped with open transaction, rolled back {} changes",
                txn.id(),
                discarded
            );
        }
    }
}
