use crate::core::{CacheRow, DatasetId, DeltaCode, DeltaError, Result, RowKey, RunId};
use crate::transaction::Change;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// Committed cache rows with secondary indexes on identifier and run.
#[derive(Debug, Clone)]
pub struct CacheTable<E> {
    rows: BTreeMap<RowKey, CacheRow<E>>,
    by_identifier: HashMap<(DatasetId, String), BTreeSet<RowKey>>,
    by_run: BTreeMap<(DatasetId, RunId), BTreeSet<RowKey>>,
}

impl<E> Default for CacheTable<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_identifier: HashMap::new(),
            by_run: BTreeMap::new(),
        }
    }
}

impl<E: Clone> CacheTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table (and its indexes) from keyed rows.
    pub fn from_rows(rows: impl IntoIterator<Item = CacheRow<E>>) -> Result<Self> {
        let mut table = Self::new();
        for row in rows {
            let key = row
                .key
                .ok_or_else(|| DeltaError::Store(format!("row for '{}' has no key", row.identifier)))?;
            table.insert_at(key, row)?;
        }
        Ok(table)
    }

    pub fn get(&self, key: &RowKey) -> Option<&CacheRow<E>> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &CacheRow<E>> {
        self.rows.values()
    }

    pub fn max_key(&self) -> Option<RowKey> {
        self.rows.keys().next_back().copied()
    }

    pub fn insert_at(&mut self, key: RowKey, row: CacheRow<E>) -> Result<()> {
        if self.rows.contains_key(&key) {
            return Err(DeltaError::ConstraintViolation(format!("row key {} already exists", key)));
        }
        let row = row.with_key(key);
        self.index(key, &row);
        self.rows.insert(key, row);
        Ok(())
    }

    pub fn update_at(&mut self, key: RowKey, row: CacheRow<E>) -> Result<()> {
        let old = self
            .rows
            .remove(&key)
            .ok_or_else(|| DeltaError::Store(format!("row key {} not found", key)))?;
        self.unindex(key, &old);
        let row = row.with_key(key);
        self.index(key, &row);
        self.rows.insert(key, row);
        Ok(())
    }

    pub fn remove(&mut self, key: &RowKey) -> Option<CacheRow<E>> {
        let row = self.rows.remove(key)?;
        self.unindex(*key, &row);
        Some(row)
    }

    pub fn delete_dataset(&mut self, dataset: DatasetId) -> usize {
        let keys: Vec<RowKey> = self.keys_of_dataset(dataset).collect();
        let count = keys.len();
        for key in keys {
            self.remove(&key);
        }
        count
    }

    /// Replay one committed change.
    pub fn apply(&mut self, change: Change<E>) -> Result<()> {
        match change {
            Change::InsertRow { row } => {
                let key = row
                    .key
                    .ok_or_else(|| DeltaError::Store("pending insert without a row key".into()))?;
                self.insert_at(key, row)
            }
            Change::UpdateRow { key, row } => self.update_at(key, row),
            Change::DeleteRows { keys, .. } => {
                for key in keys {
                    self.remove(&key);
                }
                Ok(())
            }
            Change::DeleteDataset { dataset } => {
                self.delete_dataset(dataset);
                Ok(())
            }
        }
    }

    pub fn keys_for_identifier(&self, dataset: DatasetId, identifier: &str) -> impl Iterator<Item = RowKey> + '_ {
        self.by_identifier
            .get(&(dataset, identifier.to_string()))
            .into_iter()
            .flat_map(|keys| keys.iter().copied())
    }

    pub fn keys_at_run(&self, dataset: DatasetId, run_id: RunId) -> impl Iterator<Item = RowKey> + '_ {
        self.by_run
            .get(&(dataset, run_id))
            .into_iter()
            .flat_map(|keys| keys.iter().copied())
    }

    /// Keys at a run in ascending order, strictly after `after` when given.
    pub fn keys_at_run_after(
        &self,
        dataset: DatasetId,
        run_id: RunId,
        after: Option<RowKey>,
    ) -> impl Iterator<Item = RowKey> + '_ {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        self.by_run
            .get(&(dataset, run_id))
            .into_iter()
            .flat_map(move |keys| keys.range((lower, Bound::Unbounded)).copied())
    }

    pub fn keys_below_run_with_code(&self, dataset: DatasetId, code: DeltaCode, below: RunId) -> Vec<RowKey> {
        self.by_run
            .range((dataset, RunId(i64::MIN))..(dataset, below))
            .flat_map(|(_, keys)| keys.iter())
            .filter(|key| self.rows.get(*key).is_some_and(|r| r.code == code))
            .copied()
            .collect()
    }

    pub fn keys_of_dataset(&self, dataset: DatasetId) -> impl Iterator<Item = RowKey> + '_ {
        self.by_run
            .range((dataset, RunId(i64::MIN))..=(dataset, RunId(i64::MAX)))
            .flat_map(|(_, keys)| keys.iter().copied())
    }

    /// Run ids holding rows for a dataset, newest first.
    pub fn runs_desc(&self, dataset: DatasetId) -> impl Iterator<Item = (RunId, &BTreeSet<RowKey>)> + '_ {
        self.by_run
            .range((dataset, RunId(i64::MIN))..=(dataset, RunId(i64::MAX)))
            .rev()
            .map(|((_, run), keys)| (*run, keys))
    }

    /// Newest row per identifier of a dataset, ordered by identifier.
    pub fn latest_rows(&self, dataset: DatasetId) -> Vec<&CacheRow<E>> {
        let mut latest: BTreeMap<&str, &CacheRow<E>> = BTreeMap::new();
        for key in self.keys_of_dataset(dataset) {
            let Some(row) = self.rows.get(&key) else { continue };
            let newer = latest
                .get(row.identifier.as_str())
                .is_none_or(|seen| (row.run_id, row.key) > (seen.run_id, seen.key));
            if newer {
                latest.insert(row.identifier.as_str(), row);
            }
        }
        latest.into_values().collect()
    }

    fn index(&mut self, key: RowKey, row: &CacheRow<E>) {
        self.by_identifier
            .entry((row.dataset, row.identifier.clone()))
            .or_default()
            .insert(key);
        self.by_run.entry((row.dataset, row.run_id)).or_default().insert(key);
    }

    fn unindex(&mut self, key: RowKey, row: &CacheRow<E>) {
        let id_key = (row.dataset, row.identifier.clone());
        if let Some(keys) = self.by_identifier.get_mut(&id_key) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_identifier.remove(&id_key);
            }
        }
        let run_key = (row.dataset, row.run_id);
        if let Some(keys) = self.by_run.get_mut(&run_key) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_run.remove(&run_key);
            }
        }
    }
}
