//! Snapshot persistence for the cache database and its run rows.

use super::database::CacheDatabase;
use super::table::CacheTable;
use crate::core::{CacheRow, Result};
use crate::run::{InMemoryRunTracker, Run};
use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Database Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSnapshot<E> {
    pub version: u32,
    pub rows: Vec<CacheRow<E>>,
    pub next_key: u64,
    pub runs: Vec<Run>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub row_count: usize,
    pub run_count: usize,
}

impl<E: Clone + Send + Sync> DatabaseSnapshot<E> {
    pub fn new(rows: Vec<CacheRow<E>>, next_key: u64, runs: Vec<Run>) -> Self {
        let metadata = SnapshotMetadata {
            created_at: Utc::now(),
            row_count: rows.len(),
            run_count: runs.len(),
        };
        Self {
            version: SNAPSHOT_VERSION,
            rows,
            next_key,
            runs,
            metadata,
        }
    }

    /// Capture the committed state of a database and tracker.
    pub async fn capture(db: &CacheDatabase<E>, tracker: &InMemoryRunTracker) -> Self {
        Self::new(db.rows().await, db.peek_next_key(), tracker.all_runs().await)
    }

    /// Rebuild a database and tracker. Neither row keys nor run ids are
    /// reissued afterwards.
    pub fn restore(self) -> Result<(CacheDatabase<E>, InMemoryRunTracker)> {
        let table = CacheTable::from_rows(self.rows)?;
        let db = CacheDatabase::from_table(table, self.next_key);
        let tracker = InMemoryRunTracker::from_runs(self.runs);
        Ok((db, tracker))
    }
}

// ============================================================================
// Snapshot File
// ============================================================================

pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot to a temporary file beside the target, then
    /// rename it into place.
    pub fn save<E: Serialize>(&self, snapshot: &DatabaseSnapshot<E>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let serialized = rmp_serde::to_vec(snapshot)?;
        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(&serialized)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;
        debug!(
            "saved snapshot {} ({} rows, {} runs)",
            self.path.display(),
            snapshot.metadata.row_count,
            snapshot.metadata.run_count
        );
        Ok(())
    }

    pub fn load<E: DeserializeOwned>(&self) -> Result<Option<DatabaseSnapshot<E>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        let snapshot: DatabaseSnapshot<E> = rmp_serde::from_slice(&data)?;
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DatasetId, RunId};
    use crate::run::RunMode;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(temp_dir.path().join("state").join("cache.snapshot"));
        assert!(file.load::<i32>().unwrap().is_none());

        let rows = vec![CacheRow::added(DatasetId(1), RunId(1), "A".into(), 1).with_key(crate::core::RowKey(1))];
        let runs = vec![Run::started(RunId(1), DatasetId(1), RunMode::SetDelta)];
        file.save(&DatabaseSnapshot::new(rows, 2, runs)).unwrap();
        assert!(file.exists());

        let loaded = file.load::<i32>().unwrap().unwrap();
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        assert_eq!(loaded.metadata.row_count, 1);
        assert_eq!(loaded.rows[0].current, Some(1));
        assert_eq!(loaded.runs[0].run_id, RunId(1));

        file.delete().unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.snapshot");
        fs::write(&path, b"not msgpack at all").unwrap();
        assert!(SnapshotFile::new(&path).load::<i32>().is_err());
    }
}
