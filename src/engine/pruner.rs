use crate::core::{DatasetId, DeltaCode, DeltaError, Result, RunId};
use crate::storage::{CacheStore, StorageStrategy};
use log::{debug, info, warn};

/// Delta codes whose superseded rows are discarded after a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    codes: Vec<DeltaCode>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::deletes()
    }
}

impl RetentionPolicy {
    /// Prune DELETE rows only: they have no successor and serve as audit.
    pub fn deletes() -> Self {
        Self {
            codes: vec![DeltaCode::Delete],
        }
    }

    pub fn disabled() -> Self {
        Self { codes: Vec::new() }
    }

    pub fn with_code(mut self, code: DeltaCode) -> Self {
        if !self.codes.contains(&code) {
            self.codes.push(code);
        }
        self
    }

    pub fn codes(&self) -> &[DeltaCode] {
        &self.codes
    }

    pub fn is_disabled(&self) -> bool {
        self.codes.is_empty()
    }

    /// ADD and UPDATE rows may be the latest state of a live entity and can
    /// never be pruned.
    pub fn validate(&self) -> Result<()> {
        match self.codes.iter().find(|c| matches!(c, DeltaCode::Add | DeltaCode::Update)) {
            Some(code) => Err(DeltaError::InvalidRetentionCode(*code)),
            None => Ok(()),
        }
    }
}

/// Bounds append-only cache growth, outside the run's own transaction.
#[derive(Debug, Clone, Default)]
pub struct RetentionPruner {
    policy: RetentionPolicy,
}

impl RetentionPruner {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Remove rows coded `code` with a run id strictly below `below`, in a
    /// transaction of its own. A no-op for latest-state storage.
    pub async fn prune<E, S>(&self, store: &mut S, dataset: DatasetId, code: DeltaCode, below: RunId) -> Result<usize>
    where
        E: Clone + Send + Sync + 'static,
        S: CacheStore<E> + ?Sized,
    {
        self.prune_codes(store, dataset, &[code], below).await
    }

    /// Apply the whole policy below `below`.
    pub async fn prune_policy<E, S>(&self, store: &mut S, dataset: DatasetId, below: RunId) -> Result<usize>
    where
        E: Clone + Send + Sync + 'static,
        S: CacheStore<E> + ?Sized,
    {
        self.prune_codes(store, dataset, self.policy.codes(), below).await
    }

    async fn prune_codes<E, S>(&self, store: &mut S, dataset: DatasetId, codes: &[DeltaCode], below: RunId) -> Result<usize>
    where
        E: Clone + Send + Sync + 'static,
        S: CacheStore<E> + ?Sized,
    {
        if codes.is_empty() {
            return Ok(0);
        }
        if store.strategy() == StorageStrategy::LatestState {
            debug!("dataset {}: latest-state storage keeps no history to prune", dataset);
            return Ok(0);
        }
        RetentionPolicy { codes: codes.to_vec() }.validate()?;

        store.begin().await?;
        let mut removed = 0;
        for code in codes {
            match store.delete_below_run(dataset, *code, below).await {
                Ok(count) => removed += count,
                Err(e) => {
                    if let Err(rb) = store.rollback().await {
                        warn!("dataset {}: prune rollback failed: {}", dataset, rb);
                    }
                    return Err(e);
                }
            }
        }
        store.commit().await?;
        info!("dataset {}: pruned {} rows below {}", dataset, removed, below);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_validation() {
        assert!(RetentionPolicy::deletes().validate().is_ok());
        assert!(RetentionPolicy::deletes().with_code(DeltaCode::None).validate().is_ok());
        let bad = RetentionPolicy::disabled().with_code(DeltaCode::Update);
        assert!(matches!(bad.validate(), Err(DeltaError::InvalidRetentionCode(DeltaCode::Update))));
        assert!(RetentionPolicy::disabled().is_disabled());
    }

    #[test]
    fn test_with_code_deduplicates() {
        let policy = RetentionPolicy::deletes().with_code(DeltaCode::Delete);
        assert_eq!(policy.codes(), &[DeltaCode::Delete]);
    }
}
