// ============================================================================
// Transaction State Management
// ============================================================================
//
// State Pattern for the cache transaction lifecycle:
// Active -> Committed | Aborted. A transaction is owned by exactly one store
// handle; its buffered changes only reach the shared table on commit.
//
// ============================================================================

use super::change::ChangeLog;
use crate::core::{DeltaError, Result};
use uuid::Uuid;

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0.simple())
    }
}

/// Transaction state
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A cache transaction with its buffered changes
#[derive(Debug)]
pub struct Transaction<E> {
    id: TransactionId,
    state: TransactionState,
    changes: ChangeLog<E>,
    start_time: std::time::Instant,
}

impl<E> Transaction<E> {
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Active,
            changes: ChangeLog::default(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn changes(&self) -> &ChangeLog<E> {
        &self.changes
    }

    pub fn changes_mut(&mut self) -> Result<&mut ChangeLog<E>> {
        self.ensure_active()?;
        Ok(&mut self.changes)
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Move to Committed and hand back the change log for replay.
    pub fn commit(&mut self) -> Result<ChangeLog<E>> {
        self.ensure_active()?;
        self.state = TransactionState::Committed;
        Ok(std::mem::take(&mut self.changes))
    }

    /// Move to Aborted, discarding buffered changes. Returns how many were dropped.
    pub fn rollback(&mut self) -> Result<usize> {
        self.ensure_active()?;
        self.state = TransactionState::Aborted;
        let discarded = self.changes.len();
        self.changes = ChangeLog::default();
        Ok(discarded)
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DeltaError::TransactionState(format!(
                "transaction {} is {}",
                self.id, self.state
            )));
        }
        Ok(())
    }
}

impl<E> Default for Transaction<E> {
    fn default() -> Self {
        Self::new()
    }
}
