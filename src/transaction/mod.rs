// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Buffered cache transactions: every write of a delta run is recorded in a
// change log and becomes visible to other handles only on commit.
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::{Change, ChangeLog};
pub use state::{Transaction, TransactionId, TransactionState};
