use super::types::{DeltaCode, RunId};
use thiserror::Error;

/// Boxed error raised by external collaborators (source producers, custom stores).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DeltaError {
    #[error("Source error: {0}")]
    Source(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Equality predicate failed: {0}")]
    Predicate(String),

    #[error("Identifier extraction failed: {0}")]
    Identity(String),

    #[error("No empty-dataset guard strategy configured")]
    GuardNotConfigured,

    #[error("Identifier '{0}' produced more than once in a single pull")]
    DuplicateIdentifier(String),

    #[error("Transaction error: {0}")]
    TransactionState(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Run {0} not found")]
    RunNotFound(RunId),

    #[error("Run {0} is already completed")]
    RunAlreadyCompleted(RunId),

    #[error("Invalid retention code {0}: only DELETE and NONE rows can be pruned")]
    InvalidRetentionCode(DeltaCode),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl DeltaError {
    pub fn source_failure(err: BoxError) -> Self {
        Self::Source(err.to_string())
    }

    /// True for failures raised by the cache store or its transaction.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Store(_)
                | Self::TransactionState(_)
                | Self::ConstraintViolation(_)
                | Self::Unsupported(_)
                | Self::Lock(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DeltaError>;

impl<T> From<std::sync::PoisonError<T>> for DeltaError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<std::io::Error> for DeltaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DeltaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for DeltaError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for DeltaError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
