use crate::core::{DeltaError, Result};
use crate::engine::{EmptyDatasetGuard, RetentionPolicy};
use crate::run::RunMode;
use crate::storage::StorageStrategy;

pub const DEFAULT_DELETION_PAGE_SIZE: usize = 500;

/// Delta run configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Which cache store the runner opens
    pub storage: StorageStrategy,

    /// Behavior on an empty pull; required, there is no implicit default
    pub empty_guard: Option<EmptyDatasetGuard>,

    /// Report NONE classifications in the run's events
    pub emit_unchanged: bool,

    /// Previous-run rows read per page during deletion detection
    pub deletion_page_size: usize,

    /// Rows pruned below the finished run after a successful run
    pub retention: RetentionPolicy,

    /// Mode recorded on the run row
    pub run_mode: RunMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            storage: StorageStrategy::AppendOnly,
            empty_guard: None,
            emit_unchanged: false,
            deletion_page_size: DEFAULT_DELETION_PAGE_SIZE,
            retention: RetentionPolicy::deletes(),
            run_mode: RunMode::SetDelta,
        }
    }

    pub fn storage(mut self, storage: StorageStrategy) -> Self {
        self.storage = storage;
        self
    }

    pub fn empty_guard(mut self, guard: EmptyDatasetGuard) -> Self {
        self.empty_guard = Some(guard);
        self
    }

    pub fn emit_unchanged(mut self, emit: bool) -> Self {
        self.emit_unchanged = emit;
        self
    }

    pub fn deletion_page_size(mut self, size: usize) -> Self {
        self.deletion_page_size = size;
        self
    }

    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention = policy;
        self
    }

    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = mode;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.empty_guard.is_none() {
            return Err(DeltaError::GuardNotConfigured);
        }

        if self.deletion_page_size == 0 {
            return Err(DeltaError::Config("deletion_page_size must be > 0".to_string()));
        }

        self.retention.validate()
    }
}
