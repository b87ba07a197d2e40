use crate::core::{DeltaError, DeltaEvent, Result, RunId};

/// Outcome of one engine run.
///
/// A failed run keeps its best-effort counts for logging, carries no events
/// (nothing it wrote was committed) and holds the error that ended it.
#[derive(Debug)]
pub struct RunResult<E> {
    pub run_id: RunId,
    pub success: bool,
    pub errors: Vec<String>,
    pub dataset_count: u64,
    pub delta_count: u64,
    pub events: Vec<DeltaEvent<E>>,
    /// The empty-dataset guard skipped deletion detection.
    pub bypassed: bool,
    error: Option<DeltaError>,
}

impl<E> RunResult<E> {
    pub(crate) fn started(run_id: RunId) -> Self {
        Self {
            run_id,
            success: false,
            errors: Vec::new(),
            dataset_count: 0,
            delta_count: 0,
            events: Vec::new(),
            bypassed: false,
            error: None,
        }
    }

    pub(crate) fn succeed(mut self) -> Self {
        self.success = true;
        self
    }

    pub(crate) fn fail(mut self, error: DeltaError) -> Self {
        self.success = false;
        self.events.clear();
        self.errors.push(error.to_string());
        self.error = Some(error);
        self
    }

    pub fn error(&self) -> Option<&DeltaError> {
        self.error.as_ref()
    }

    /// Re-raise the error of a failed run.
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}
