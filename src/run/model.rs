use crate::core::{DatasetId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Success => write!(f, "SUCCESS"),
            RunStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// What a run computes. Only full-set delta detection exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    SetDelta,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::SetDelta => write!(f, "SET_DELTA"),
        }
    }
}

/// Run bookkeeping row.
///
/// Created `Running` by [`RunTracker::start_run`](super::RunTracker::start_run)
/// and mutated exactly once when completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub dataset: DatasetId,
    pub mode: RunMode,
    pub status: RunStatus,
    pub status_message: Option<String>,
    pub dataset_count: u64,
    pub delta_count: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Run {
    pub fn started(run_id: RunId, dataset: DatasetId, mode: RunMode) -> Self {
        Self {
            run_id,
            dataset,
            mode,
            status: RunStatus::Running,
            status_message: None,
            dataset_count: 0,
            delta_count: 0,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Wall time between start and completion, if completed.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Final values a finished run reports to its tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCompletion {
    pub success: bool,
    pub message: Option<String>,
    pub dataset_count: u64,
    pub delta_count: u64,
}

impl RunCompletion {
    pub fn success(dataset_count: u64, delta_count: u64) -> Self {
        Self {
            success: true,
            message: None,
            dataset_count,
            delta_count,
        }
    }

    pub fn failure(message: impl Into<String>, dataset_count: u64, delta_count: u64) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            dataset_count,
            delta_count,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.success {
            RunStatus::Success
        } else {
            RunStatus::Failure
        }
    }
}
