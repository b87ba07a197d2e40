use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a run does when the source yields no entities at all.
///
/// There is deliberately no `Default`: an empty pull caused by an outage
/// must never be silently read as "everything was deleted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyDatasetGuard {
    /// Trust the empty pull; every previously live entity gets a DELETE.
    DeleteAll,
    /// Treat the empty pull as no information: skip deletion detection and
    /// commit nothing.
    BypassDeletes,
}

impl fmt::Display for EmptyDatasetGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyDatasetGuard::DeleteAll => write!(f, "delete-all"),
            EmptyDatasetGuard::BypassDeletes => write!(f, "bypass"),
        }
    }
}

impl FromStr for EmptyDatasetGuard {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete-all" | "delete_all" => Ok(EmptyDatasetGuard::DeleteAll),
            "bypass" | "bypass-deletes" | "bypass_deletes" => Ok(EmptyDatasetGuard::BypassDeletes),
            other => Err(format!("unknown empty-dataset guard '{}'", other)),
        }
    }
}
