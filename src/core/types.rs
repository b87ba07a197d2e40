use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scopes every cache row and run to one logical change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId(pub i64);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run identifier, strictly increasing in allocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub i64);

impl RunId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

/// Store-assigned key of a cache row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(pub u64);

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeltaCode {
    Add,
    Update,
    Delete,
    None,
}

impl DeltaCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaCode::Add => "ADD",
            DeltaCode::Update => "UPDATE",
            DeltaCode::Delete => "DELETE",
            DeltaCode::None => "NONE",
        }
    }

    /// ADD, UPDATE and DELETE count as changes; NONE does not.
    pub fn is_change(&self) -> bool {
        !matches!(self, DeltaCode::None)
    }
}

impl fmt::Display for DeltaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeltaCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADD" => Ok(DeltaCode::Add),
            "UPDATE" => Ok(DeltaCode::Update),
            "DELETE" => Ok(DeltaCode::Delete),
            "NONE" => Ok(DeltaCode::None),
            other => Err(format!("unknown delta code '{}'", other)),
        }
    }
}

/// A persisted cache entry: an entity's state and classification at one run.
///
/// Rows are built through the classification constructors so that a DELETE
/// never carries a current value and an ADD never carries a previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRow<E> {
    pub key: Option<RowKey>,
    pub dataset: DatasetId,
    pub run_id: RunId,
    pub identifier: String,
    pub code: DeltaCode,
    pub delta_date: DateTime<Utc>,
    pub current: Option<E>,
    pub previous: Option<E>,
}

impl<E> CacheRow<E> {
    fn new(
        dataset: DatasetId,
        run_id: RunId,
        identifier: String,
        code: DeltaCode,
        current: Option<E>,
        previous: Option<E>,
    ) -> Self {
        Self {
            key: None,
            dataset,
            run_id,
            identifier,
            code,
            delta_date: Utc::now(),
            current,
            previous,
        }
    }

    pub fn added(dataset: DatasetId, run_id: RunId, identifier: String, current: E) -> Self {
        Self::new(dataset, run_id, identifier, DeltaCode::Add, Some(current), None)
    }

    pub fn updated(
        dataset: DatasetId,
        run_id: RunId,
        identifier: String,
        current: E,
        previous: Option<E>,
    ) -> Self {
        Self::new(dataset, run_id, identifier, DeltaCode::Update, Some(current), previous)
    }

    pub fn unchanged(
        dataset: DatasetId,
        run_id: RunId,
        identifier: String,
        current: E,
        previous: Option<E>,
    ) -> Self {
        Self::new(dataset, run_id, identifier, DeltaCode::None, Some(current), previous)
    }

    pub fn deleted(dataset: DatasetId, run_id: RunId, identifier: String, previous: Option<E>) -> Self {
        Self::new(dataset, run_id, identifier, DeltaCode::Delete, None, previous)
    }

    pub fn with_key(mut self, key: RowKey) -> Self {
        self.key = Some(key);
        self
    }

    /// A latest row coded DELETE means the identifier is currently absent.
    pub fn is_live(&self) -> bool {
        self.code != DeltaCode::Delete
    }
}

/// Caller-visible projection of one classified cache-row write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaEvent<E> {
    pub identifier: String,
    pub code: DeltaCode,
    pub delta_date: DateTime<Utc>,
    pub success: bool,
    pub current: Option<E>,
    pub previous: Option<E>,
}

impl<E: Clone> From<&CacheRow<E>> for DeltaEvent<E> {
    fn from(row: &CacheRow<E>) -> Self {
        Self {
            identifier: row.identifier.clone(),
            code: row.code,
            delta_date: row.delta_date,
            success: true,
            current: row.current.clone(),
            previous: row.previous.clone(),
        }
    }
}
