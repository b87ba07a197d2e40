pub mod entity;
pub mod error;
pub mod types;

pub use entity::{EntityIdentity, EqualityPredicate, JsonEquality, JsonField, values_equal};
pub use error::{BoxError, DeltaError, Result};
pub use types::{CacheRow, DatasetId, DeltaCode, DeltaEvent, RowKey, RunId};
