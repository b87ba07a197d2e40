pub mod delta;
pub mod guard;
pub mod pruner;
pub mod result;
pub mod source;

pub use delta::{DeltaEngine, classify};
pub use guard::EmptyDatasetGuard;
pub use pruner::{RetentionPolicy, RetentionPruner};
pub use result::RunResult;
pub use source::{EntityStream, NdjsonSource, SourceProducer, VecSource};
