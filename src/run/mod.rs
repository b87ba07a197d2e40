pub mod model;
pub mod tracker;

pub use model::{Run, RunCompletion, RunMode, RunStatus};
pub use tracker::{InMemoryRunTracker, RunTracker};
