//! Transactional apply pipeline.
//!
//! A [`Plan`] bundles the old and new snapshots with their delta and the
//! synthesized DDL. [`ApplyPipeline::apply`] runs the DDL first, as one
//! transaction where the dialect allows it, and commits the metadata rows
//! only after the database accepted every statement.

mod error;
mod pipeline;
mod progress;
mod write_set;

pub use error::SyncError;
pub use pipeline::{ApplyOutcome, ApplyPipeline, Committer, Connector, Plan};
pub use progress::{ProgressEntry, ProgressLog, Stage};
pub use write_set::build_write_set;
