//! Live application model and the quiescence protocol.
//!
//! [`LiveApp`] owns the compiled [`TaskModel`] behind a single reference.
//! A structural change raises the maintenance flag, waits for in-flight
//! requests to drain, builds a fresh model from the committed metadata and
//! swaps the reference.

mod activity;
mod controller;
mod model;

pub use activity::{
    ActivityTracker, MaintenanceGuard, QuiescenceOutcome, RequestGuard, Unavailable,
};
pub use controller::LiveApp;
pub use model::{
    CodeModule, DetailNode, FieldNode, GroupNode, ItemNode, ModelError, Rights, TaskModel,
};
