//! Snapshot differencer.
//!
//! Compares an old and a new [`Snapshot`](crate::metadata::Snapshot) by
//! stable identifier and classifies every row as inserted, modified,
//! deleted or unchanged. Fields are diffed per owning item.

mod delta;
mod differ;

pub use delta::{ChangeStatus, Delta, ItemChange, TableDelta};
pub use differ::{diff, diff_records};
