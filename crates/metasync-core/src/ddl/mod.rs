//! DDL synthesis.
//!
//! Turns a [`Delta`](crate::diff::Delta) into an ordered [`DdlScript`] for
//! one dialect. Index drops come first, then table and column changes,
//! then index creation, so new indices only reference current columns.

mod columns;
mod naming;
mod script;
mod synthesizer;

use thiserror::Error;

use crate::dialect::DialectError;

pub use columns::table_columns;
pub use naming::{assign_generator_names, suggest_table_name};
pub use script::{DdlScript, DdlStatement, Phase};
pub use synthesizer::{synthesize, Synthesizer};

/// Errors raised while rendering DDL.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// A column type could not be rendered.
    #[error("table {table}: {source}")]
    Column {
        /// Table being rendered.
        table: String,
        #[source]
        source: DialectError,
    },

    /// A physical item has no primary key column.
    #[error("item {id} ({name}) has no primary key column")]
    MissingPrimaryKey { id: i64, name: String },

    /// An index column does not resolve to a field of its item.
    #[error("index {index} references field {field_id} which is not a column of its table")]
    UnknownIndexField { index: String, field_id: i64 },

    /// A foreign index cannot be traced to a referenced table.
    #[error("foreign index {index} has no resolvable referenced table")]
    UnresolvedForeignKey { index: String },
}
