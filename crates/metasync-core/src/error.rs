//! Core error types.

use thiserror::Error;

use crate::metadata::MetaTable;

/// Core metadata and storage errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Bundle archive error.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A record with the same identifier appears twice in one table.
    #[error("duplicate identifier {id} in {table}")]
    DuplicateId {
        /// The table containing the duplicate.
        table: MetaTable,
        /// The duplicated identifier.
        id: i64,
    },

    /// Record not found.
    #[error("{table} record {id} not found")]
    NotFound {
        /// The table that was searched.
        table: MetaTable,
        /// The missing identifier.
        id: i64,
    },

    /// The task registration row is missing.
    #[error("no task is registered in the metadata repository")]
    NoTask,

    /// Metadata transaction was aborted.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<sled::transaction::TransactionError<Error>> for Error {
    fn from(err: sled::transaction::TransactionError<Error>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => Error::Storage(e),
        }
    }
}
