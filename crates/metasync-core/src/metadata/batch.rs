//! Pending metadata writes committed as one unit.

use super::record::{encode_record, record_key, MetaRecord, MetaTable};
use super::settings::Settings;
use crate::error::Error;

/// A single pending row operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace a row.
    Put {
        /// Target table.
        table: MetaTable,
        /// Row identifier.
        id: i64,
        /// Encoded row.
        value: Vec<u8>,
    },
    /// Remove a row.
    Remove {
        /// Target table.
        table: MetaTable,
        /// Row identifier.
        id: i64,
    },
}

impl WriteOp {
    /// Table touched by the operation.
    pub fn table(&self) -> MetaTable {
        match self {
            WriteOp::Put { table, .. } | WriteOp::Remove { table, .. } => *table,
        }
    }

    /// Storage key of the row.
    pub fn key(&self) -> [u8; 8] {
        match self {
            WriteOp::Put { id, .. } | WriteOp::Remove { id, .. } => record_key(*id),
        }
    }
}

/// An ordered list of metadata writes.
///
/// Rows are encoded when queued, so the commit itself cannot fail on
/// serialization. The settings row is held apart because its field id
/// generator must be merged with the stored value at commit time.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    settings: Option<Settings>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insert-or-replace.
    pub fn put<R: MetaRecord>(&mut self, record: &R) -> Result<(), Error> {
        if R::TABLE.snapshot_slot().is_none() || R::TABLE == MetaTable::Params {
            return Err(Error::InvalidData(format!(
                "{} rows cannot be written in a metadata batch",
                R::TABLE
            )));
        }
        let value = encode_record(record)?;
        self.ops.push(WriteOp::Put {
            table: R::TABLE,
            id: record.id(),
            value,
        });
        Ok(())
    }

    /// Queue a removal.
    pub fn remove(&mut self, table: MetaTable, id: i64) {
        self.ops.push(WriteOp::Remove { table, id });
    }

    /// Queue the settings row.
    pub fn put_settings(&mut self, settings: Settings) {
        self.settings = Some(settings);
    }

    /// Append the operations of another batch. Its settings row, if any,
    /// replaces ours.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
        if other.settings.is_some() {
            self.settings = other.settings;
        }
    }

    /// Queued row operations.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Queued settings row.
    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// Number of queued row writes, settings included.
    pub fn len(&self) -> usize {
        self.ops.len() + usize::from(self.settings.is_some())
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count queued operations per table.
    pub fn count_for(&self, table: MetaTable) -> usize {
        self.ops.iter().filter(|op| op.table() == table).count()
    }
}
