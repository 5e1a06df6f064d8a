//! Typed access to metadata rows.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The fixed set of metadata tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetaTable {
    /// Entities (items).
    Items,
    /// Fields owned by items.
    Fields,
    /// Indices owned by items.
    Indices,
    /// Filters owned by items.
    Filters,
    /// Report parameters owned by reports.
    ReportParams,
    /// Roles.
    Roles,
    /// Privileges owned by roles.
    Privileges,
    /// Lookup lists.
    LookupLists,
    /// Global settings (a single row).
    Params,
    /// Task registration (a single row, outside snapshots).
    Tasks,
}

impl MetaTable {
    /// Tables captured by a snapshot, in apply order.
    pub const SNAPSHOT_TABLES: [MetaTable; 9] = [
        MetaTable::Items,
        MetaTable::Fields,
        MetaTable::Indices,
        MetaTable::Filters,
        MetaTable::ReportParams,
        MetaTable::Roles,
        MetaTable::Params,
        MetaTable::Privileges,
        MetaTable::LookupLists,
    ];

    /// Name of the sled tree holding the table.
    pub fn tree_name(self) -> &'static str {
        match self {
            MetaTable::Items => "meta:items",
            MetaTable::Fields => "meta:fields",
            MetaTable::Indices => "meta:indices",
            MetaTable::Filters => "meta:filters",
            MetaTable::ReportParams => "meta:report_params",
            MetaTable::Roles => "meta:roles",
            MetaTable::Privileges => "meta:privileges",
            MetaTable::LookupLists => "meta:lookup_lists",
            MetaTable::Params => "meta:params",
            MetaTable::Tasks => "meta:tasks",
        }
    }

    /// Position of the table inside [`MetaTable::SNAPSHOT_TABLES`].
    pub fn snapshot_slot(self) -> Option<usize> {
        Self::SNAPSHOT_TABLES.iter().position(|t| *t == self)
    }
}

impl std::fmt::Display for MetaTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tree_name().trim_start_matches("meta:"))
    }
}

/// A row of one of the metadata tables.
///
/// The differencer and the apply pipeline work exclusively through this
/// trait, so no string-keyed field lookup happens on the hot path.
pub trait MetaRecord: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The table this record lives in.
    const TABLE: MetaTable;

    /// Stable identifier.
    fn id(&self) -> i64;

    /// Identifier of the owning parent record, for detail tables.
    fn owner_id(&self) -> Option<i64> {
        None
    }

    /// Soft-delete flag.
    fn is_deleted(&self) -> bool;

    /// Compare every copyable attribute.
    fn same_content(&self, other: &Self) -> bool {
        self == other
    }

    /// Produce the row to store when `incoming` replaces `self`.
    ///
    /// Attributes that must never be propagated from another snapshot keep
    /// their local value.
    fn adopt(&self, incoming: &Self) -> Self {
        incoming.clone()
    }
}

/// Storage key for a record identifier.
pub fn record_key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Serialize a record for storage.
pub fn encode_record<R: MetaRecord>(record: &R) -> Result<Vec<u8>, crate::error::Error> {
    serde_json::to_vec(record).map_err(|e| crate::error::Error::Serialization(e.to_string()))
}

/// Deserialize a stored record.
pub fn decode_record<R: MetaRecord>(bytes: &[u8]) -> Result<R, crate::error::Error> {
    serde_json::from_slice(bytes).map_err(|e| crate::error::Error::Deserialization(e.to_string()))
}
