//! Index rows.

use serde::{Deserialize, Serialize};

use super::record::{MetaRecord, MetaTable};

/// One column of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    /// Field identifier.
    pub field_id: i64,
    /// Descending order.
    #[serde(default)]
    pub desc: bool,
}

/// An index (or foreign key) declared on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Stable identifier.
    pub id: i64,
    /// Owning item.
    pub owner_id: i64,
    /// Owning task identifier.
    #[serde(default)]
    pub task_id: i64,
    /// Physical index name.
    pub index_name: String,
    /// Unique index.
    #[serde(default)]
    pub unique: bool,
    /// The index is a foreign key on `foreign_field`.
    #[serde(default)]
    pub foreign_index: bool,
    /// Lookup field carrying the foreign key.
    #[serde(default)]
    pub foreign_field: Option<i64>,
    /// Ordered index columns.
    #[serde(default)]
    pub fields: Vec<IndexField>,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
}

impl IndexRecord {
    /// Create a plain index with no columns; add them with [`IndexRecord::with_field`].
    pub fn new(id: i64, owner_id: i64, index_name: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            task_id: 0,
            index_name: index_name.into(),
            unique: false,
            foreign_index: false,
            foreign_field: None,
            fields: Vec::new(),
            deleted: false,
        }
    }

    /// Create a foreign-key index on a lookup field.
    pub fn foreign(id: i64, owner_id: i64, index_name: impl Into<String>, field_id: i64) -> Self {
        let mut index = Self::new(id, owner_id, index_name);
        index.foreign_index = true;
        index.foreign_field = Some(field_id);
        index
    }

    /// Append an ascending column.
    pub fn with_field(mut self, field_id: i64) -> Self {
        self.fields.push(IndexField {
            field_id,
            desc: false,
        });
        self
    }

    /// Append a descending column.
    pub fn with_desc_field(mut self, field_id: i64) -> Self {
        self.fields.push(IndexField {
            field_id,
            desc: true,
        });
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Check if the index references the given field.
    pub fn references_field(&self, field_id: i64) -> bool {
        if self.foreign_index {
            self.foreign_field == Some(field_id)
        } else {
            self.fields.iter().any(|f| f.field_id == field_id)
        }
    }
}

impl MetaRecord for IndexRecord {
    const TABLE: MetaTable = MetaTable::Indices;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> Option<i64> {
        Some(self.owner_id)
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
