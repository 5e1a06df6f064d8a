//! Field rows.

use serde::{Deserialize, Serialize};

use super::record::{MetaRecord, MetaTable};
use super::types::{Alignment, DataType};

/// A field belonging to exactly one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Stable identifier.
    pub id: i64,
    /// Owning item.
    pub owner_id: i64,
    /// Owning task identifier.
    #[serde(default)]
    pub task_id: i64,
    /// Logical (programmatic) name.
    pub field_name: String,
    /// Display caption.
    #[serde(default)]
    pub name: String,
    /// Physical column name.
    #[serde(default)]
    pub db_field_name: String,
    /// Data type tag.
    pub data_type: u8,
    /// Size (characters for text types).
    #[serde(default)]
    pub size: u32,
    /// Value is required.
    #[serde(default)]
    pub required: bool,
    /// Computed on read, not stored.
    #[serde(default)]
    pub calculated: bool,
    /// Read-only in editors.
    #[serde(default)]
    pub read_only: bool,
    /// The field is the item's default lookup display field.
    #[serde(default)]
    pub default: bool,
    /// Default value literal.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Master field this field mirrors (detail linkage).
    #[serde(default)]
    pub master_field: Option<i64>,
    /// Lookup target item.
    #[serde(default)]
    pub lookup_item: Option<i64>,
    /// Lookup target field.
    #[serde(default)]
    pub lookup_field: Option<i64>,
    /// Lookup list of fixed values.
    #[serde(default)]
    pub lookup_values: Option<i64>,
    /// Display alignment tag; 0 derives it from the data type.
    #[serde(default)]
    pub alignment: u8,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
}

impl FieldRecord {
    /// Create a new field row. The physical column name defaults to the
    /// upper-cased logical name.
    pub fn new(id: i64, owner_id: i64, field_name: impl Into<String>, data_type: DataType) -> Self {
        let field_name = field_name.into();
        Self {
            id,
            owner_id,
            task_id: 0,
            name: field_name.clone(),
            db_field_name: field_name.to_uppercase(),
            field_name,
            data_type: data_type.tag(),
            size: 0,
            required: false,
            calculated: false,
            read_only: false,
            default: false,
            default_value: None,
            master_field: None,
            lookup_item: None,
            lookup_field: None,
            lookup_values: None,
            alignment: 0,
            deleted: false,
        }
    }

    /// Set the size.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Set the physical column name.
    pub fn with_column(mut self, db_field_name: impl Into<String>) -> Self {
        self.db_field_name = db_field_name.into();
        self
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as calculated.
    pub fn calculated(mut self) -> Self {
        self.calculated = true;
        self
    }

    /// Set the default value literal.
    pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Link to a master field.
    pub fn with_master_field(mut self, master_field: i64) -> Self {
        self.master_field = Some(master_field);
        self
    }

    /// Set the lookup target.
    pub fn with_lookup(mut self, item: i64, field: i64) -> Self {
        self.lookup_item = Some(item);
        self.lookup_field = Some(field);
        self
    }

    /// Resolve the data type tag.
    pub fn data_type(&self) -> Option<DataType> {
        DataType::from_tag(self.data_type)
    }

    /// Resolve the display alignment.
    pub fn alignment(&self) -> Option<Alignment> {
        match self.alignment {
            1 => Some(Alignment::Left),
            2 => Some(Alignment::Center),
            3 => Some(Alignment::Right),
            _ => self.data_type().map(Alignment::for_data_type),
        }
    }

    /// Check if the field produces a physical column in its own table.
    pub fn is_stored(&self) -> bool {
        !self.calculated && self.master_field.is_none()
    }
}

impl MetaRecord for FieldRecord {
    const TABLE: MetaTable = MetaTable::Fields;

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
