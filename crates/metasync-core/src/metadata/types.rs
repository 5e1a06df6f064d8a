//! Core type tags for the metadata tables.

use serde::{Deserialize, Serialize};

/// Structural kind of an item row.
///
/// The numeric tags are the values persisted by the administrative console
/// and must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// The root of the item tree.
    Root,
    /// The task (application) node.
    Task,
    /// Group holding catalogs.
    CatalogGroup,
    /// Group holding journal tables.
    TableGroup,
    /// Group holding reports.
    ReportGroup,
    /// A catalog backed by its own table.
    Catalog,
    /// A table (journal), usually referenced by details.
    Table,
    /// A report definition.
    Report,
    /// A detail link from a catalog to a table.
    Detail,
}

impl ItemKind {
    /// Numeric tag of the kind.
    pub fn tag(self) -> u8 {
        match self {
            ItemKind::Root => 1,
            ItemKind::Task => 5,
            ItemKind::CatalogGroup => 6,
            ItemKind::TableGroup => 7,
            ItemKind::ReportGroup => 8,
            ItemKind::Catalog => 9,
            ItemKind::Table => 10,
            ItemKind::Report => 11,
            ItemKind::Detail => 12,
        }
    }

    /// Resolve a kind from its numeric tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => ItemKind::Root,
            5 => ItemKind::Task,
            6 => ItemKind::CatalogGroup,
            7 => ItemKind::TableGroup,
            8 => ItemKind::ReportGroup,
            9 => ItemKind::Catalog,
            10 => ItemKind::Table,
            11 => ItemKind::Report,
            12 => ItemKind::Detail,
            _ => return None,
        })
    }

    /// Check if this kind is a group of other items.
    pub fn is_group(self) -> bool {
        matches!(
            self,
            ItemKind::CatalogGroup | ItemKind::TableGroup | ItemKind::ReportGroup
        )
    }

    /// Check if rows of this kind may own a physical table.
    pub fn has_table(self) -> bool {
        matches!(self, ItemKind::Catalog | ItemKind::Table)
    }

    /// Check if this kind always has children in the item tree.
    pub fn always_has_children(self) -> bool {
        matches!(self, ItemKind::Root | ItemKind::Task) || self.is_group()
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemKind::Root => "root",
            ItemKind::Task => "task",
            ItemKind::CatalogGroup => "catalog group",
            ItemKind::TableGroup => "table group",
            ItemKind::ReportGroup => "report group",
            ItemKind::Catalog => "catalog",
            ItemKind::Table => "table",
            ItemKind::Report => "report",
            ItemKind::Detail => "detail",
        };
        f.write_str(name)
    }
}

/// Field data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Bounded text.
    Text,
    /// Integer.
    Integer,
    /// Floating point number.
    Float,
    /// Fixed-point money amount.
    Currency,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// Boolean stored as integer.
    Boolean,
    /// Unbounded text.
    LongText,
    /// List of keys stored as text.
    Keys,
    /// Uploaded file reference.
    File,
    /// Uploaded image reference.
    Image,
}

impl DataType {
    /// Numeric tag of the data type.
    pub fn tag(self) -> u8 {
        match self {
            DataType::Text => 1,
            DataType::Integer => 2,
            DataType::Float => 3,
            DataType::Currency => 4,
            DataType::Date => 5,
            DataType::DateTime => 6,
            DataType::Boolean => 7,
            DataType::LongText => 8,
            DataType::Keys => 9,
            DataType::File => 10,
            DataType::Image => 11,
        }
    }

    /// Resolve a data type from its numeric tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => DataType::Text,
            2 => DataType::Integer,
            3 => DataType::Float,
            4 => DataType::Currency,
            5 => DataType::Date,
            6 => DataType::DateTime,
            7 => DataType::Boolean,
            8 => DataType::LongText,
            9 => DataType::Keys,
            10 => DataType::File,
            11 => DataType::Image,
            _ => return None,
        })
    }

    /// Check if this type is numeric.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Integer | DataType::Float | DataType::Currency
        )
    }

    /// Check if this type stores text.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            DataType::Text | DataType::LongText | DataType::Keys | DataType::File | DataType::Image
        )
    }
}

/// Display alignment of a field's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Left aligned.
    Left,
    /// Centered.
    Center,
    /// Right aligned.
    Right,
}

impl Alignment {
    /// Default alignment for a data type.
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Integer | DataType::Float | DataType::Currency => Alignment::Right,
            DataType::Date | DataType::DateTime | DataType::Boolean => Alignment::Center,
            _ => Alignment::Left,
        }
    }
}
