//! Item (entity) rows.

use serde::{Deserialize, Serialize};

use super::record::{MetaRecord, MetaTable};
use super::types::ItemKind;

/// Ordering entry of an item's default sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderField {
    /// Field identifier.
    pub field_id: i64,
    /// Sort descending.
    #[serde(default)]
    pub desc: bool,
}

/// An entity definition: catalog, table, detail, report or group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Stable identifier.
    pub id: i64,
    /// Parent item identifier (0 for the root).
    #[serde(default)]
    pub parent: i64,
    /// Owning task identifier.
    #[serde(default)]
    pub task_id: i64,
    /// Structural kind.
    pub kind: ItemKind,
    /// Programmatic name.
    pub item_name: String,
    /// Display caption.
    #[serde(default)]
    pub name: String,
    /// Backing table name.
    #[serde(default)]
    pub table_name: String,
    /// Generator/sequence name for surrogate keys.
    #[serde(default)]
    pub gen_name: String,
    /// The item has no backing table of its own.
    #[serde(default)]
    pub virtual_table: bool,
    /// Visible in the application menu.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Deletions only set the deleted flag.
    #[serde(default)]
    pub soft_delete: bool,
    /// Keep change history for this item.
    #[serde(default)]
    pub keep_history: bool,
    /// Primary-key field reference.
    #[serde(default)]
    pub primary_key: Option<i64>,
    /// Deleted-flag field reference.
    #[serde(default)]
    pub deleted_flag: Option<i64>,
    /// Master item id linkage field reference.
    #[serde(default)]
    pub master_id: Option<i64>,
    /// Master record id linkage field reference.
    #[serde(default)]
    pub master_rec_id: Option<i64>,
    /// Referenced table item, for details.
    #[serde(default)]
    pub table_id: Option<i64>,
    /// Server module source.
    #[serde(default)]
    pub server_module: String,
    /// Client module source.
    #[serde(default)]
    pub client_module: String,
    /// Default ordering.
    #[serde(default)]
    pub order_by: Vec<OrderField>,
    /// Reports attached to the item.
    #[serde(default)]
    pub report_ids: Vec<i64>,
    /// Derived: the item has children in the tree.
    #[serde(default)]
    pub has_children: bool,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
}

fn default_true() -> bool {
    true
}

impl ItemRecord {
    /// Create a new item row.
    pub fn new(id: i64, parent: i64, kind: ItemKind, item_name: impl Into<String>) -> Self {
        let item_name = item_name.into();
        Self {
            id,
            parent,
            task_id: 0,
            kind,
            name: item_name.clone(),
            item_name,
            table_name: String::new(),
            gen_name: String::new(),
            virtual_table: false,
            visible: true,
            soft_delete: false,
            keep_history: false,
            primary_key: None,
            deleted_flag: None,
            master_id: None,
            master_rec_id: None,
            table_id: None,
            server_module: String::new(),
            client_module: String::new(),
            order_by: Vec::new(),
            report_ids: Vec::new(),
            has_children: false,
            deleted: false,
        }
    }

    /// Set the backing table name.
    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Set the generator name.
    pub fn with_generator(mut self, gen_name: impl Into<String>) -> Self {
        self.gen_name = gen_name.into();
        self
    }

    /// Set the primary-key and deleted-flag field references.
    pub fn with_system_fields(mut self, primary_key: i64, deleted_flag: i64) -> Self {
        self.primary_key = Some(primary_key);
        self.deleted_flag = Some(deleted_flag);
        self
    }

    /// Set the master linkage field references.
    pub fn with_master_fields(mut self, master_id: i64, master_rec_id: i64) -> Self {
        self.master_id = Some(master_id);
        self.master_rec_id = Some(master_rec_id);
        self
    }

    /// Mark the item as virtual.
    pub fn virtual_table(mut self) -> Self {
        self.virtual_table = true;
        self
    }

    /// Link a detail to its table.
    pub fn with_detail_table(mut self, table_id: i64) -> Self {
        self.table_id = Some(table_id);
        self
    }

    /// Set the server module source.
    pub fn with_server_module(mut self, source: impl Into<String>) -> Self {
        self.server_module = source.into();
        self
    }

    /// Check if the item owns a physical table in the backing database.
    pub fn is_physical(&self) -> bool {
        self.kind.has_table() && !self.virtual_table && !self.table_name.is_empty()
    }
}

impl MetaRecord for ItemRecord {
    const TABLE: MetaTable = MetaTable::Items;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> Option<i64> {
        Some(self.parent)
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn same_content(&self, other: &Self) -> bool {
        // has_children is derived from the tree and recomputed on commit
        let mut other = other.clone();
        other.has_children = self.has_children;
        *self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_builder() {
        let item = ItemRecord::new(10, 6, ItemKind::Catalog, "customers")
            .with_table("CUSTOMERS")
            .with_system_fields(100, 101);

        assert_eq!(item.name, "customers");
        assert!(item.is_physical());
        assert_eq!(item.primary_key, Some(100));
    }

    #[test]
    fn test_virtual_item_is_not_physical() {
        let item = ItemRecord::new(10, 6, ItemKind::Catalog, "view")
            .with_table("VIEW")
            .virtual_table();
        assert!(!item.is_physical());

        let group = ItemRecord::new(6, 5, ItemKind::CatalogGroup, "catalogs").with_table("X");
        assert!(!group.is_physical());
    }

    #[test]
    fn test_has_children_not_compared() {
        let a = ItemRecord::new(10, 6, ItemKind::Catalog, "customers");
        let mut b = a.clone();
        b.has_children = true;
        assert!(a.same_content(&b));

        b.table_name = "OTHER".into();
        assert!(!a.same_content(&b));
    }
}
