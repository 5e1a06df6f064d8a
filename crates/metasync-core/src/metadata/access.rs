//! Roles, privileges and lookup lists.

use serde::{Deserialize, Serialize};

use super::record::{MetaRecord, MetaTable};

/// A user role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
}

impl RoleRecord {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            deleted: false,
        }
    }
}

impl MetaRecord for RoleRecord {
    const TABLE: MetaTable = MetaTable::Roles;

    fn id(&self) -> i64 {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Rights of one role on one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivilegeRecord {
    pub id: i64,
    /// Owning role.
    pub role_id: i64,
    /// Item the rights apply to.
    pub item_id: i64,
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub can_delete: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl PrivilegeRecord {
    /// Full rights for a role on an item.
    pub fn full(id: i64, role_id: i64, item_id: i64) -> Self {
        Self {
            id,
            role_id,
            item_id,
            can_view: true,
            can_create: true,
            can_edit: true,
            can_delete: true,
            deleted: false,
        }
    }
}

impl MetaRecord for PrivilegeRecord {
    const TABLE: MetaTable = MetaTable::Privileges;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> Option<i64> {
        Some(self.role_id)
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A named list of fixed lookup values, stored as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupListRecord {
    pub id: i64,
    pub name: String,
    /// JSON array of `[value, caption]` pairs.
    #[serde(default)]
    pub values_text: String,
    #[serde(default)]
    pub deleted: bool,
}

impl LookupListRecord {
    pub fn new(id: i64, name: impl Into<String>, values_text: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            values_text: values_text.into(),
            deleted: false,
        }
    }
}

impl MetaRecord for LookupListRecord {
    const TABLE: MetaTable = MetaTable::LookupLists;

    fn id(&self) -> i64 {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
