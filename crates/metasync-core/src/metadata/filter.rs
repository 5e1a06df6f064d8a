//! Filter and report parameter rows.
//!
//! Both are lightweight descriptors attached to an item; neither has any
//! effect on the physical schema.

use serde::{Deserialize, Serialize};

use super::record::{MetaRecord, MetaTable};

/// A query predicate exposed on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRecord {
    pub id: i64,
    pub owner_id: i64,
    pub filter_name: String,
    #[serde(default)]
    pub name: String,
    /// Filtered field.
    #[serde(default)]
    pub field_id: Option<i64>,
    /// Comparison operator tag.
    #[serde(default)]
    pub filter_type: u8,
    #[serde(default)]
    pub data_type: u8,
    #[serde(default)]
    pub multi_select_all: bool,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub deleted: bool,
}

impl FilterRecord {
    pub fn new(id: i64, owner_id: i64, filter_name: impl Into<String>, field_id: i64) -> Self {
        let filter_name = filter_name.into();
        Self {
            id,
            owner_id,
            name: filter_name.clone(),
            filter_name,
            field_id: Some(field_id),
            filter_type: 1,
            data_type: 0,
            multi_select_all: false,
            visible: true,
            help: String::new(),
            placeholder: String::new(),
            deleted: false,
        }
    }
}

impl MetaRecord for FilterRecord {
    const TABLE: MetaTable = MetaTable::Filters;

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

/// An input parameter of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportParamRecord {
    pub id: i64,
    pub owner_id: i64,
    pub param_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_type: u8,
    /// Lookup target item.
    #[serde(default)]
    pub lookup_item: Option<i64>,
    /// Lookup target field.
    #[serde(default)]
    pub lookup_field: Option<i64>,
    #[serde(default)]
    pub lookup_values: Option<i64>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub alignment: u8,
    #[serde(default)]
    pub multi_select: bool,
    #[serde(default)]
    pub multi_select_all: bool,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub deleted: bool,
}

impl ReportParamRecord {
    pub fn new(id: i64, owner_id: i64, param_name: impl Into<String>, data_type: u8) -> Self {
        let param_name = param_name.into();
        Self {
            id,
            owner_id,
            name: param_name.clone(),
            param_name,
            data_type,
            lookup_item: None,
            lookup_field: None,
            lookup_values: None,
            required: false,
            visible: true,
            alignment: 0,
            multi_select: false,
            multi_select_all: false,
            help: String::new(),
            placeholder: String::new(),
            deleted: false,
        }
    }
}

impl MetaRecord for ReportParamRecord {
    const TABLE: MetaTable = MetaTable::ReportParams;

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
