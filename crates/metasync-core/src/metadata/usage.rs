//! Reference checks run before an item or field is deleted.

use std::fmt;

use super::snapshot::Snapshot;

/// A reason a record cannot be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Usage {
    /// The item has child items.
    HasChildren,
    /// A detail item uses the item as its table.
    DetailTable { detail: i64 },
    /// A field looks up the item or field.
    LookupField { field: i64 },
    /// A report parameter looks up the item or field.
    LookupParam { param: i64 },
    /// An index includes the field.
    Index { index: i64 },
    /// A filter is defined on the field.
    Filter { filter: i64 },
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Usage::HasChildren => write!(f, "has child items"),
            Usage::DetailTable { detail } => write!(f, "used as table of detail {detail}"),
            Usage::LookupField { field } => write!(f, "looked up by field {field}"),
            Usage::LookupParam { param } => write!(f, "looked up by report parameter {param}"),
            Usage::Index { index } => write!(f, "used in index {index}"),
            Usage::Filter { filter } => write!(f, "used in filter {filter}"),
        }
    }
}

/// Everything that references an item from outside its own subtree.
pub fn item_usages(snapshot: &Snapshot, item_id: i64) -> Vec<Usage> {
    let mut usages = Vec::new();
    if snapshot.children_of(item_id).any(|c| !c.deleted) {
        usages.push(Usage::HasChildren);
    }
    usages.extend(
        snapshot
            .items
            .iter()
            .filter(|i| !i.deleted && i.table_id == Some(item_id))
            .map(|i| Usage::DetailTable { detail: i.id }),
    );
    usages.extend(
        snapshot
            .fields
            .iter()
            .filter(|f| !f.deleted && f.owner_id != item_id && f.lookup_item == Some(item_id))
            .map(|f| Usage::LookupField { field: f.id }),
    );
    usages.extend(
        snapshot
            .report_params
            .iter()
            .filter(|p| !p.deleted && p.lookup_item == Some(item_id))
            .map(|p| Usage::LookupParam { param: p.id }),
    );
    usages
}

/// Everything that references a field.
pub fn field_usages(snapshot: &Snapshot, field_id: i64) -> Vec<Usage> {
    let mut usages = Vec::new();
    usages.extend(
        snapshot
            .fields
            .iter()
            .filter(|f| !f.deleted && f.id != field_id && f.lookup_field == Some(field_id))
            .map(|f| Usage::LookupField { field: f.id }),
    );
    usages.extend(
        snapshot
            .report_params
            .iter()
            .filter(|p| !p.deleted && p.lookup_field == Some(field_id))
            .map(|p| Usage::LookupParam { param: p.id }),
    );
    usages.extend(
        snapshot
            .indices
            .iter()
            .filter(|i| !i.deleted && i.references_field(field_id))
            .map(|i| Usage::Index { index: i.id }),
    );
    usages.extend(
        snapshot
            .filters
            .iter()
            .filter(|f| !f.deleted && f.field_id == Some(field_id))
            .map(|f| Usage::Filter { filter: f.id }),
    );
    usages
}

/// Check if an item can be deleted.
pub fn can_delete_item(snapshot: &Snapshot, item_id: i64) -> bool {
    item_usages(snapshot, item_id).is_empty()
}

/// Check if a field can be deleted.
pub fn can_delete_field(snapshot: &Snapshot, field_id: i64) -> bool {
    field_usages(snapshot, field_id).is_empty()
}
