//! Point-in-time materialization of the metadata tables.

use std::collections::{BTreeMap, HashSet};

use super::access::{LookupListRecord, PrivilegeRecord, RoleRecord};
use super::field::FieldRecord;
use super::filter::{FilterRecord, ReportParamRecord};
use super::index::IndexRecord;
use super::item::ItemRecord;
use super::record::{MetaRecord, MetaTable};
use super::settings::Settings;
use super::types::ItemKind;
use crate::error::Error;

/// The rows of one metadata table, keyed by identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet<R: MetaRecord> {
    rows: BTreeMap<i64, R>,
}

impl<R: MetaRecord> Default for RecordSet<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<R: MetaRecord> RecordSet<R> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from rows, rejecting duplicate identifiers.
    pub fn from_records(records: impl IntoIterator<Item = R>) -> Result<Self, Error> {
        let mut rows = BTreeMap::new();
        for record in records {
            let id = record.id();
            if rows.insert(id, record).is_some() {
                return Err(Error::DuplicateId { table: R::TABLE, id });
            }
        }
        Ok(Self { rows })
    }

    /// Get a row by identifier.
    pub fn get(&self, id: i64) -> Option<&R> {
        self.rows.get(&id)
    }

    /// Get a mutable row by identifier.
    pub fn get_mut(&mut self, id: i64) -> Option<&mut R> {
        self.rows.get_mut(&id)
    }

    /// Check if a row exists.
    pub fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    /// Insert or replace a row, returning the previous one.
    pub fn upsert(&mut self, record: R) -> Option<R> {
        self.rows.insert(record.id(), record)
    }

    /// Remove a row.
    pub fn remove(&mut self, id: i64) -> Option<R> {
        self.rows.remove(&id)
    }

    /// Keep only rows matching the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&R) -> bool) {
        self.rows.retain(|_, r| keep(r));
    }

    /// Iterate rows in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rows.values()
    }

    /// Identifiers in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.rows.keys().copied()
    }

    /// Rows owned by the given parent.
    pub fn owned_by(&self, owner: i64) -> impl Iterator<Item = &R> {
        self.rows
            .values()
            .filter(move |r| r.owner_id() == Some(owner))
    }

    /// Largest identifier, or 0 when empty.
    pub fn max_id(&self) -> i64 {
        self.rows.keys().next_back().copied().unwrap_or(0)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Clone the rows into a vector in identifier order.
    pub fn to_vec(&self) -> Vec<R> {
        self.rows.values().cloned().collect()
    }
}

impl<R: MetaRecord> FromIterator<R> for RecordSet<R> {
    /// Later rows replace earlier rows with the same identifier.
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().map(|r| (r.id(), r)).collect(),
        }
    }
}

/// A point-in-time copy of every table that takes part in a migration.
///
/// Snapshots are plain owned values. The live tables are never reachable
/// through a snapshot, so edits made to one cannot leak into storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub items: RecordSet<ItemRecord>,
    pub fields: RecordSet<FieldRecord>,
    pub indices: RecordSet<IndexRecord>,
    pub filters: RecordSet<FilterRecord>,
    pub report_params: RecordSet<ReportParamRecord>,
    pub roles: RecordSet<RoleRecord>,
    pub privileges: RecordSet<PrivilegeRecord>,
    pub lookup_lists: RecordSet<LookupListRecord>,
    pub settings: Settings,
}

impl Snapshot {
    /// Get an item.
    pub fn item(&self, id: i64) -> Option<&ItemRecord> {
        self.items.get(id)
    }

    /// Get a field.
    pub fn field(&self, id: i64) -> Option<&FieldRecord> {
        self.fields.get(id)
    }

    /// Direct children of an item, in identifier order.
    pub fn children_of(&self, parent: i64) -> impl Iterator<Item = &ItemRecord> {
        self.items.owned_by(parent)
    }

    /// The first task node, if any.
    pub fn task_item(&self) -> Option<&ItemRecord> {
        self.items.iter().find(|i| i.kind == ItemKind::Task)
    }

    /// Fields declared directly on an item.
    pub fn own_fields(&self, item_id: i64) -> impl Iterator<Item = &FieldRecord> {
        self.fields.owned_by(item_id)
    }

    /// Fields visible on an item: those inherited from its parent group
    /// followed by its own.
    pub fn effective_fields(&self, item_id: i64) -> Vec<&FieldRecord> {
        let mut out = Vec::new();
        if let Some(item) = self.item(item_id) {
            if let Some(parent) = self.item(item.parent) {
                if parent.kind.is_group() {
                    out.extend(self.own_fields(parent.id));
                }
            }
        }
        out.extend(self.own_fields(item_id));
        out
    }

    /// Find a field by physical column name among an item's effective
    /// fields. The comparison is case-insensitive.
    pub fn field_by_column(&self, item_id: i64, column: &str) -> Option<&FieldRecord> {
        self.effective_fields(item_id)
            .into_iter()
            .find(|f| f.db_field_name.eq_ignore_ascii_case(column))
    }

    /// Resolve a field reference of an item, looking at its effective
    /// fields only.
    pub fn resolve_field(&self, item_id: i64, field_id: Option<i64>) -> Option<&FieldRecord> {
        let field_id = field_id?;
        self.effective_fields(item_id)
            .into_iter()
            .find(|f| f.id == field_id)
    }

    /// Indices declared on an item.
    pub fn indices_of(&self, item_id: i64) -> impl Iterator<Item = &IndexRecord> {
        self.indices.owned_by(item_id)
    }

    /// Filters declared on an item.
    pub fn filters_of(&self, item_id: i64) -> impl Iterator<Item = &FilterRecord> {
        self.filters.owned_by(item_id)
    }

    /// Report parameters of a report.
    pub fn params_of(&self, report_id: i64) -> impl Iterator<Item = &ReportParamRecord> {
        self.report_params.owned_by(report_id)
    }

    /// Items whose backing table is physical.
    pub fn physical_items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items.iter().filter(|i| i.is_physical())
    }

    /// Recompute the derived `has_children` flag of every item.
    ///
    /// Root, task and group nodes always have children; any other item has
    /// children when some item names it as parent.
    pub fn refresh_has_children(&mut self) -> usize {
        let parents: HashSet<i64> = self.items.iter().map(|i| i.parent).collect();
        let mut changed = 0;
        let ids: Vec<i64> = self.items.ids().collect();
        for id in ids {
            if let Some(item) = self.items.get_mut(id) {
                let has = item.kind.always_has_children() || parents.contains(&id);
                if item.has_children != has {
                    item.has_children = has;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Drop every soft-deleted row.
    pub fn purge_deleted(&mut self) -> usize {
        let before = self.row_count();
        self.items.retain(|r| !r.is_deleted());
        self.fields.retain(|r| !r.is_deleted());
        self.indices.retain(|r| !r.is_deleted());
        self.filters.retain(|r| !r.is_deleted());
        self.report_params.retain(|r| !r.is_deleted());
        self.roles.retain(|r| !r.is_deleted());
        self.privileges.retain(|r| !r.is_deleted());
        self.lookup_lists.retain(|r| !r.is_deleted());
        before - self.row_count()
    }

    /// Table and identifier of every soft-deleted row, in table order.
    pub fn deleted_rows(&self) -> Vec<(MetaTable, i64)> {
        fn collect<R: MetaRecord>(set: &RecordSet<R>, out: &mut Vec<(MetaTable, i64)>) {
            out.extend(set.iter().filter(|r| r.is_deleted()).map(|r| (R::TABLE, r.id())));
        }
        let mut out = Vec::new();
        collect(&self.items, &mut out);
        collect(&self.fields, &mut out);
        collect(&self.indices, &mut out);
        collect(&self.filters, &mut out);
        collect(&self.report_params, &mut out);
        collect(&self.roles, &mut out);
        collect(&self.privileges, &mut out);
        collect(&self.lookup_lists, &mut out);
        out
    }

    /// Total number of rows across all record sets.
    pub fn row_count(&self) -> usize {
        self.items.len()
            + self.fields.len()
            + self.indices.len()
            + self.filters.len()
            + self.report_params.len()
            + self.roles.len()
            + self.privileges.len()
            + self.lookup_lists.len()
    }
}

/// Typed access to the record set of a table inside a snapshot.
pub trait SnapshotRecord: MetaRecord {
    /// The record set holding rows of this type.
    fn records(snapshot: &Snapshot) -> &RecordSet<Self>;

    /// Mutable record set holding rows of this type.
    fn records_mut(snapshot: &mut Snapshot) -> &mut RecordSet<Self>;
}

macro_rules! snapshot_record {
    ($record:ty, $slot:ident) => {
        impl SnapshotRecord for $record {
            fn records(snapshot: &Snapshot) -> &RecordSet<Self> {
                &snapshot.$slot
            }

            fn records_mut(snapshot: &mut Snapshot) -> &mut RecordSet<Self> {
                &mut snapshot.$slot
            }
        }
    };
}

snapshot_record!(ItemRecord, items);
snapshot_record!(FieldRecord, fields);
snapshot_record!(IndexRecord, indices);
snapshot_record!(FilterRecord, filters);
snapshot_record!(ReportParamRecord, report_params);
snapshot_record!(RoleRecord, roles);
snapshot_record!(PrivilegeRecord, privileges);
snapshot_record!(LookupListRecord, lookup_lists);
