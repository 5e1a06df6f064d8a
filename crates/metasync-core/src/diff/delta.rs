//! Classified differences between two snapshots.

use crate::metadata::{
    FieldRecord, FilterRecord, IndexRecord, ItemRecord, LookupListRecord, MetaRecord,
    PrivilegeRecord, ReportParamRecord, RoleRecord, Settings,
};

/// How a record changed between the old and new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    /// The record itself is identical; only its detail rows changed.
    Unchanged,
    /// Present in the new snapshot only.
    Inserted,
    /// Present in both with differing content.
    Modified,
    /// Present in the old snapshot only.
    Deleted,
}

/// Inserted, modified and deleted rows of one table.
///
/// The three sets are disjoint: an identifier appears in at most one.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDelta<R> {
    pub inserted: Vec<R>,
    /// `(old, new)` pairs.
    pub modified: Vec<(R, R)>,
    pub deleted: Vec<R>,
}

impl<R> Default for TableDelta<R> {
    fn default() -> Self {
        Self {
            inserted: Vec::new(),
            modified: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<R: MetaRecord> TableDelta<R> {
    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Number of changed rows.
    pub fn len(&self) -> usize {
        self.inserted.len() + self.modified.len() + self.deleted.len()
    }

    /// Status of a row, if it changed.
    pub fn status_of(&self, id: i64) -> Option<ChangeStatus> {
        if self.inserted.iter().any(|r| r.id() == id) {
            Some(ChangeStatus::Inserted)
        } else if self.modified.iter().any(|(_, r)| r.id() == id) {
            Some(ChangeStatus::Modified)
        } else if self.deleted.iter().any(|r| r.id() == id) {
            Some(ChangeStatus::Deleted)
        } else {
            None
        }
    }

    /// Rows as they look after the change (inserted and modified).
    pub fn upserts(&self) -> impl Iterator<Item = &R> {
        self.inserted
            .iter()
            .chain(self.modified.iter().map(|(_, new)| new))
    }

    /// Append another delta.
    pub fn extend(&mut self, other: TableDelta<R>) {
        self.inserted.extend(other.inserted);
        self.modified.extend(other.modified);
        self.deleted.extend(other.deleted);
    }
}

/// The change of one item together with the nested delta of its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange {
    pub id: i64,
    pub status: ChangeStatus,
    pub old: Option<ItemRecord>,
    pub new: Option<ItemRecord>,
    /// Fields scoped to this item.
    pub fields: TableDelta<FieldRecord>,
}

impl ItemChange {
    /// The most recent version of the item.
    pub fn current(&self) -> Option<&ItemRecord> {
        self.new.as_ref().or(self.old.as_ref())
    }
}

/// The full output of the differencer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    /// Items in identifier order, each with its field delta.
    pub items: Vec<ItemChange>,
    pub indices: TableDelta<IndexRecord>,
    pub filters: TableDelta<FilterRecord>,
    pub report_params: TableDelta<ReportParamRecord>,
    pub roles: TableDelta<RoleRecord>,
    pub privileges: TableDelta<PrivilegeRecord>,
    pub lookup_lists: TableDelta<LookupListRecord>,
    /// `(old, new)` when copyable settings differ.
    pub settings: Option<(Settings, Settings)>,
}

impl Delta {
    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    /// Total number of changed rows across all tables.
    pub fn change_count(&self) -> usize {
        let items: usize = self
            .items
            .iter()
            .map(|c| usize::from(c.status != ChangeStatus::Unchanged) + c.fields.len())
            .sum();
        items
            + self.indices.len()
            + self.filters.len()
            + self.report_params.len()
            + self.roles.len()
            + self.privileges.len()
            + self.lookup_lists.len()
            + usize::from(self.settings.is_some())
    }

    /// Change entry of an item.
    pub fn item(&self, id: i64) -> Option<&ItemChange> {
        self.items.iter().find(|c| c.id == id)
    }

    /// Mutable change entry of an item.
    pub fn item_mut(&mut self, id: i64) -> Option<&mut ItemChange> {
        self.items.iter_mut().find(|c| c.id == id)
    }

    /// Items with the given status.
    pub fn items_with(&self, status: ChangeStatus) -> impl Iterator<Item = &ItemChange> {
        self.items.iter().filter(move |c| c.status == status)
    }

    /// All field changes merged across items.
    pub fn fields(&self) -> TableDelta<FieldRecord> {
        let mut all = TableDelta::default();
        for change in &self.items {
            all.extend(change.fields.clone());
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DataType, ItemKind};

    #[test]
    fn test_change_count() {
        let mut delta = Delta::default();
        assert!(delta.is_empty());

        let mut fields = TableDelta::default();
        fields
            .inserted
            .push(FieldRecord::new(5, 10, "total", DataType::Currency));
        delta.items.push(ItemChange {
            id: 10,
            status: ChangeStatus::Unchanged,
            old: Some(ItemRecord::new(10, 3, ItemKind::Catalog, "orders")),
            new: Some(ItemRecord::new(10, 3, ItemKind::Catalog, "orders")),
            fields,
        });
        assert_eq!(delta.change_count(), 1);
        assert_eq!(delta.fields().status_of(5), Some(ChangeStatus::Inserted));
        assert_eq!(delta.fields().status_of(6), None);
    }
}
