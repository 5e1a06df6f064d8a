//! The snapshot differencer.

use std::collections::BTreeSet;

use tracing::debug;

use super::delta::{ChangeStatus, Delta, ItemChange, TableDelta};
use crate::metadata::{ItemRecord, MetaRecord, RecordSet, Snapshot};

/// Classify the rows of one table.
///
/// Identifiers are the only key. With a scope, only rows owned by the scope
/// are considered on each side, so a row that moved to another owner shows
/// up as deleted under the old owner and inserted under the new one.
/// Soft-deleted rows count as absent.
pub fn diff_records<R: MetaRecord>(
    old: &RecordSet<R>,
    new: &RecordSet<R>,
    scope: Option<i64>,
) -> TableDelta<R> {
    let in_scope = |r: &&R| !r.is_deleted() && (scope.is_none() || r.owner_id() == scope);

    let mut delta = TableDelta::default();
    for old_row in old.iter().filter(in_scope) {
        match new.get(old_row.id()).filter(in_scope) {
            Some(new_row) => {
                if !old_row.same_content(new_row) {
                    delta.modified.push((old_row.clone(), new_row.clone()));
                }
            }
            None => delta.deleted.push(old_row.clone()),
        }
    }
    for new_row in new.iter().filter(in_scope) {
        if old.get(new_row.id()).filter(in_scope).is_none() {
            delta.inserted.push(new_row.clone());
        }
    }
    delta
}

fn live_ids(items: &RecordSet<ItemRecord>) -> BTreeSet<i64> {
    items
        .iter()
        .filter(|i| !i.is_deleted())
        .map(|i| i.id)
        .collect()
}

/// Compare two snapshots.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Delta {
    let old_ids = live_ids(&old.items);
    let new_ids = live_ids(&new.items);
    let none = RecordSet::new();

    let mut items = Vec::new();
    for id in old_ids.union(&new_ids).copied() {
        let old_item = old.items.get(id).filter(|_| old_ids.contains(&id));
        let new_item = new.items.get(id).filter(|_| new_ids.contains(&id));
        let status = match (old_item, new_item) {
            (Some(o), Some(n)) if o.same_content(n) => ChangeStatus::Unchanged,
            (Some(_), Some(_)) => ChangeStatus::Modified,
            (None, Some(_)) => ChangeStatus::Inserted,
            (Some(_), None) => ChangeStatus::Deleted,
            (None, None) => continue,
        };
        // fields of an item absent on one side are absent with it
        let old_fields = if old_item.is_some() { &old.fields } else { &none };
        let new_fields = if new_item.is_some() { &new.fields } else { &none };
        let fields = diff_records(old_fields, new_fields, Some(id));
        if status == ChangeStatus::Unchanged && fields.is_empty() {
            continue;
        }
        items.push(ItemChange {
            id,
            status,
            old: old_item.cloned(),
            new: new_item.cloned(),
            fields,
        });
    }

    let settings = (!old.settings.same_content(&new.settings))
        .then(|| (old.settings.clone(), new.settings.clone()));

    let delta = Delta {
        items,
        indices: diff_records(&old.indices, &new.indices, None),
        filters: diff_records(&old.filters, &new.filters, None),
        report_params: diff_records(&old.report_params, &new.report_params, None),
        roles: diff_records(&old.roles, &new.roles, None),
        privileges: diff_records(&old.privileges, &new.privileges, None),
        lookup_lists: diff_records(&old.lookup_lists, &new.lookup_lists, None),
        settings,
    };
    debug!(changes = delta.change_count(), "snapshots compared");
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DataType, FieldRecord, IndexRecord, ItemKind, RoleRecord, Settings};

    fn orders() -> Snapshot {
        let mut s = Snapshot::default();
        s.items.upsert(
            ItemRecord::new(10, 3, ItemKind::Catalog, "orders")
                .with_table("ORDERS")
                .with_system_fields(100, 101),
        );
        s.fields
            .upsert(FieldRecord::new(100, 10, "id", DataType::Integer));
        s.fields
            .upsert(FieldRecord::new(101, 10, "deleted", DataType::Integer));
        s
    }

    #[test]
    fn test_identical_snapshots() {
        let s = orders();
        assert!(diff(&s, &s.clone()).is_empty());
    }

    #[test]
    fn test_field_insert_nested_under_item() {
        let old = orders();
        let mut new = old.clone();
        new.fields.upsert(
            FieldRecord::new(102, 10, "total", DataType::Currency).with_size(10),
        );

        let delta = diff(&old, &new);
        assert_eq!(delta.items.len(), 1);
        let change = &delta.items[0];
        assert_eq!(change.status, ChangeStatus::Unchanged);
        assert_eq!(change.fields.inserted.len(), 1);
        assert_eq!(change.fields.inserted[0].field_name, "total");
        assert_eq!(delta.change_count(), 1);
    }

    #[test]
    fn test_owner_change_is_delete_plus_insert() {
        let mut old = orders();
        old.items
            .upsert(ItemRecord::new(11, 3, ItemKind::Catalog, "customers"));
        let mut new = old.clone();
        new.fields.get_mut(101).unwrap().owner_id = 11;

        let delta = diff(&old, &new);
        assert_eq!(delta.item(10).unwrap().fields.deleted[0].id, 101);
        assert_eq!(delta.item(11).unwrap().fields.inserted[0].id, 101);
    }

    #[test]
    fn test_soft_deleted_counts_as_absent() {
        let old = orders();
        let mut new = old.clone();
        new.items.get_mut(10).unwrap().deleted = true;

        let delta = diff(&old, &new);
        let change = delta.item(10).unwrap();
        assert_eq!(change.status, ChangeStatus::Deleted);
        assert_eq!(change.fields.deleted.len(), 2);
    }

    #[test]
    fn test_index_and_role_changes() {
        let mut old = orders();
        old.indices
            .upsert(IndexRecord::new(1, 10, "IX1").with_field(100));
        old.roles.upsert(RoleRecord::new(1, "admin"));
        let mut new = old.clone();
        new.indices.remove(1);
        new.roles.get_mut(1).unwrap().name = "administrators".into();
        new.roles.upsert(RoleRecord::new(2, "guest"));

        let delta = diff(&old, &new);
        assert_eq!(delta.indices.deleted.len(), 1);
        assert_eq!(delta.roles.modified.len(), 1);
        assert_eq!(delta.roles.inserted.len(), 1);
        assert!(delta.items.is_empty());
    }

    #[test]
    fn test_rename_is_not_matched_by_name() {
        let old = orders();
        let mut new = orders();
        let item = new.items.remove(10).unwrap();
        new.items.upsert(ItemRecord { id: 20, ..item });

        let delta = diff(&old, &new);
        assert_eq!(delta.item(10).unwrap().status, ChangeStatus::Deleted);
        assert_eq!(delta.item(10).unwrap().fields.deleted.len(), 2);
        assert_eq!(delta.item(20).unwrap().status, ChangeStatus::Inserted);
    }

    #[test]
    fn test_local_only_settings_ignored() {
        let old = orders();
        let mut new = old.clone();
        new.settings = Settings {
            safe_mode: true,
            debugging: true,
            ..Settings::default()
        };
        assert!(diff(&old, &new).settings.is_none());

        new.settings.timeout = 600;
        assert!(diff(&old, &new).settings.is_some());
    }
}
