//! Delta to metadata write batch.

use std::collections::HashSet;

use crate::diff::{ChangeStatus, Delta, TableDelta};
use crate::error::Error;
use crate::metadata::{
    ItemKind, MetaRecord, MetaTable, PrivilegeRecord, Snapshot, WriteBatch,
};

fn queue<R: MetaRecord>(
    batch: &mut WriteBatch,
    delta: &TableDelta<R>,
    skip: impl Fn(&R) -> bool,
) -> Result<(), Error> {
    for record in delta.upserts().filter(|r| !skip(r)) {
        batch.put(record)?;
    }
    for record in &delta.deleted {
        batch.remove(R::TABLE, record.id());
    }
    Ok(())
}

fn grants_privileges(kind: ItemKind) -> bool {
    matches!(
        kind,
        ItemKind::Catalog | ItemKind::Table | ItemKind::Report | ItemKind::Detail
    )
}

/// Build the metadata writes that turn `old` into `new`.
///
/// Rows owned by a deleted item (indices, filters, report parameters and
/// privileges) are removed with it even when `new` still carries them. With
/// `default_privileges`, every role gets full rights on every inserted item
/// that has no privilege row yet.
pub fn build_write_set(
    delta: &Delta,
    old: &Snapshot,
    new: &Snapshot,
    default_privileges: bool,
) -> Result<WriteBatch, Error> {
    let mut batch = WriteBatch::new();
    let mut target = new.clone();
    target.refresh_has_children();

    let removed: HashSet<i64> = delta
        .items_with(ChangeStatus::Deleted)
        .map(|c| c.id)
        .collect();
    let mut written = HashSet::new();

    for change in &delta.items {
        match change.status {
            ChangeStatus::Inserted | ChangeStatus::Modified => {
                if let Some(item) = target.item(change.id) {
                    batch.put(item)?;
                    written.insert(change.id);
                }
            }
            ChangeStatus::Deleted => batch.remove(MetaTable::Items, change.id),
            ChangeStatus::Unchanged => {}
        }
        queue(&mut batch, &change.fields, |_| false)?;
    }

    // derived flag only
    for item in old.items.iter().filter(|i| !i.is_deleted()) {
        if removed.contains(&item.id) || written.contains(&item.id) {
            continue;
        }
        if let Some(current) = target.item(item.id) {
            if current.has_children != item.has_children {
                batch.put(current)?;
            }
        }
    }

    queue(&mut batch, &delta.indices, |r| removed.contains(&r.owner_id))?;
    queue(&mut batch, &delta.filters, |r| removed.contains(&r.owner_id))?;
    queue(&mut batch, &delta.report_params, |r| removed.contains(&r.owner_id))?;
    queue(&mut batch, &delta.roles, |_| false)?;
    queue(&mut batch, &delta.privileges, |r| removed.contains(&r.item_id))?;
    queue(&mut batch, &delta.lookup_lists, |_| false)?;

    let mut cascaded = HashSet::new();
    for id in &removed {
        for index in old.indices_of(*id) {
            cascaded.insert((MetaTable::Indices, index.id));
        }
        for filter in old.filters_of(*id) {
            cascaded.insert((MetaTable::Filters, filter.id));
        }
        for param in old.params_of(*id) {
            cascaded.insert((MetaTable::ReportParams, param.id));
        }
        for privilege in old.privileges.iter().filter(|p| p.item_id == *id) {
            cascaded.insert((MetaTable::Privileges, privilege.id));
        }
    }
    let already: HashSet<(MetaTable, i64)> = delta
        .indices
        .deleted
        .iter()
        .map(|r| (MetaTable::Indices, r.id))
        .chain(delta.filters.deleted.iter().map(|r| (MetaTable::Filters, r.id)))
        .chain(
            delta
                .report_params
                .deleted
                .iter()
                .map(|r| (MetaTable::ReportParams, r.id)),
        )
        .chain(delta.privileges.deleted.iter().map(|r| (MetaTable::Privileges, r.id)))
        .collect();
    let mut cascaded: Vec<_> = cascaded.difference(&already).copied().collect();
    cascaded.sort();
    for (table, id) in cascaded {
        batch.remove(table, id);
    }

    if default_privileges {
        let mut next_id = old.privileges.max_id().max(new.privileges.max_id());
        for change in delta.items_with(ChangeStatus::Inserted) {
            let Some(item) = change.new.as_ref().filter(|i| grants_privileges(i.kind)) else {
                continue;
            };
            for role in new.roles.iter().filter(|r| !r.is_deleted()) {
                let granted = new
                    .privileges
                    .iter()
                    .any(|p| !p.deleted && p.role_id == role.id && p.item_id == item.id);
                if !granted {
                    next_id += 1;
                    batch.put(&PrivilegeRecord::full(next_id, role.id, item.id))?;
                }
            }
        }
    }

    if let Some((current, incoming)) = &delta.settings {
        batch.put_settings(current.adopt(incoming));
    }

    Ok(batch)
}
