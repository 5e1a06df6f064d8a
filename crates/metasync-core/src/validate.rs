//! Integrity checks run before any DDL is synthesized.

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::apply::SyncError;
use crate::metadata::{ItemKind, ItemRecord, MetaRecord, Snapshot};

/// A structural incompatibility that blocks a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The same identifier changed its structural kind.
    KindChanged {
        id: i64,
        old_name: String,
        new_name: String,
        old_kind: ItemKind,
        new_kind: ItemKind,
    },
    /// The same identifier points to a different physical table.
    TableChanged {
        id: i64,
        old_name: String,
        new_name: String,
        old_table: String,
        new_table: String,
    },
    /// A new item takes over the table of another identifier.
    TableReused {
        table: String,
        old_id: i64,
        new_id: i64,
    },
    /// Two items share one physical table.
    DuplicateTable { table: String, first: i64, second: i64 },
    /// A physical item cannot resolve one of its system fields.
    MissingSystemField {
        id: i64,
        name: String,
        field: &'static str,
    },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::KindChanged {
                id,
                old_name,
                new_name,
                old_kind,
                new_kind,
            } => write!(
                f,
                "items with id {id} ({old_name}, {new_name}) have different types ({old_kind}, {new_kind})"
            ),
            Conflict::TableChanged {
                id,
                old_name,
                new_name,
                old_table,
                new_table,
            } => write!(
                f,
                "items with id {id} ({old_name}, {new_name}) have different database tables ({old_table}, {new_table})"
            ),
            Conflict::TableReused {
                table,
                old_id,
                new_id,
            } => write!(
                f,
                "table {table} of item {old_id} would be taken over by new item {new_id}"
            ),
            Conflict::DuplicateTable {
                table,
                first,
                second,
            } => write!(f, "items {first} and {second} share table {table}"),
            Conflict::MissingSystemField { id, name, field } => {
                write!(f, "item {id} ({name}) has no resolvable {field} field")
            }
        }
    }
}

/// Outcome of the integrity checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub conflicts: Vec<Conflict>,
    /// Suspicious but non-blocking findings.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Check if the migration may proceed.
    pub fn is_ok(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Human-readable conflict descriptions.
    pub fn conflict_messages(&self) -> Vec<String> {
        self.conflicts.iter().map(ToString::to_string).collect()
    }

    /// Turn blocking conflicts into one aggregated error; pass warnings on.
    pub fn into_result(self) -> Result<Vec<String>, SyncError> {
        if self.conflicts.is_empty() {
            Ok(self.warnings)
        } else {
            Err(SyncError::ValidationFailed {
                count: self.conflicts.len(),
                message: self.conflict_messages().join("\n"),
            })
        }
    }
}

fn live(snapshot: &Snapshot) -> impl Iterator<Item = &ItemRecord> {
    snapshot.items.iter().filter(|i| !i.is_deleted())
}

/// Check that `new` can replace `old`.
pub fn validate(old: &Snapshot, new: &Snapshot) -> ValidationReport {
    let mut report = ValidationReport::default();

    for old_item in live(old) {
        let Some(new_item) = new.items.get(old_item.id).filter(|i| !i.deleted) else {
            continue;
        };
        if old_item.kind != new_item.kind {
            report.conflicts.push(Conflict::KindChanged {
                id: old_item.id,
                old_name: old_item.item_name.clone(),
                new_name: new_item.item_name.clone(),
                old_kind: old_item.kind,
                new_kind: new_item.kind,
            });
        } else if !old_item.table_name.is_empty()
            && !old_item.table_name.eq_ignore_ascii_case(&new_item.table_name)
        {
            report.conflicts.push(Conflict::TableChanged {
                id: old_item.id,
                old_name: old_item.item_name.clone(),
                new_name: new_item.item_name.clone(),
                old_table: old_item.table_name.clone(),
                new_table: new_item.table_name.clone(),
            });
        }
    }

    let old_tables: HashMap<String, i64> = old
        .physical_items()
        .filter(|i| !i.is_deleted())
        .map(|i| (i.table_name.to_uppercase(), i.id))
        .collect();
    let mut new_tables: HashMap<String, i64> = HashMap::new();
    for item in live(new).filter(|i| i.is_physical()) {
        let table = item.table_name.to_uppercase();
        if let Some(&first) = new_tables.get(&table) {
            report.conflicts.push(Conflict::DuplicateTable {
                table: item.table_name.clone(),
                first,
                second: item.id,
            });
        } else {
            new_tables.insert(table.clone(), item.id);
        }
        if let Some(&old_id) = old_tables.get(&table) {
            if old_id != item.id && !old.items.contains(item.id) {
                report.conflicts.push(Conflict::TableReused {
                    table: item.table_name.clone(),
                    old_id,
                    new_id: item.id,
                });
            }
        }
        check_system_field(new, item, item.primary_key, "primary key", &mut report);
        check_system_field(new, item, item.deleted_flag, "deleted flag", &mut report);
    }

    let old_names: HashMap<String, i64> = live(old)
        .map(|i| (i.item_name.to_lowercase(), i.id))
        .collect();
    for item in live(new).filter(|i| !old.items.contains(i.id)) {
        if let Some(&old_id) = old_names.get(&item.item_name.to_lowercase()) {
            if !new.items.contains(old_id) {
                let warning = format!(
                    "item {} was removed and item {} with the same name {} was added",
                    old_id, item.id, item.item_name
                );
                warn!(old_id, new_id = item.id, name = %item.item_name, "item name reused");
                report.warnings.push(warning);
            }
        }
    }

    report
}

fn check_system_field(
    snapshot: &Snapshot,
    item: &ItemRecord,
    field_id: Option<i64>,
    label: &'static str,
    report: &mut ValidationReport,
) {
    let resolved = snapshot
        .resolve_field(item.id, field_id)
        .is_some_and(|f| !f.deleted);
    if !resolved {
        report.conflicts.push(Conflict::MissingSystemField {
            id: item.id,
            name: item.item_name.clone(),
            field: label,
        });
    }
}
