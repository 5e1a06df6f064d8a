//! Delta to DDL.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, instrument};

use super::columns::table_columns;
use super::script::{DdlScript, Phase};
use super::SynthesisError;
use crate::dialect::{ColumnDef, Dialect, ForeignKeyDef, IndexDef};
use crate::diff::{ChangeStatus, Delta, ItemChange};
use crate::metadata::{IndexRecord, ItemRecord, Snapshot};

/// Render the DDL that evolves the schema of `old` into that of `new`.
pub fn synthesize(
    delta: &Delta,
    old: &Snapshot,
    new: &Snapshot,
    dialect: &dyn Dialect,
) -> Result<DdlScript, SynthesisError> {
    Synthesizer::new(dialect, old, new).synthesize(delta)
}

/// DDL synthesizer bound to one dialect and the two snapshots of a delta.
///
/// The snapshots are needed to resolve inherited fields, index columns and
/// foreign-key targets; the delta decides what changes.
pub struct Synthesizer<'a> {
    dialect: &'a dyn Dialect,
    old: &'a Snapshot,
    new: &'a Snapshot,
}

impl<'a> Synthesizer<'a> {
    pub fn new(dialect: &'a dyn Dialect, old: &'a Snapshot, new: &'a Snapshot) -> Self {
        Self { dialect, old, new }
    }

    #[instrument(skip_all, fields(dialect = %self.dialect.kind()))]
    pub fn synthesize(&self, delta: &Delta) -> Result<DdlScript, SynthesisError> {
        let mut script = DdlScript::new();
        let deleted: HashSet<i64> = delta
            .items_with(ChangeStatus::Deleted)
            .map(|c| c.id)
            .collect();
        let mut rebuilt = BTreeSet::new();

        self.drop_indices(delta, &deleted, &mut script);

        for change in &delta.items {
            self.item_change(change, &mut script, &mut rebuilt)?;
        }

        // children of groups whose inherited fields changed
        let listed: HashSet<i64> = delta.items.iter().map(|c| c.id).collect();
        for change in &delta.items {
            let is_group = change.current().is_some_and(|i| i.kind.is_group());
            if !is_group || change.fields.is_empty() {
                continue;
            }
            for child in self.new.children_of(change.id) {
                if listed.contains(&child.id) || child.deleted || !child.is_physical() {
                    continue;
                }
                if let Some(before) = self.old.item(child.id).filter(|i| i.is_physical()) {
                    self.alter_table(before, child, &mut script, &mut rebuilt)?;
                }
            }
        }

        self.create_indices(delta, &rebuilt, &mut script)?;

        debug!(
            statements = script.len(),
            notes = script.notes().len(),
            "ddl synthesized"
        );
        Ok(script)
    }

    fn table(&self, item: &ItemRecord) -> String {
        self.dialect.literal_case(&item.table_name)
    }

    fn item_change(
        &self,
        change: &ItemChange,
        script: &mut DdlScript,
        rebuilt: &mut BTreeSet<i64>,
    ) -> Result<(), SynthesisError> {
        let before = change.old.as_ref().filter(|i| i.is_physical());
        let after = change.new.as_ref().filter(|i| i.is_physical());
        match (before, after) {
            (None, Some(item)) => self.create_table(item, script),
            (Some(item), None) if change.status == ChangeStatus::Deleted => {
                self.drop_table(item, script);
                Ok(())
            }
            (Some(item), None) => {
                script.note(format!(
                    "table {} of item {} is no longer physical and was kept; drop it manually",
                    item.table_name, item.id
                ));
                Ok(())
            }
            (Some(before), Some(after)) => self.alter_table(before, after, script, rebuilt),
            (None, None) => Ok(()),
        }
    }

    fn create_table(&self, item: &ItemRecord, script: &mut DdlScript) -> Result<(), SynthesisError> {
        let table = self.table(item);
        let columns = table_columns(self.new, item, self.dialect);
        if !columns.iter().any(|c| c.primary_key) {
            return Err(SynthesisError::MissingPrimaryKey {
                id: item.id,
                name: item.item_name.clone(),
            });
        }
        let sql = self
            .dialect
            .create_table(&table, &columns)
            .map_err(|source| SynthesisError::Column {
                table: table.clone(),
                source,
            })?;
        script.push(Phase::Tables, item.id, sql);
        if !item.gen_name.is_empty() {
            let generator = self.dialect.literal_case(&item.gen_name);
            if let Some(sql) = self.dialect.create_generator(&generator) {
                script.push(Phase::Tables, item.id, sql);
            }
        }
        Ok(())
    }

    fn drop_table(&self, item: &ItemRecord, script: &mut DdlScript) {
        script.push(Phase::Tables, item.id, self.dialect.drop_table(&self.table(item)));
        if !item.gen_name.is_empty() {
            let generator = self.dialect.literal_case(&item.gen_name);
            if let Some(sql) = self.dialect.drop_generator(&generator) {
                script.push(Phase::Tables, item.id, sql);
            }
        }
    }

    fn alter_table(
        &self,
        before: &ItemRecord,
        after: &ItemRecord,
        script: &mut DdlScript,
        rebuilt: &mut BTreeSet<i64>,
    ) -> Result<(), SynthesisError> {
        let table = self.table(after);
        let old_columns = table_columns(self.old, before, self.dialect);
        let new_columns = table_columns(self.new, after, self.dialect);
        let added: Vec<&ColumnDef> = new_columns
            .iter()
            .filter(|c| column_for(&old_columns, c.field_id).is_none())
            .collect();
        let dropped: Vec<&ColumnDef> = old_columns
            .iter()
            .filter(|c| column_for(&new_columns, c.field_id).is_none())
            .collect();
        let mut renamed = Vec::new();
        for column in &new_columns {
            let Some(previous) = column_for(&old_columns, column.field_id) else {
                continue;
            };
            if previous.name != column.name {
                renamed.push((previous.name.clone(), column.name.clone()));
            }
            if previous.data_type != column.data_type || previous.size != column.size {
                script.note(format!(
                    "column {}.{} changed type or size; alter it manually",
                    table, column.name
                ));
            }
        }

        if !dropped.is_empty() && !self.dialect.supports_drop_column() {
            self.rebuild_table(after, &table, &old_columns, &new_columns, script)?;
            rebuilt.insert(after.id);
            return Ok(());
        }

        for (from, to) in &renamed {
            script.push(
                Phase::Tables,
                after.id,
                self.dialect.rename_column(&table, from, to),
            );
        }
        for column in added {
            let sql = self
                .dialect
                .add_column(&table, column)
                .map_err(|source| SynthesisError::Column {
                    table: table.clone(),
                    source,
                })?;
            script.push(Phase::Tables, after.id, sql);
        }
        for column in dropped {
            script.push(
                Phase::Tables,
                after.id,
                self.dialect.drop_column(&table, &column.name),
            );
        }
        Ok(())
    }

    /// Column-preserving rebuild for engines that cannot drop columns.
    fn rebuild_table(
        &self,
        item: &ItemRecord,
        table: &str,
        old_columns: &[ColumnDef],
        new_columns: &[ColumnDef],
        script: &mut DdlScript,
    ) -> Result<(), SynthesisError> {
        let scratch = self.dialect.literal_case(&format!("{table}_tmp"));
        script.push(
            Phase::Tables,
            item.id,
            self.dialect.rename_table(table, &scratch),
        );
        let create = self
            .dialect
            .create_table(table, new_columns)
            .map_err(|source| SynthesisError::Column {
                table: table.to_string(),
                source,
            })?;
        script.push(Phase::Tables, item.id, create);

        let kept: Vec<(String, String)> = new_columns
            .iter()
            .filter_map(|c| {
                old_columns
                    .iter()
                    .find(|o| o.field_id == c.field_id)
                    .map(|o| (self.dialect.quote(&c.name), self.dialect.quote(&o.name)))
            })
            .collect();
        if !kept.is_empty() {
            let (targets, sources): (Vec<_>, Vec<_>) = kept.into_iter().unzip();
            script.push(
                Phase::Tables,
                item.id,
                format!(
                    "INSERT INTO {} ({}) SELECT {} FROM {}",
                    self.dialect.quote(table),
                    targets.join(", "),
                    sources.join(", "),
                    self.dialect.quote(&scratch)
                ),
            );
        }
        script.push(Phase::Tables, item.id, self.dialect.drop_table(&scratch));
        debug!(table, "table rebuilt to drop columns");
        Ok(())
    }

    fn drop_indices(&self, delta: &Delta, deleted: &HashSet<i64>, script: &mut DdlScript) {
        let stale = delta
            .indices
            .deleted
            .iter()
            .chain(delta.indices.modified.iter().map(|(old, _)| old));
        for index in stale {
            // dropping the table drops its indices
            if deleted.contains(&index.owner_id) {
                continue;
            }
            let Some(item) = self.old.item(index.owner_id).filter(|i| i.is_physical()) else {
                continue;
            };
            let table = self.table(item);
            let name = self.dialect.literal_case(&index.index_name);
            if index.foreign_index {
                if self.dialect.supports_inline_foreign_keys() {
                    script.push(
                        Phase::DropIndices,
                        item.id,
                        self.dialect.drop_foreign_key(&table, &name),
                    );
                } else {
                    debug!(index = %name, "foreign key was never created, nothing to drop");
                }
            } else {
                script.push(
                    Phase::DropIndices,
                    item.id,
                    self.dialect.drop_index(&table, &name),
                );
            }
        }
    }

    fn create_indices(
        &self,
        delta: &Delta,
        rebuilt: &BTreeSet<i64>,
        script: &mut DdlScript,
    ) -> Result<(), SynthesisError> {
        let mut pending: BTreeMap<i64, &IndexRecord> = BTreeMap::new();
        for index in delta.indices.upserts() {
            pending.insert(index.id, index);
        }
        for item_id in rebuilt {
            for index in self.new.indices_of(*item_id) {
                pending.insert(index.id, index);
            }
        }

        for index in pending.values().filter(|i| !i.deleted) {
            let Some(item) = self
                .new
                .item(index.owner_id)
                .filter(|i| !i.deleted && i.is_physical())
            else {
                continue;
            };
            if index.foreign_index {
                if !self.dialect.supports_inline_foreign_keys() {
                    debug!(index = %index.index_name, "foreign key skipped by dialect");
                    continue;
                }
                let fk = self.foreign_key(item, index)?;
                script.push(Phase::CreateIndices, item.id, self.dialect.add_foreign_key(&fk));
            } else {
                let def = self.index_def(item, index)?;
                script.push(Phase::CreateIndices, item.id, self.dialect.create_index(&def));
            }
        }
        Ok(())
    }

    fn index_def(&self, item: &ItemRecord, index: &IndexRecord) -> Result<IndexDef, SynthesisError> {
        let columns = index
            .fields
            .iter()
            .map(|f| {
                self.new
                    .resolve_field(item.id, Some(f.field_id))
                    .map(|field| (self.dialect.literal_case(&field.db_field_name), f.desc))
                    .ok_or_else(|| SynthesisError::UnknownIndexField {
                        index: index.index_name.clone(),
                        field_id: f.field_id,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IndexDef {
            name: self.dialect.literal_case(&index.index_name),
            table: self.table(item),
            unique: index.unique,
            columns,
        })
    }

    fn foreign_key(&self, item: &ItemRecord, index: &IndexRecord) -> Result<ForeignKeyDef, SynthesisError> {
        let unresolved = || SynthesisError::UnresolvedForeignKey {
            index: index.index_name.clone(),
        };
        let field_id = index
            .foreign_field
            .or_else(|| index.fields.first().map(|f| f.field_id));
        let field = self
            .new
            .resolve_field(item.id, field_id)
            .ok_or_else(unresolved)?;
        let target = field
            .lookup_item
            .and_then(|id| self.new.item(id))
            .filter(|i| i.is_physical())
            .ok_or_else(unresolved)?;
        let target_key = self
            .new
            .resolve_field(target.id, target.primary_key)
            .ok_or_else(unresolved)?;
        Ok(ForeignKeyDef {
            name: self.dialect.literal_case(&index.index_name),
            table: self.table(item),
            column: self.dialect.literal_case(&field.db_field_name),
            ref_table: self.table(target),
            ref_column: self.dialect.literal_case(&target_key.db_field_name),
        })
    }
}

fn column_for(columns: &[ColumnDef], field_id: i64) -> Option<&ColumnDef> {
    columns.iter().find(|c| c.field_id == field_id)
}
