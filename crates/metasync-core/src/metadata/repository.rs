//! Sled-backed storage of the metadata tables.

use parking_lot::Mutex;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use tracing::{debug, info};

use super::access::{LookupListRecord, PrivilegeRecord, RoleRecord};
use super::batch::{WriteBatch, WriteOp};
use super::field::FieldRecord;
use super::filter::{FilterRecord, ReportParamRecord};
use super::index::IndexRecord;
use super::item::ItemRecord;
use super::record::{decode_record, encode_record, record_key, MetaRecord, MetaTable};
use super::settings::{Settings, TaskRegistration, SETTINGS_ID, TASK_REGISTRATION_ID};
use super::snapshot::{RecordSet, Snapshot, SnapshotRecord};
use crate::error::Error;

/// Typed read/write access to the metadata tables.
///
/// Every table is a sled tree keyed by the big-endian row identifier.
/// Multi-table changes go through [`WriteBatch`] and are committed in a
/// single transaction spanning all snapshot trees.
pub struct MetadataRepository {
    db: Db,
    /// Snapshot trees in [`MetaTable::SNAPSHOT_TABLES`] order.
    trees: Vec<Tree>,
    tasks: Tree,
    /// Serializes every write of the settings row.
    field_id_lock: Mutex<()>,
}

impl MetadataRepository {
    /// Open or create the metadata tables in the given database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        let trees = MetaTable::SNAPSHOT_TABLES
            .iter()
            .map(|table| db.open_tree(table.tree_name()))
            .collect::<Result<Vec<_>, _>>()?;
        let tasks = db.open_tree(MetaTable::Tasks.tree_name())?;

        Ok(Self {
            db: db.clone(),
            trees,
            tasks,
            field_id_lock: Mutex::new(()),
        })
    }

    fn tree(&self, table: MetaTable) -> Result<&Tree, Error> {
        match table {
            MetaTable::Tasks => Ok(&self.tasks),
            _ => table
                .snapshot_slot()
                .and_then(|slot| self.trees.get(slot))
                .ok_or_else(|| Error::InvalidData(format!("no tree for {table}"))),
        }
    }

    /// Load every row of a table.
    pub fn load<R: MetaRecord>(&self) -> Result<RecordSet<R>, Error> {
        let tree = self.tree(R::TABLE)?;
        let mut rows = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (_, value) = entry?;
            rows.push(decode_record::<R>(&value)?);
        }
        RecordSet::from_records(rows)
    }

    /// Get a row by identifier.
    pub fn get<R: MetaRecord>(&self, id: i64) -> Result<Option<R>, Error> {
        match self.tree(R::TABLE)?.get(record_key(id))? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a single row outside any batch.
    pub fn put<R: MetaRecord>(&self, record: &R) -> Result<(), Error> {
        let value = encode_record(record)?;
        self.tree(R::TABLE)?.insert(record_key(record.id()), value)?;
        Ok(())
    }

    /// Read the global settings row, falling back to defaults.
    pub fn settings(&self) -> Result<Settings, Error> {
        Ok(self.get::<Settings>(SETTINGS_ID)?.unwrap_or_default())
    }

    /// Read the task registration.
    pub fn task_registration(&self) -> Result<TaskRegistration, Error> {
        self.get::<TaskRegistration>(TASK_REGISTRATION_ID)?
            .ok_or(Error::NoTask)
    }

    /// Register (or re-register) the task and its backing database.
    pub fn register_task(&self, registration: &TaskRegistration) -> Result<(), Error> {
        self.put(registration)?;
        info!(
            task_item = registration.task_item,
            dialect = %registration.dialect,
            "task registered"
        );
        Ok(())
    }

    /// Materialize every snapshot table.
    pub fn snapshot(&self) -> Result<Snapshot, Error> {
        let snapshot = Snapshot {
            items: self.load()?,
            fields: self.load()?,
            indices: self.load()?,
            filters: self.load()?,
            report_params: self.load()?,
            roles: self.load()?,
            privileges: self.load()?,
            lookup_lists: self.load()?,
            settings: self.settings()?,
        };
        debug!(rows = snapshot.row_count(), "metadata snapshot taken");
        Ok(snapshot)
    }

    /// Reserve `length` consecutive field identifiers and return the first.
    ///
    /// Concurrent callers never receive overlapping ranges.
    pub fn next_field_id(&self, length: i64) -> Result<i64, Error> {
        if length < 1 {
            return Err(Error::InvalidData(format!(
                "field id block length must be positive, got {length}"
            )));
        }
        let _guard = self.field_id_lock.lock();
        let mut settings = self.settings()?;
        let current = settings.field_id_gen;
        settings.field_id_gen = current + length;
        self.put(&settings)?;
        Ok(current + 1)
    }

    /// Commit a batch in one transaction over all snapshot trees.
    pub fn commit(&self, batch: &WriteBatch) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        let _guard = self.field_id_lock.lock();
        let settings = match batch.settings() {
            Some(incoming) => {
                let stored = self.settings()?;
                let mut merged = incoming.clone();
                merged.field_id_gen = merged.field_id_gen.max(stored.field_id_gen);
                Some((record_key(SETTINGS_ID), encode_record(&merged)?))
            }
            None => None,
        };
        let params_slot = slot_of(MetaTable::Params)?;

        self.trees
            .as_slice()
            .transaction(|views: &Vec<TransactionalTree>| {
                for op in batch.ops() {
                    let view = view_for(views, op.table())?;
                    match op {
                        WriteOp::Put { value, .. } => {
                            view.insert(op.key().as_slice(), value.as_slice())?;
                        }
                        WriteOp::Remove { .. } => {
                            view.remove(op.key().as_slice())?;
                        }
                    }
                }
                if let Some((key, value)) = &settings {
                    views[params_slot].insert(key.as_slice(), value.as_slice())?;
                }
                Ok(())
            })?;

        debug!(writes = batch.len(), "metadata batch committed");
        Ok(())
    }

    /// Replace the snapshot tables with the given snapshot.
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let current = self.snapshot()?;
        let mut batch = WriteBatch::new();
        replace_rows::<ItemRecord>(&mut batch, &current, snapshot)?;
        replace_rows::<FieldRecord>(&mut batch, &current, snapshot)?;
        replace_rows::<IndexRecord>(&mut batch, &current, snapshot)?;
        replace_rows::<FilterRecord>(&mut batch, &current, snapshot)?;
        replace_rows::<ReportParamRecord>(&mut batch, &current, snapshot)?;
        replace_rows::<RoleRecord>(&mut batch, &current, snapshot)?;
        replace_rows::<PrivilegeRecord>(&mut batch, &current, snapshot)?;
        replace_rows::<LookupListRecord>(&mut batch, &current, snapshot)?;
        batch.put_settings(snapshot.settings.clone());
        self.commit(&batch)
    }

    /// Physically remove soft-deleted rows from every snapshot table.
    pub fn purge_deleted(&self) -> Result<usize, Error> {
        let mut batch = WriteBatch::new();
        for (table, id) in self.snapshot()?.deleted_rows() {
            batch.remove(table, id);
        }
        let purged = batch.len();
        self.commit(&batch)?;
        if purged > 0 {
            info!(purged, "soft-deleted metadata rows removed");
        }
        Ok(purged)
    }

    /// Recompute and persist the derived `has_children` flags.
    pub fn refresh_has_children(&self) -> Result<usize, Error> {
        let mut snapshot = self.snapshot()?;
        let before = snapshot.items.clone();
        let changed = snapshot.refresh_has_children();
        if changed > 0 {
            let mut batch = WriteBatch::new();
            for item in snapshot.items.iter() {
                if before.get(item.id) != Some(item) {
                    batch.put(item)?;
                }
            }
            self.commit(&batch)?;
        }
        Ok(changed)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}

fn slot_of(table: MetaTable) -> Result<usize, Error> {
    table
        .snapshot_slot()
        .ok_or_else(|| Error::InvalidData(format!("{table} is not a snapshot table")))
}

fn view_for(
    views: &[TransactionalTree],
    table: MetaTable,
) -> Result<&TransactionalTree, ConflictableTransactionError<Error>> {
    table
        .snapshot_slot()
        .and_then(|slot| views.get(slot))
        .ok_or_else(|| {
            ConflictableTransactionError::Abort(Error::Transaction(format!(
                "{table} is not a snapshot table"
            )))
        })
}

fn replace_rows<R: SnapshotRecord>(
    batch: &mut WriteBatch,
    current: &Snapshot,
    target: &Snapshot,
) -> Result<(), Error> {
    let wanted = R::records(target);
    for id in R::records(current).ids() {
        if !wanted.contains(id) {
            batch.remove(R::TABLE, id);
        }
    }
    for record in wanted.iter() {
        batch.put(record)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;
    use crate::metadata::types::{DataType, ItemKind};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn test_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    #[test]
    fn test_put_and_snapshot() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();

        repo.put(&ItemRecord::new(1, 0, ItemKind::Root, "root")).unwrap();
        repo.put(&FieldRecord::new(5, 1, "id", DataType::Integer))
            .unwrap();

        let snapshot = repo.snapshot().unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.field(5).unwrap().db_field_name, "ID");
        assert_eq!(snapshot.settings, Settings::default());
    }

    #[test]
    fn test_commit_batch() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        repo.put(&RoleRecord::new(1, "admin")).unwrap();

        let mut batch = WriteBatch::new();
        batch.remove(MetaTable::Roles, 1);
        batch.put(&RoleRecord::new(2, "guest")).unwrap();
        batch.put_settings(Settings {
            version: "1.1".into(),
            ..Settings::default()
        });
        repo.commit(&batch).unwrap();

        let roles = repo.load::<RoleRecord>().unwrap();
        assert_eq!(roles.ids().collect::<Vec<_>>(), vec![2]);
        assert_eq!(repo.settings().unwrap().version, "1.1");
    }

    #[test]
    fn test_commit_keeps_field_id_gen() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        assert_eq!(repo.next_field_id(10).unwrap(), 1);

        let mut batch = WriteBatch::new();
        batch.put_settings(Settings::default());
        repo.commit(&batch).unwrap();

        assert_eq!(repo.next_field_id(1).unwrap(), 11);
    }

    #[test]
    fn test_next_field_id_blocks() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        assert_eq!(repo.next_field_id(3).unwrap(), 1);
        assert_eq!(repo.next_field_id(1).unwrap(), 4);
        assert!(repo.next_field_id(0).is_err());
    }

    #[test]
    fn test_next_field_id_concurrent() {
        let db = test_db();
        let repo = Arc::new(MetadataRepository::open(&db).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| repo.next_field_id(1).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(seen.insert(id), "id {id} allocated twice");
            }
        }
        assert_eq!(seen.len(), 200);
        assert_eq!(repo.settings().unwrap().field_id_gen, 200);
    }

    #[test]
    fn test_write_snapshot_replaces_rows() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        repo.put(&RoleRecord::new(1, "admin")).unwrap();

        let mut target = Snapshot::default();
        target.roles.upsert(RoleRecord::new(3, "editor"));
        repo.write_snapshot(&target).unwrap();

        let roles = repo.load::<RoleRecord>().unwrap();
        assert_eq!(roles.ids().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_purge_and_has_children() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        repo.put(&ItemRecord::new(1, 0, ItemKind::Root, "root")).unwrap();
        let mut gone = ItemRecord::new(2, 1, ItemKind::Report, "old");
        gone.deleted = true;
        repo.put(&gone).unwrap();

        assert_eq!(repo.purge_deleted().unwrap(), 1);
        assert!(repo.get::<ItemRecord>(2).unwrap().is_none());

        assert_eq!(repo.refresh_has_children().unwrap(), 1);
        assert!(repo.get::<ItemRecord>(1).unwrap().unwrap().has_children);
    }

    #[test]
    fn test_task_registration() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        assert!(matches!(repo.task_registration(), Err(Error::NoTask)));

        let reg = TaskRegistration::new(2, DialectKind::Sqlite, "demo.sqlite");
        repo.register_task(&reg).unwrap();
        assert_eq!(repo.task_registration().unwrap(), reg);
    }
}
