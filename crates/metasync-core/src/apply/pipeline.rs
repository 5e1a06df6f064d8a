//! Two-phase apply: physical DDL, then metadata.

use tracing::{debug, error, info, instrument, warn};

use super::error::SyncError;
use super::progress::{ProgressLog, Stage};
use super::write_set::build_write_set;
use crate::ddl::{assign_generator_names, synthesize, DdlScript};
use crate::dialect::{ConnectParams, DbConnection, Dialect, DialectError};
use crate::diff::{diff, Delta};
use crate::error::Error;
use crate::metadata::{MetaTable, MetadataRepository, Settings, SettingsEffects, Snapshot, WriteBatch};
use crate::validate::validate;

/// Everything needed to apply one migration.
#[derive(Debug, Clone)]
pub struct Plan {
    pub old: Snapshot,
    /// The new snapshot, with generator names and derived flags filled in.
    pub new: Snapshot,
    pub delta: Delta,
    pub script: DdlScript,
    /// Validation warnings and synthesis notes.
    pub warnings: Vec<String>,
    /// Soft-deleted rows of the old snapshot removed with the commit.
    pub purge: Vec<(MetaTable, i64)>,
}

impl Plan {
    /// Build a plan. Validation runs before any DDL is rendered.
    #[instrument(skip_all, fields(dialect = %dialect.kind()))]
    pub fn prepare(
        old: Snapshot,
        mut new: Snapshot,
        dialect: &dyn Dialect,
        log: &mut ProgressLog,
    ) -> Result<Self, SyncError> {
        let named = assign_generator_names(&old, &mut new, dialect);
        if named > 0 {
            debug!(named, "generator names assigned");
        }
        new.refresh_has_children();

        let mut warnings = validate(&old, &new).into_result()?;
        let delta = diff(&old, &new);
        let script = synthesize(&delta, &old, &new, dialect)?;
        warnings.extend(script.notes().iter().cloned());
        for warning in &warnings {
            log.warn(Stage::Analyze, warning.clone());
        }
        log.record(
            Stage::Analyze,
            format!(
                "{} metadata change(s), {} ddl statement(s)",
                delta.change_count(),
                script.len()
            ),
        );

        Ok(Self {
            old,
            new,
            delta,
            script,
            warnings,
            purge: Vec::new(),
        })
    }

    /// Also remove the rows the old snapshot holds as soft-deleted.
    pub fn with_purge(mut self) -> Self {
        self.purge = self.old.deleted_rows();
        self
    }

    /// Check if applying the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty() && self.script.is_empty() && self.purge.is_empty()
    }
}

/// Result of a successful apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub statements_executed: usize,
    pub rows_written: usize,
    /// Settings now in effect.
    pub settings: Option<Settings>,
    pub effects: SettingsEffects,
}

/// Opens the connection the DDL phase runs on.
pub type Connector<'a> = Box<dyn Fn() -> Result<Box<dyn DbConnection>, DialectError> + 'a>;

/// Writes the metadata batch.
pub type Committer<'a> = Box<dyn Fn(&WriteBatch) -> Result<(), Error> + 'a>;

/// Applies plans to the backing database and the metadata repository.
pub struct ApplyPipeline<'a> {
    dialect: &'a dyn Dialect,
    connector: Connector<'a>,
    committer: Committer<'a>,
    default_privileges: bool,
}

impl<'a> ApplyPipeline<'a> {
    pub fn new(repo: &'a MetadataRepository, dialect: &'a dyn Dialect, params: ConnectParams) -> Self {
        Self {
            dialect,
            connector: Box::new(move || dialect.connect(&params)),
            committer: Box::new(move |batch: &WriteBatch| repo.commit(batch)),
            default_privileges: true,
        }
    }

    pub fn with_default_privileges(mut self, enabled: bool) -> Self {
        self.default_privileges = enabled;
        self
    }

    /// Replace how the DDL connection is opened.
    pub fn with_connector(mut self, connector: Connector<'a>) -> Self {
        self.connector = connector;
        self
    }

    /// Replace how the metadata batch is written.
    pub fn with_committer(mut self, committer: Committer<'a>) -> Self {
        self.committer = committer;
        self
    }

    /// Apply a plan.
    ///
    /// The metadata phase runs only when the physical phase fully succeeded.
    #[instrument(skip_all, fields(dialect = %self.dialect.kind()))]
    pub fn apply(&self, plan: &Plan, log: &mut ProgressLog) -> Result<ApplyOutcome, SyncError> {
        if plan.is_empty() {
            log.record(Stage::Apply, "nothing to apply");
            return Ok(ApplyOutcome::default());
        }

        let mut batch = WriteBatch::new();
        for &(table, id) in &plan.purge {
            batch.remove(table, id);
        }
        batch.extend(build_write_set(
            &plan.delta,
            &plan.old,
            &plan.new,
            self.default_privileges,
        )?);

        let executed = if plan.script.is_empty() {
            0
        } else {
            self.execute_physical(&plan.script, log)?
        };

        (self.committer)(&batch).map_err(|source| {
            if executed > 0 {
                error!(%source, "metadata commit failed after the database schema changed");
                SyncError::MetadataAfterPhysical { source }
            } else {
                SyncError::Metadata(source)
            }
        })?;
        log.record(
            Stage::Apply,
            format!("{} metadata row(s) written", batch.len()),
        );

        let settings = batch.settings().cloned();
        let effects = settings
            .as_ref()
            .map(|next| plan.old.settings.effects_of(next))
            .unwrap_or_default();
        Ok(ApplyOutcome {
            statements_executed: executed,
            rows_written: batch.len(),
            settings,
            effects,
        })
    }

    fn execute_physical(&self, script: &DdlScript, log: &mut ProgressLog) -> Result<usize, SyncError> {
        let mut conn = (self.connector)().map_err(SyncError::Connection)?;
        let transactional = self.dialect.supports_ddl_rollback();
        if transactional {
            conn.begin().map_err(SyncError::Connection)?;
        }

        let total = script.len();
        for (index, statement) in script.statements().enumerate() {
            debug!(sql = %statement.sql, "executing");
            if let Err(source) = conn.execute(&statement.sql) {
                if transactional {
                    if let Err(e) = conn.rollback() {
                        error!(error = %e, "rollback failed");
                    }
                    close(conn);
                    log.warn(
                        Stage::Apply,
                        format!("statement {} failed, database changes rolled back", index + 1),
                    );
                    return Err(SyncError::PhysicalRolledBack { index, source });
                }
                close(conn);
                log.warn(
                    Stage::Apply,
                    format!(
                        "statement {} failed after {index} of {total} applied; \
                         database and metadata are out of sync",
                        index + 1
                    ),
                );
                return Err(SyncError::PhysicalPartial {
                    executed: index,
                    total,
                    source,
                });
            }
        }

        if transactional {
            if let Err(source) = conn.commit() {
                if let Err(e) = conn.rollback() {
                    error!(error = %e, "rollback failed");
                }
                close(conn);
                return Err(SyncError::PhysicalRolledBack {
                    index: total,
                    source,
                });
            }
        }
        close(conn);
        info!(statements = total, "database schema changed");
        log.record(Stage::Apply, format!("{total} ddl statement(s) executed"));
        Ok(total)
    }
}

fn close(conn: Box<dyn DbConnection>) {
    if let Err(e) = conn.close() {
        warn!(error = %e, "closing the ddl connection failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::dialect::{ColumnInfo, DbConnection, FirebirdDialect, SqliteConnection, SqliteDialect};
    use crate::metadata::{DataType, FieldRecord, ItemKind, ItemRecord, RoleRecord};

    fn test_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    fn orders() -> Snapshot {
        let mut s = Snapshot::default();
        s.items
            .upsert(ItemRecord::new(6, 5, ItemKind::CatalogGroup, "catalogs"));
        s.items.upsert(
            ItemRecord::new(10, 6, ItemKind::Catalog, "orders")
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
    fn test_empty_plan_is_noop() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        let mut log = ProgressLog::new();
        let plan = Plan::prepare(orders(), orders(), &SqliteDialect, &mut log).unwrap();
        assert!(plan.is_empty());

        // the connection is never opened
        let pipeline = ApplyPipeline::new(&repo, &SqliteDialect, ConnectParams::file("/nonexistent/x.db"));
        let outcome = pipeline.apply(&plan, &mut log).unwrap();
        assert_eq!(outcome, ApplyOutcome::default());
    }

    #[test]
    fn test_failed_statement_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sqlite");
        let path = path.to_string_lossy().to_string();
        {
            let mut conn = SqliteConnection::open(&path).unwrap();
            conn.execute("CREATE TABLE \"ORDERS\" (\"ID\" INTEGER NOT NULL PRIMARY KEY, \"DELETED\" INTEGER)")
                .unwrap();
        }

        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        repo.write_snapshot(&orders()).unwrap();

        let old = repo.snapshot().unwrap();
        let mut new = old.clone();
        new.fields
            .upsert(FieldRecord::new(102, 10, "total", DataType::Currency));
        // the second column collides with an existing one
        new.fields
            .upsert(FieldRecord::new(103, 10, "deleted2", DataType::Integer).with_column("DELETED"));

        let mut log = ProgressLog::new();
        let plan = Plan::prepare(old.clone(), new, &SqliteDialect, &mut log).unwrap();
        let pipeline = ApplyPipeline::new(&repo, &SqliteDialect, ConnectParams::file(path.clone()));
        let err = pipeline.apply(&plan, &mut log).unwrap_err();
        assert!(matches!(err, SyncError::PhysicalRolledBack { index: 1, .. }));
        assert!(err.is_side_effect_free());

        let mut conn = SqliteConnection::open(&path).unwrap();
        assert_eq!(conn.describe_table("ORDERS").unwrap().len(), 2);
        assert_eq!(repo.snapshot().unwrap(), old);
    }

    /// Accepts statements until `fail_at`, then fails every one after.
    struct ScriptedConnection {
        fail_at: usize,
        executed: Arc<AtomicUsize>,
    }

    impl DbConnection for ScriptedConnection {
        fn execute(&mut self, sql: &str) -> Result<(), DialectError> {
            if self.executed.load(Ordering::SeqCst) + 1 >= self.fail_at {
                return Err(DialectError::Execution {
                    statement: sql.to_string(),
                    message: "lock conflict".into(),
                });
            }
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn begin(&mut self) -> Result<(), DialectError> {
            Ok(())
        }

        fn commit(&mut self) -> Result<(), DialectError> {
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), DialectError> {
            Ok(())
        }

        fn list_tables(&mut self) -> Result<Vec<String>, DialectError> {
            Ok(Vec::new())
        }

        fn describe_table(&mut self, _table: &str) -> Result<Vec<ColumnInfo>, DialectError> {
            Ok(Vec::new())
        }

        fn close(self: Box<Self>) -> Result<(), DialectError> {
            Ok(())
        }
    }

    fn with_two_columns(old: &Snapshot) -> Snapshot {
        let mut new = old.clone();
        new.fields
            .upsert(FieldRecord::new(102, 10, "total", DataType::Currency));
        new.fields
            .upsert(FieldRecord::new(103, 10, "note", DataType::Text).with_size(40));
        new
    }

    #[test]
    fn test_partial_ddl_leaves_metadata_untouched() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        repo.write_snapshot(&orders()).unwrap();
        let old = repo.snapshot().unwrap();

        let mut log = ProgressLog::new();
        let plan = Plan::prepare(old.clone(), with_two_columns(&old), &FirebirdDialect, &mut log).unwrap();
        assert_eq!(plan.script.len(), 2);

        let executed = Arc::new(AtomicUsize::new(0));
        let counter = executed.clone();
        let pipeline = ApplyPipeline::new(&repo, &FirebirdDialect, ConnectParams::file("app.fdb"))
            .with_connector(Box::new(move || -> Result<Box<dyn DbConnection>, DialectError> {
                Ok(Box::new(ScriptedConnection {
                    fail_at: 2,
                    executed: counter.clone(),
                }))
            }));
        let err = pipeline.apply(&plan, &mut log).unwrap_err();

        assert!(matches!(
            err,
            SyncError::PhysicalPartial {
                executed: 1,
                total: 2,
                ..
            }
        ));
        assert!(err.requires_intervention());
        assert!(!err.is_side_effect_free());
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert_eq!(repo.snapshot().unwrap(), old);
        assert!(log.warnings().any(|w| w.message.contains("out of sync")));
    }

    #[test]
    fn test_metadata_failure_after_ddl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sqlite");
        let path = path.to_string_lossy().to_string();
        {
            let mut conn = SqliteConnection::open(&path).unwrap();
            conn.execute("CREATE TABLE \"ORDERS\" (\"ID\" INTEGER NOT NULL PRIMARY KEY, \"DELETED\" INTEGER)")
                .unwrap();
        }

        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        repo.write_snapshot(&orders()).unwrap();
        let old = repo.snapshot().unwrap();

        let mut log = ProgressLog::new();
        let plan = Plan::prepare(old.clone(), with_two_columns(&old), &SqliteDialect, &mut log).unwrap();
        let pipeline = ApplyPipeline::new(&repo, &SqliteDialect, ConnectParams::file(path.clone()))
            .with_committer(Box::new(|_: &WriteBatch| -> Result<(), Error> {
                Err(Error::Transaction("disk full".into()))
            }));
        let err = pipeline.apply(&plan, &mut log).unwrap_err();

        assert!(matches!(err, SyncError::MetadataAfterPhysical { .. }));
        assert!(err.requires_intervention());

        // the columns stay, the metadata does not know about them
        let mut conn = SqliteConnection::open(&path).unwrap();
        assert_eq!(conn.describe_table("ORDERS").unwrap().len(), 4);
        assert_eq!(repo.snapshot().unwrap(), old);
    }

    #[test]
    fn test_metadata_failure_without_ddl() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        let old = orders();
        let mut new = old.clone();
        new.roles.upsert(RoleRecord::new(3, "clerk"));

        let mut log = ProgressLog::new();
        let plan = Plan::prepare(old, new, &SqliteDialect, &mut log).unwrap();
        assert!(plan.script.is_empty());
        let pipeline = ApplyPipeline::new(&repo, &SqliteDialect, ConnectParams::file("/nonexistent/x.db"))
            .with_committer(Box::new(|_: &WriteBatch| -> Result<(), Error> {
                Err(Error::Transaction("disk full".into()))
            }));
        let err = pipeline.apply(&plan, &mut log).unwrap_err();
        assert!(matches!(err, SyncError::Metadata(_)));
        assert!(!err.requires_intervention());
    }

    #[test]
    fn test_purge_rides_in_the_commit() {
        let db = test_db();
        let repo = MetadataRepository::open(&db).unwrap();
        let mut seeded = orders();
        seeded.roles.upsert(RoleRecord {
            deleted: true,
            ..RoleRecord::new(2, "guest")
        });
        seeded.refresh_has_children();
        repo.write_snapshot(&seeded).unwrap();

        let old = repo.snapshot().unwrap();
        let mut new = old.clone();
        new.purge_deleted();

        let mut log = ProgressLog::new();
        let plan = Plan::prepare(old, new, &SqliteDialect, &mut log).unwrap();
        assert!(plan.is_empty());
        let plan = plan.with_purge();
        assert_eq!(plan.purge, vec![(MetaTable::Roles, 2)]);
        assert!(!plan.is_empty());

        let pipeline = ApplyPipeline::new(&repo, &SqliteDialect, ConnectParams::file("/nonexistent/x.db"));
        let outcome = pipeline.apply(&plan, &mut log).unwrap();
        assert_eq!(outcome.rows_written, 1);
        assert!(repo.snapshot().unwrap().roles.get(2).is_none());
    }
}
