//! Integration tests for end-to-end synchronization against SQLite.

use std::collections::HashSet;
use std::fs;
use std::thread;
use std::time::Duration;

use metasync_core::apply::ProgressLog;
use metasync_core::config::{QuiescencePolicy, SyncConfig};
use metasync_core::dialect::{DbConnection, DialectKind, SqliteConnection};
use metasync_core::metadata::{
    DataType, EditSession, FieldRecord, IndexRecord, ItemKind, ItemRecord, LookupListRecord,
    MetadataRepository, RoleRecord, Snapshot, TaskRegistration,
};
use metasync_core::reload::LiveApp;
use metasync_core::sync::Synchronizer;
use pretty_assertions::assert_eq;

struct TestContext {
    repo: MetadataRepository,
    db_path: String,
    dir: tempfile::TempDir,
    _meta: sled::Db,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("app.sqlite").to_string_lossy().to_string();
        let meta = sled::Config::new().temporary(true).open().unwrap();
        let repo = MetadataRepository::open(&meta).unwrap();

        let mut base = Snapshot::default();
        base.items.upsert(ItemRecord::new(5, 0, ItemKind::Task, "shop"));
        base.items
            .upsert(ItemRecord::new(6, 5, ItemKind::CatalogGroup, "catalogs"));
        base.roles.upsert(RoleRecord::new(1, "admin"));
        base.settings.field_id_gen = 200;
        repo.write_snapshot(&base).unwrap();
        repo.refresh_has_children().unwrap();
        repo.register_task(&TaskRegistration::new(5, DialectKind::Sqlite, db_path.clone()))
            .unwrap();

        Self {
            repo,
            db_path,
            dir,
            _meta: meta,
        }
    }

    fn sync(&self) -> Synchronizer<'_> {
        Synchronizer::new(&self.repo, SyncConfig::new())
    }

    fn sqlite(&self) -> SqliteConnection {
        SqliteConnection::open(&self.db_path).unwrap()
    }

    fn columns(&self, table: &str) -> Vec<String> {
        self.sqlite()
            .describe_table(table)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    fn index_exists(&self, name: &str) -> bool {
        let conn = rusqlite::Connection::open(&self.db_path).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    /// Apply a snapshot with the live ORDERS catalog added.
    fn create_orders(&self) -> Snapshot {
        let new = with_orders(self.repo.snapshot().unwrap());
        let report = self.sync().apply(new, None);
        assert!(report.success, "{report:?}");
        self.repo.snapshot().unwrap()
    }
}

fn with_orders(mut s: Snapshot) -> Snapshot {
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
fn test_create_and_alter_with_live_reload() {
    let ctx = TestContext::new();
    let app = LiveApp::load(&ctx.repo).unwrap();
    assert!(app.model().item_by_name("orders").is_none());

    let new = with_orders(ctx.repo.snapshot().unwrap());
    let report = ctx.sync().apply(new, Some(&app));
    assert!(report.success, "{report:?}");
    assert_eq!(report.statements_executed, 1);
    assert_eq!(ctx.columns("ORDERS"), ["ID", "DELETED"]);
    assert_eq!(app.model().generation, 2);
    assert!(app.model().rights(1, 10).can_view);

    let mut session = EditSession::begin(&ctx.repo).unwrap();
    let total = session
        .add_field(10, "total", DataType::Currency, 0)
        .unwrap();
    assert_eq!(total, 201);
    let new = session.finish();

    let mut log = ProgressLog::new();
    let plan = ctx.sync().plan(new.clone(), &mut log).unwrap();
    assert_eq!(
        plan.script.sql(),
        ["ALTER TABLE \"ORDERS\" ADD COLUMN \"TOTAL\" REAL"]
    );

    let report = ctx.sync().apply(new.clone(), Some(&app));
    assert!(report.success, "{report:?}");
    assert_eq!(report.statements_executed, 1);
    assert_eq!(ctx.columns("ORDERS"), ["ID", "DELETED", "TOTAL"]);
    assert_eq!(app.model().generation, 3);
    assert!(app.model().item(10).unwrap().field("total").is_some());

    // applying the same target again changes nothing
    let report = ctx.sync().apply(new, Some(&app));
    assert!(report.success, "{report:?}");
    assert_eq!(report.statements_executed, 0);
    assert_eq!(report.rows_written, 0);
    assert_eq!(app.model().generation, 3);
}

#[test]
fn test_dropped_index_goes_before_new_columns() {
    let ctx = TestContext::new();
    let mut start = with_orders(ctx.repo.snapshot().unwrap());
    start
        .fields
        .upsert(FieldRecord::new(102, 10, "total", DataType::Currency));
    start
        .indices
        .upsert(IndexRecord::new(1, 10, "IX1").with_field(102));
    assert!(ctx.sync().apply(start, None).success);
    assert!(ctx.index_exists("IX1"));

    let mut new = ctx.repo.snapshot().unwrap();
    new.indices.remove(1);
    new.fields
        .upsert(FieldRecord::new(103, 10, "note", DataType::Text).with_size(40));

    let mut log = ProgressLog::new();
    let plan = ctx.sync().plan(new.clone(), &mut log).unwrap();
    assert_eq!(
        plan.script.sql(),
        [
            "DROP INDEX \"IX1\"",
            "ALTER TABLE \"ORDERS\" ADD COLUMN \"NOTE\" TEXT",
        ]
    );

    let report = ctx.sync().apply(new, None);
    assert!(report.success, "{report:?}");
    assert!(!ctx.index_exists("IX1"));
    assert_eq!(ctx.columns("ORDERS"), ["ID", "DELETED", "TOTAL", "NOTE"]);
    assert!(ctx.repo.snapshot().unwrap().indices.is_empty());
}

#[test]
fn test_table_name_change_is_blocked() {
    let ctx = TestContext::new();
    let before = ctx.create_orders();

    let mut new = before.clone();
    new.items.get_mut(10).unwrap().table_name = "ORDERS_V2".into();
    new.fields
        .upsert(FieldRecord::new(102, 10, "total", DataType::Currency));

    let report = ctx.sync().apply(new, None);
    assert!(!report.success);
    assert!(!report.requires_intervention);
    assert!(report.error.unwrap().contains("ORDERS_V2"));
    assert_eq!(report.statements_executed, 0);
    assert_eq!(ctx.repo.snapshot().unwrap(), before);
    assert_eq!(ctx.columns("ORDERS"), ["ID", "DELETED"]);
}

#[test]
fn test_create_table_skips_unstored_fields() {
    let ctx = TestContext::new();
    let mut new = with_orders(ctx.repo.snapshot().unwrap());
    new.fields
        .upsert(FieldRecord::new(102, 10, "amount", DataType::Currency));
    new.fields
        .upsert(FieldRecord::new(103, 10, "amount_due", DataType::Currency).calculated());
    new.fields.upsert(
        FieldRecord::new(104, 10, "owner_ref", DataType::Integer).with_master_field(100),
    );

    let mut log = ProgressLog::new();
    let plan = ctx.sync().plan(new.clone(), &mut log).unwrap();
    let sql = plan.script.sql();
    assert_eq!(sql.len(), 1);
    assert!(sql[0].starts_with("CREATE TABLE \"ORDERS\""));
    assert!(sql[0].contains("\"AMOUNT\" REAL"));
    assert!(!sql[0].contains("AMOUNT_DUE"));
    assert!(!sql[0].contains("OWNER_REF"));

    assert!(ctx.sync().apply(new, None).success);
    assert_eq!(ctx.columns("ORDERS"), ["ID", "DELETED", "AMOUNT"]);
    // the unstored fields are still part of the metadata
    assert_eq!(ctx.repo.snapshot().unwrap().own_fields(10).count(), 5);
}

#[test]
fn test_bundle_round_trip_is_empty_and_copies_assets() {
    let ctx = TestContext::new();
    ctx.create_orders();

    let assets = ctx.dir.path().join("static");
    fs::create_dir_all(assets.join("js")).unwrap();
    fs::write(assets.join("js/shop.js"), "var shop;").unwrap();
    let bundle = ctx.dir.path().join("shop.zip");
    let exporter = Synchronizer::new(
        &ctx.repo,
        SyncConfig::new()
            .with_asset_root(&assets)
            .with_asset_path("js"),
    );
    let summary = exporter.export_bundle(&bundle).unwrap();
    assert_eq!(summary.assets.len(), 1);

    let deployed = ctx.dir.path().join("deployed");
    let importer = Synchronizer::new(&ctx.repo, SyncConfig::new().with_asset_root(&deployed));
    let before = ctx.repo.snapshot().unwrap();
    let report = importer.import_bundle(&bundle, None);
    assert!(report.success, "{report:?}");
    assert_eq!(report.statements_executed, 0);
    assert_eq!(report.rows_written, 0);
    assert_eq!(ctx.repo.snapshot().unwrap(), before);
    assert_eq!(
        fs::read_to_string(deployed.join("js/shop.js")).unwrap(),
        "var shop;"
    );
}

#[test]
fn test_failed_import_copies_no_assets() {
    let source = TestContext::new();
    let mut renamed = source.create_orders();
    renamed.items.get_mut(10).unwrap().table_name = "PURCHASES".into();
    source.repo.write_snapshot(&renamed).unwrap();

    let assets = source.dir.path().join("static");
    fs::create_dir_all(&assets).unwrap();
    fs::write(assets.join("shop.css"), "body {}").unwrap();
    let bundle = source.dir.path().join("shop.zip");
    Synchronizer::new(
        &source.repo,
        SyncConfig::new()
            .with_asset_root(&assets)
            .with_asset_path("shop.css"),
    )
    .export_bundle(&bundle)
    .unwrap();

    let target = TestContext::new();
    let before = target.create_orders();
    let deployed = target.dir.path().join("deployed");
    let report = Synchronizer::new(&target.repo, SyncConfig::new().with_asset_root(&deployed))
        .import_bundle(&bundle, None);

    assert!(!report.success);
    assert!(report.error.unwrap().contains("PURCHASES"));
    assert_eq!(target.repo.snapshot().unwrap(), before);
    assert!(!deployed.join("shop.css").exists());
}

/// Mark a guest role as soft-deleted in the live metadata.
fn add_deleted_role(ctx: &TestContext) -> Snapshot {
    let mut snapshot = ctx.repo.snapshot().unwrap();
    snapshot.roles.upsert(RoleRecord {
        deleted: true,
        ..RoleRecord::new(2, "guest")
    });
    ctx.repo.write_snapshot(&snapshot).unwrap();
    ctx.repo.snapshot().unwrap()
}

fn export_from(ctx: &TestContext) -> std::path::PathBuf {
    let bundle = ctx.dir.path().join("shop.zip");
    ctx.sync().export_bundle(&bundle).unwrap();
    bundle
}

#[test]
fn test_blocked_import_keeps_soft_deleted_rows() {
    let source = TestContext::new();
    let mut renamed = source.create_orders();
    renamed.items.get_mut(10).unwrap().table_name = "PURCHASES".into();
    source.repo.write_snapshot(&renamed).unwrap();
    let bundle = export_from(&source);

    let target = TestContext::new();
    target.create_orders();
    let before = add_deleted_role(&target);
    assert!(before.roles.get(2).unwrap().deleted);

    let report = target.sync().import_bundle(&bundle, None);
    assert!(!report.success);
    assert!(!report.requires_intervention);
    assert!(report.error.unwrap().contains("PURCHASES"));
    assert_eq!(target.repo.snapshot().unwrap(), before);
}

#[test]
fn test_import_purges_soft_deleted_rows() {
    let source = TestContext::new();
    source.create_orders();
    let bundle = export_from(&source);

    let target = TestContext::new();
    target.create_orders();
    add_deleted_role(&target);

    let report = target.sync().import_bundle(&bundle, None);
    assert!(report.success, "{report:?}");
    assert_eq!(report.statements_executed, 0);
    assert!(report.rows_written >= 1);
    let after = target.repo.snapshot().unwrap();
    assert!(after.roles.get(2).is_none());
    assert!(after.roles.get(1).is_some());
}

#[test]
fn test_unloadable_target_blocked_before_apply() {
    let ctx = TestContext::new();
    let app = LiveApp::load(&ctx.repo).unwrap();
    let before = ctx.repo.snapshot().unwrap();

    let mut new = with_orders(before.clone());
    new.lookup_lists
        .upsert(LookupListRecord::new(1, "status", "not json"));
    let report = ctx.sync().apply(new, Some(&app));

    assert!(!report.success);
    assert!(!report.requires_intervention);
    assert!(report.error.unwrap().contains("lookup list 1"));
    assert_eq!(report.statements_executed, 0);
    assert_eq!(ctx.repo.snapshot().unwrap(), before);
    assert!(ctx.sqlite().list_tables().unwrap().is_empty());
    assert_eq!(app.model().generation, 1);
    assert!(!app.activity().under_maintenance());
}

#[test]
fn test_busy_app_with_abort_policy_changes_nothing() {
    let ctx = TestContext::new();
    let app = LiveApp::load(&ctx.repo).unwrap();
    let _request = app.enter().unwrap();

    let config =
        SyncConfig::new().with_quiescence(QuiescencePolicy::abort_after(Duration::from_millis(20)));
    let before = ctx.repo.snapshot().unwrap();
    let report = Synchronizer::new(&ctx.repo, config).apply(with_orders(before.clone()), Some(&app));

    assert!(!report.success);
    assert!(report.error.unwrap().contains("still active"));
    assert_eq!(ctx.repo.snapshot().unwrap(), before);
    assert!(ctx.sqlite().list_tables().unwrap().is_empty());
    assert_eq!(app.model().generation, 1);
    assert!(!app.activity().under_maintenance());
}

#[test]
fn test_concurrent_field_ids_never_overlap() {
    let ctx = TestContext::new();
    let firsts: Vec<i64> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    (0..25)
                        .map(|_| ctx.repo.next_field_id(3).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    let unique: HashSet<i64> = firsts.iter().copied().collect();
    assert_eq!(unique.len(), 200);
    let mut sorted = firsts;
    sorted.sort_unstable();
    assert!(sorted.windows(2).all(|w| w[1] - w[0] >= 3));
    assert_eq!(sorted[0], 201);
    assert_eq!(ctx.repo.settings().unwrap().field_id_gen, 200 + 600);
}

#[test]
fn test_introspection() {
    let ctx = TestContext::new();
    ctx.create_orders();
    {
        let mut conn = ctx.sqlite();
        conn.execute("CREATE TABLE \"LEGACY\" (\"ID\" INTEGER)").unwrap();
        conn.execute("CREATE TABLE \"orders_archive\" (\"ID\" INTEGER)")
            .unwrap();
    }

    let sync = ctx.sync();
    assert_eq!(sync.unregistered_tables().unwrap(), ["LEGACY", "orders_archive"]);
    let columns: Vec<_> = sync
        .describe_table("ORDERS")
        .unwrap()
        .into_iter()
        .map(|c| (c.name, c.type_name))
        .collect();
    assert_eq!(
        columns,
        [
            ("ID".to_string(), "INTEGER".to_string()),
            ("DELETED".to_string(), "INTEGER".to_string()),
        ]
    );
}
