//! End-to-end synchronization.
//!
//! [`Synchronizer`] ties the stages together: read the live and incoming
//! snapshots, plan, quiesce the running application, apply, swap the live
//! model and, for bundle imports, copy the bundle's assets.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::apply::{ApplyOutcome, ApplyPipeline, Plan, ProgressLog, Stage, SyncError};
use crate::bundle::{write_bundle, BundleDocument, ExportSummary, ExtractedBundle};
use crate::config::SyncConfig;
use crate::dialect::{ColumnInfo, ConnectParams, DbConnection, Dialect};
use crate::metadata::{MetadataRepository, Snapshot};
use crate::reload::{LiveApp, TaskModel};

/// Operator-facing result of a synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub error: Option<String>,
    /// Set when database and metadata may disagree.
    pub requires_intervention: bool,
    /// Progress trail, one line per entry.
    pub progress: Vec<String>,
    pub warnings: Vec<String>,
    pub statements_executed: usize,
    pub rows_written: usize,
}

impl SyncReport {
    fn new(result: Result<ApplyOutcome, SyncError>, log: &ProgressLog) -> Self {
        let warnings = log.warnings().map(|w| w.message.clone()).collect();
        let progress = log.lines();
        match result {
            Ok(outcome) => Self {
                success: true,
                error: None,
                requires_intervention: false,
                progress,
                warnings,
                statements_executed: outcome.statements_executed,
                rows_written: outcome.rows_written,
            },
            Err(err) => {
                error!(error = %err, "synchronization failed");
                let committed = err.committed_outcome().cloned().unwrap_or_default();
                Self {
                    success: false,
                    requires_intervention: err.requires_intervention(),
                    error: Some(err.to_string()),
                    progress,
                    warnings,
                    statements_executed: committed.statements_executed,
                    rows_written: committed.rows_written,
                }
            }
        }
    }
}

/// Runs migrations against one metadata repository.
pub struct Synchronizer<'a> {
    repo: &'a MetadataRepository,
    config: SyncConfig,
}

impl<'a> Synchronizer<'a> {
    pub fn new(repo: &'a MetadataRepository, config: SyncConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The dialect and connection parameters of the registered task.
    ///
    /// Parameters from the configuration override the registration.
    fn target(&self) -> Result<(&'static dyn Dialect, ConnectParams), SyncError> {
        let registration = self.repo.task_registration()?;
        let params = self
            .config
            .connection
            .clone()
            .unwrap_or_else(|| registration.connect_params());
        Ok((registration.dialect.dialect(), params))
    }

    fn connect(&self) -> Result<Box<dyn DbConnection>, SyncError> {
        let (dialect, params) = self.target()?;
        dialect.connect(&params).map_err(SyncError::Connection)
    }

    /// Plan a migration from the live metadata to `new` without applying it.
    pub fn plan(&self, new: Snapshot, log: &mut ProgressLog) -> Result<Plan, SyncError> {
        let (dialect, _) = self.target()?;
        let old = self.repo.snapshot()?;
        log.record(
            Stage::Read,
            format!("live metadata read: {} row(s)", old.row_count()),
        );
        Plan::prepare(old, new, dialect, log)
    }

    /// Migrate the live metadata and database to `new`.
    pub fn apply(&self, new: Snapshot, app: Option<&LiveApp>) -> SyncReport {
        let mut log = ProgressLog::new();
        let result = self.run(new, app, false, &mut log);
        SyncReport::new(result, &log)
    }

    /// Plan, quiesce, apply and swap. With `purge`, rows the live metadata
    /// holds as soft-deleted are removed in the same commit.
    #[instrument(skip_all)]
    fn run(
        &self,
        new: Snapshot,
        app: Option<&LiveApp>,
        purge: bool,
        log: &mut ProgressLog,
    ) -> Result<ApplyOutcome, SyncError> {
        let (dialect, params) = self.target()?;
        let mut plan = self.plan(new, log)?;
        if purge {
            plan = plan.with_purge();
            if !plan.purge.is_empty() {
                log.record(
                    Stage::Analyze,
                    format!("{} soft-deleted row(s) to purge", plan.purge.len()),
                );
            }
        }
        if plan.is_empty() {
            log.record(Stage::Apply, "metadata already up to date");
            return Ok(ApplyOutcome::default());
        }

        if app.is_some() {
            TaskModel::build(&plan.new, 0).map_err(SyncError::ModelRejected)?;
        }
        let maintenance = match app {
            Some(app) => Some(app.quiesce(&self.config.quiescence, log)?),
            None => None,
        };

        let outcome = ApplyPipeline::new(self.repo, dialect, params)
            .with_default_privileges(self.config.default_privileges)
            .apply(&plan, log)?;
        report_effects(&outcome, log);

        if let (Some(app), Some(guard)) = (app, maintenance.as_ref()) {
            if let Err(err) = app.swap(self.repo, guard, log) {
                log.warn(Stage::Reload, "live model not rebuilt; the application serves stale metadata");
                return Err(match err {
                    SyncError::Model(source) => SyncError::ReloadAfterCommit {
                        outcome: Box::new(outcome),
                        source,
                    },
                    other => other,
                });
            }
        }

        info!(
            statements = outcome.statements_executed,
            rows = outcome.rows_written,
            "migration applied"
        );
        Ok(outcome)
    }

    /// Import a migration bundle.
    ///
    /// Assets are copied into the asset root only once the metadata is
    /// committed. The scratch directory is removed in every case.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn import_bundle(&self, path: &Path, app: Option<&LiveApp>) -> SyncReport {
        let mut log = ProgressLog::new();
        let result = self.import(path, app, &mut log);
        SyncReport::new(result, &log)
    }

    fn import(
        &self,
        path: &Path,
        app: Option<&LiveApp>,
        log: &mut ProgressLog,
    ) -> Result<ApplyOutcome, SyncError> {
        let bundle = ExtractedBundle::open(path).map_err(|e| SyncError::Bundle(e.to_string()))?;
        let document = bundle.document();
        log.record(
            Stage::Read,
            format!(
                "bundle of task '{}' exported {}",
                document.task_name,
                document.exported_at.to_rfc3339()
            ),
        );

        let mut new = document
            .clone()
            .into_snapshot()
            .map_err(|e| SyncError::Bundle(e.to_string()))?;
        let dropped = new.purge_deleted();
        if dropped > 0 {
            log.record(
                Stage::Read,
                format!("{dropped} soft-deleted row(s) in the bundle skipped"),
            );
        }

        match self.run(new, app, true, log) {
            Ok(outcome) => {
                self.copy_assets(&bundle, log)?;
                Ok(outcome)
            }
            // the metadata is committed, so the assets belong to it
            Err(err @ SyncError::ReloadAfterCommit { .. }) => {
                if let Err(copy) = self.copy_assets(&bundle, log) {
                    log.warn(Stage::Copy, copy.to_string());
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn copy_assets(&self, bundle: &ExtractedBundle, log: &mut ProgressLog) -> Result<(), SyncError> {
        if bundle.assets().is_empty() {
            return Ok(());
        }
        match &self.config.asset_root {
            Some(root) => {
                let copied = bundle
                    .copy_assets(root)
                    .map_err(|e| SyncError::AssetsNotCopied(e.to_string()))?;
                log.record(Stage::Copy, format!("{copied} asset file(s) copied"));
            }
            None => log.warn(
                Stage::Copy,
                format!(
                    "no asset root configured; {} asset file(s) not copied",
                    bundle.assets().len()
                ),
            ),
        }
        Ok(())
    }

    /// Export the live metadata and configured assets to `dest`.
    pub fn export_bundle(&self, dest: &Path) -> Result<ExportSummary, SyncError> {
        let snapshot = self.repo.snapshot()?;
        let document = BundleDocument::from_snapshot(&snapshot);
        write_bundle(dest, &document, &self.config).map_err(|e| SyncError::Bundle(e.to_string()))
    }

    /// Tables in the database that no item references, sorted.
    pub fn unregistered_tables(&self) -> Result<Vec<String>, SyncError> {
        let snapshot = self.repo.snapshot()?;
        let known: HashSet<String> = snapshot
            .items
            .iter()
            .filter(|i| !i.deleted && !i.table_name.is_empty())
            .map(|i| i.table_name.to_ascii_uppercase())
            .collect();

        let mut conn = self.connect()?;
        let tables = conn.list_tables().map_err(SyncError::Connection);
        close(conn);
        let tables = tables?;

        let mut out: Vec<String> = tables
            .into_iter()
            .filter(|t| !known.contains(&t.to_ascii_uppercase()))
            .collect();
        out.sort();
        Ok(out)
    }

    /// Column layout of a database table.
    pub fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, SyncError> {
        let mut conn = self.connect()?;
        let columns = conn.describe_table(table).map_err(SyncError::Connection);
        close(conn);
        columns
    }
}

/// Operator follow-ups implied by a settings change.
fn report_effects(outcome: &ApplyOutcome, log: &mut ProgressLog) {
    let effects = outcome.effects;
    if effects.client_modified {
        log.warn(Stage::Apply, "client assets must be regenerated");
    }
    if effects.server_modified {
        log.warn(Stage::Apply, "server modules must be recompiled");
    }
    if effects.reset_sessions {
        log.warn(Stage::Apply, "safe mode changed; user sessions must be reset");
    }
}

fn close(conn: Box<dyn DbConnection>) {
    if let Err(e) = conn.close() {
        warn!(error = %e, "closing the database connection failed");
    }
}
