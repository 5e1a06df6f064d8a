//! Quiescence and atomic model swap.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, instrument};

use super::activity::{ActivityTracker, MaintenanceGuard, QuiescenceOutcome, RequestGuard, Unavailable};
use super::model::{ModelError, TaskModel};
use crate::apply::{ProgressLog, Stage, SyncError};
use crate::config::{QuiescencePolicy, TimeoutAction};
use crate::metadata::MetadataRepository;

/// The running application: one compiled model shared by all requests.
///
/// Requests hold an `Arc` to the model they started with, so a swap never
/// changes the structure under a running request.
#[derive(Debug)]
pub struct LiveApp {
    model: RwLock<Arc<TaskModel>>,
    activity: ActivityTracker,
}

impl LiveApp {
    pub fn new(model: TaskModel) -> Self {
        Self {
            model: RwLock::new(Arc::new(model)),
            activity: ActivityTracker::new(),
        }
    }

    /// Build the first model from committed metadata.
    pub fn load(repo: &MetadataRepository) -> Result<Self, ModelError> {
        let snapshot = repo.snapshot()?;
        Ok(Self::new(TaskModel::build(&snapshot, 1)?))
    }

    /// The current model.
    pub fn model(&self) -> Arc<TaskModel> {
        Arc::clone(&*self.model.read())
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    /// Start a request against the current model.
    pub fn enter(&self) -> Result<(RequestGuard<'_>, Arc<TaskModel>), Unavailable> {
        let guard = self.activity.enter()?;
        Ok((guard, self.model()))
    }

    /// Raise the maintenance flag and wait for in-flight requests.
    ///
    /// A timeout is logged and tolerated under [`TimeoutAction::Proceed`].
    pub fn quiesce(
        &self,
        policy: &QuiescencePolicy,
        log: &mut ProgressLog,
    ) -> Result<MaintenanceGuard<'_>, SyncError> {
        let (guard, outcome) = self
            .activity
            .quiesce(policy)
            .ok_or(SyncError::MaintenanceInProgress)?;
        match outcome {
            QuiescenceOutcome::Idle { waited } => {
                log.record(
                    Stage::Reload,
                    format!("requests drained after {} ms", waited.as_millis()),
                );
            }
            QuiescenceOutcome::TimedOut { active, waited } => {
                let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                if policy.on_timeout == TimeoutAction::Abort {
                    return Err(SyncError::QuiescenceAborted { active, waited_ms });
                }
                log.warn(
                    Stage::Reload,
                    format!("{active} request(s) still active after {waited_ms} ms; proceeding"),
                );
            }
        }
        Ok(guard)
    }

    /// Rebuild the model from committed metadata and swap it in.
    ///
    /// The new model is built completely before the swap; on error the
    /// current model stays in place.
    pub fn swap(
        &self,
        repo: &MetadataRepository,
        _maintenance: &MaintenanceGuard<'_>,
        log: &mut ProgressLog,
    ) -> Result<Arc<TaskModel>, SyncError> {
        let snapshot = repo.snapshot().map_err(ModelError::from)?;
        let generation = self.model.read().generation + 1;
        let next = Arc::new(TaskModel::build(&snapshot, generation)?);
        *self.model.write() = Arc::clone(&next);
        info!(generation, items = next.items().count(), "task model swapped");
        log.record(Stage::Reload, format!("task model rebuilt (generation {generation})"));
        Ok(next)
    }

    /// Quiesce, rebuild and swap.
    #[instrument(skip_all)]
    pub fn reload(
        &self,
        repo: &MetadataRepository,
        policy: &QuiescencePolicy,
        log: &mut ProgressLog,
    ) -> Result<Arc<TaskModel>, SyncError> {
        let guard = self.quiesce(policy, log)?;
        self.swap(repo, &guard, log)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::metadata::{DataType, FieldRecord, ItemKind, ItemRecord, Snapshot};

    fn test_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    fn seeded_repo(db: &sled::Db) -> MetadataRepository {
        let repo = MetadataRepository::open(db).unwrap();
        let mut s = Snapshot::default();
        s.items.upsert(ItemRecord::new(5, 0, ItemKind::Task, "demo"));
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
        repo.write_snapshot(&s).unwrap();
        repo
    }

    #[test]
    fn test_reload_swaps_generation() {
        let db = test_db();
        let repo = seeded_repo(&db);
        let app = LiveApp::load(&repo).unwrap();
        let (request, before) = app.enter().unwrap();
        drop(request);

        repo.put(&FieldRecord::new(102, 10, "total", DataType::Currency))
            .unwrap();
        let mut log = ProgressLog::new();
        let after = app
            .reload(&repo, &QuiescencePolicy::default(), &mut log)
            .unwrap();

        assert_eq!(after.generation, 2);
        assert_eq!(before.item(10).unwrap().fields.len(), 2);
        assert_eq!(app.model().item(10).unwrap().fields.len(), 3);
        assert!(!app.activity().under_maintenance());
    }

    #[test]
    fn test_failed_build_keeps_current_model() {
        let db = test_db();
        let repo = seeded_repo(&db);
        let app = LiveApp::load(&repo).unwrap();

        let mut broken = FieldRecord::new(102, 10, "odd", DataType::Text);
        broken.data_type = 99;
        repo.put(&broken).unwrap();

        let mut log = ProgressLog::new();
        let err = app
            .reload(&repo, &QuiescencePolicy::default(), &mut log)
            .unwrap_err();
        assert!(matches!(err, SyncError::Model(ModelError::UnknownDataType { .. })));
        assert_eq!(app.model().generation, 1);
        assert!(app.enter().is_ok());
    }

    #[test]
    fn test_abort_policy_on_busy_app() {
        let db = test_db();
        let repo = seeded_repo(&db);
        let app = LiveApp::load(&repo).unwrap();
        let _busy = app.enter().unwrap();

        let mut log = ProgressLog::new();
        let policy = QuiescencePolicy::abort_after(Duration::from_millis(10));
        let err = app.reload(&repo, &policy, &mut log).unwrap_err();
        assert!(matches!(err, SyncError::QuiescenceAborted { active: 1, .. }));
        assert!(!app.activity().under_maintenance());

        let proceed = QuiescencePolicy::default().with_max_wait(Duration::from_millis(10));
        assert!(app.reload(&repo, &proceed, &mut log).is_ok());
        assert_eq!(log.warnings().count(), 1);
    }
}
