//! Operator-facing migration errors.

use thiserror::Error;

use super::pipeline::ApplyOutcome;
use crate::ddl::SynthesisError;
use crate::dialect::DialectError;
use crate::reload::ModelError;

/// Errors of the synchronization pipeline.
///
/// Variants are ordered by how far the pipeline got before failing. Use
/// [`SyncError::is_side_effect_free`] to tell whether anything was changed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Structural conflicts were found before any change was made.
    #[error("migration blocked by {count} conflict(s):\n{message}")]
    ValidationFailed {
        /// Number of conflicts.
        count: usize,
        /// All conflicts, one per line.
        message: String,
    },

    /// DDL could not be synthesized.
    #[error("ddl synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// The backing database could not be reached.
    #[error("database connection failed: {0}")]
    Connection(#[source] DialectError),

    /// Another maintenance run holds the application.
    #[error("a structural change is already in progress")]
    MaintenanceInProgress,

    /// In-flight requests did not drain and the policy says abort.
    #[error("{active} request(s) still active after waiting {waited_ms} ms")]
    QuiescenceAborted {
        /// Requests still active.
        active: usize,
        /// Time spent waiting.
        waited_ms: u64,
    },

    /// A DDL statement failed and the whole batch was rolled back.
    #[error("database change rolled back at statement {index}: {source}")]
    PhysicalRolledBack {
        /// Index of the failing statement.
        index: usize,
        /// Engine error.
        #[source]
        source: DialectError,
    },

    /// A DDL statement failed on a database without DDL rollback.
    ///
    /// Statements executed before the failure stay applied and the metadata
    /// phase was skipped. The operator must reconcile by hand.
    #[error(
        "database partially changed ({executed} of {total} statements applied), \
         metadata left untouched; manual reconciliation required: {source}"
    )]
    PhysicalPartial {
        /// Statements that completed.
        executed: usize,
        /// Statements in the batch.
        total: usize,
        /// Engine error.
        #[source]
        source: DialectError,
    },

    /// The metadata commit failed after the database schema was changed.
    #[error("database schema changed but metadata commit failed; schema is ahead of metadata: {source}")]
    MetadataAfterPhysical {
        /// Storage error.
        #[source]
        source: crate::error::Error,
    },

    /// Metadata could not be read or written before any database change.
    #[error("metadata error: {0}")]
    Metadata(#[from] crate::error::Error),

    /// The migration bundle could not be read or written.
    #[error("bundle error: {0}")]
    Bundle(String),

    /// Bundle assets could not be copied after a successful apply.
    #[error("migration applied but assets were not copied: {0}")]
    AssetsNotCopied(String),

    /// The live object graph could not be rebuilt.
    #[error("model rebuild failed: {0}")]
    Model(#[from] ModelError),

    /// The target metadata does not form a loadable model; nothing was applied.
    #[error("target metadata cannot be loaded by the application: {0}")]
    ModelRejected(#[source] ModelError),

    /// Database and metadata were migrated but the running application still
    /// serves the previous model.
    #[error("migration applied but the live model was not rebuilt; restart the application: {source}")]
    ReloadAfterCommit {
        /// What the apply did.
        outcome: Box<ApplyOutcome>,
        #[source]
        source: ModelError,
    },
}

impl SyncError {
    /// Check if the failure left the database and metadata untouched.
    pub fn is_side_effect_free(&self) -> bool {
        matches!(
            self,
            SyncError::ValidationFailed { .. }
                | SyncError::Synthesis(_)
                | SyncError::Connection(_)
                | SyncError::MaintenanceInProgress
                | SyncError::QuiescenceAborted { .. }
                | SyncError::PhysicalRolledBack { .. }
                | SyncError::Metadata(_)
                | SyncError::Bundle(_)
                | SyncError::ModelRejected(_)
        )
    }

    /// Check if the operator must reconcile database and metadata by hand.
    pub fn requires_intervention(&self) -> bool {
        matches!(
            self,
            SyncError::PhysicalPartial { .. }
                | SyncError::MetadataAfterPhysical { .. }
                | SyncError::ReloadAfterCommit { .. }
        )
    }

    /// The apply result, for failures raised after the metadata commit.
    pub fn committed_outcome(&self) -> Option<&ApplyOutcome> {
        match self {
            SyncError::ReloadAfterCommit { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_error() -> DialectError {
        DialectError::Execution {
            statement: "DROP TABLE \"X\"".into(),
            message: "no such table".into(),
        }
    }

    #[test]
    fn test_side_effect_classification() {
        let rolled_back = SyncError::PhysicalRolledBack {
            index: 2,
            source: engine_error(),
        };
        assert!(rolled_back.is_side_effect_free());
        assert!(!rolled_back.requires_intervention());

        let partial = SyncError::PhysicalPartial {
            executed: 1,
            total: 3,
            source: engine_error(),
        };
        assert!(!partial.is_side_effect_free());
        assert!(partial.requires_intervention());
        assert!(partial.to_string().contains("1 of 3"));

        let after = SyncError::MetadataAfterPhysical {
            source: crate::error::Error::Transaction("aborted".into()),
        };
        assert!(after.requires_intervention());
        assert!(after.committed_outcome().is_none());
    }

    #[test]
    fn test_reload_failure_keeps_outcome() {
        let err = SyncError::ReloadAfterCommit {
            outcome: Box::new(ApplyOutcome {
                statements_executed: 2,
                rows_written: 5,
                ..ApplyOutcome::default()
            }),
            source: ModelError::NoTask,
        };
        assert!(!err.is_side_effect_free());
        assert!(err.requires_intervention());
        assert_eq!(err.committed_outcome().map(|o| o.rows_written), Some(5));

        let rejected = SyncError::ModelRejected(ModelError::NoTask);
        assert!(rejected.is_side_effect_free());
        assert!(!rejected.requires_intervention());
    }

    #[test]
    fn test_validation_message() {
        let err = SyncError::ValidationFailed {
            count: 2,
            message: "a\nb".into(),
        };
        assert_eq!(err.to_string(), "migration blocked by 2 conflict(s):\na\nb");
    }
}
