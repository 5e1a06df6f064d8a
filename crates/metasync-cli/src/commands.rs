//! Command execution.

use std::path::Path;

use metasync_core::apply::{ProgressLog, SyncError};
use metasync_core::bundle::ExtractedBundle;
use metasync_core::metadata::{MetadataRepository, Snapshot};
use metasync_core::sync::Synchronizer;
use thiserror::Error;
use tracing::debug;

use crate::config::{Args, Command};
use crate::formatter::create_formatter;

/// Errors from command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot open metadata repository {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sled::Error,
    },

    #[error(transparent)]
    Metadata(#[from] metasync_core::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The import ran and failed; carries the formatted report.
    #[error("{0}")]
    ImportFailed(String),
}

/// Run a command and return its formatted output.
pub fn run(args: Args) -> Result<String, CommandError> {
    let db = sled::open(&args.meta).map_err(|source| CommandError::Open {
        path: args.meta.display().to_string(),
        source,
    })?;
    let repo = MetadataRepository::open(&db)?;
    let sync = Synchronizer::new(&repo, args.to_config());
    let formatter = create_formatter(args.format);
    debug!(command = ?args.command, "running command");

    match &args.command {
        Command::Export { output, .. } => {
            let summary = sync.export_bundle(output)?;
            Ok(formatter.format_export(&summary))
        }
        Command::Import { bundle, .. } => {
            let report = sync.import_bundle(bundle, None);
            repo.flush()?;
            let output = formatter.format_report(&report);
            if report.success {
                Ok(output)
            } else {
                Err(CommandError::ImportFailed(output))
            }
        }
        Command::Plan { bundle } => {
            let new = read_bundle(bundle)?;
            let mut log = ProgressLog::new();
            let plan = sync.plan(new, &mut log)?;
            Ok(formatter.format_plan(&plan))
        }
        Command::Tables => {
            let tables = sync.unregistered_tables()?;
            Ok(formatter.format_tables(&tables))
        }
        Command::Describe { table } => {
            let columns = sync.describe_table(table)?;
            Ok(formatter.format_columns(table, &columns))
        }
    }
}

fn read_bundle(path: &Path) -> Result<Snapshot, CommandError> {
    let bundle = ExtractedBundle::open(path)?;
    let mut snapshot = bundle.document().clone().into_snapshot()?;
    snapshot.purge_deleted();
    Ok(snapshot)
}
