//! metasync core - metadata-driven schema synchronization.
//!
//! Applications are described by rows in a metadata repository. This crate
//! diffs two snapshots of that metadata, validates the change, renders the
//! DDL for the backing database, applies both sides in order and reloads
//! the running application without restarting it.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod apply;
pub mod bundle;
pub mod config;
pub mod ddl;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod metadata;
pub mod reload;
pub mod sync;
pub mod validate;

pub use apply::{ApplyOutcome, ApplyPipeline, Plan, ProgressLog, Stage, SyncError};
pub use config::{QuiescencePolicy, SyncConfig, TimeoutAction};
pub use ddl::{synthesize, DdlScript, Phase, SynthesisError};
pub use dialect::{ConnectParams, Dialect, DialectError, DialectKind};
pub use diff::{diff, Delta};
pub use error::Error;
pub use metadata::{EditSession, MetadataRepository, Snapshot};
pub use reload::{LiveApp, TaskModel};
pub use sync::{SyncReport, Synchronizer};
pub use validate::{validate, ValidationReport};
