//! Metadata repository.
//!
//! Application structure lives as rows in a fixed set of system tables:
//! items, fields, indices, filters, report parameters, roles, privileges,
//! lookup lists, the global settings row and the task registration. This
//! module provides the typed rows, owned snapshots of the tables and their
//! sled-backed storage.

mod access;
mod batch;
mod field;
mod filter;
mod index;
mod item;
mod record;
mod repository;
mod session;
mod settings;
mod snapshot;
mod types;
pub mod usage;

pub use access::{LookupListRecord, PrivilegeRecord, RoleRecord};
pub use batch::{WriteBatch, WriteOp};
pub use field::FieldRecord;
pub use filter::{FilterRecord, ReportParamRecord};
pub use index::{IndexField, IndexRecord};
pub use item::{ItemRecord, OrderField};
pub use record::{decode_record, encode_record, record_key, MetaRecord, MetaTable};
pub use repository::MetadataRepository;
pub use session::EditSession;
pub use settings::{
    Settings, SettingsEffects, TaskRegistration, SETTINGS_ID, TASK_REGISTRATION_ID,
};
pub use snapshot::{RecordSet, Snapshot, SnapshotRecord};
pub use types::{Alignment, DataType, ItemKind};
