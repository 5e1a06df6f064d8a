//! Global settings and task registration rows.

use serde::{Deserialize, Serialize};

use super::record::{MetaRecord, MetaTable};
use crate::dialect::{ConnectParams, DialectKind};

/// Identifier of the single settings row.
pub const SETTINGS_ID: i64 = 1;

/// Identifier of the single task registration row.
pub const TASK_REGISTRATION_ID: i64 = 1;

/// The global settings row.
///
/// Settings are read into a fresh value on every apply and reload; nothing
/// mutates a loaded instance in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub id: i64,
    /// Safe mode requires authentication. Never copied from an import.
    #[serde(default)]
    pub safe_mode: bool,
    /// Debug output. Never copied from an import.
    #[serde(default)]
    pub debugging: bool,
    /// Application version label.
    #[serde(default)]
    pub version: String,
    /// Interface language identifier.
    #[serde(default = "default_language")]
    pub language: i64,
    /// Session timeout in seconds (0 disables).
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub ignore_change_ip: bool,
    #[serde(default)]
    pub compressed_js: bool,
    #[serde(default)]
    pub single_file_js: bool,
    /// Item used to store change history.
    #[serde(default)]
    pub history_item: Option<i64>,
    /// Item used to store record locks.
    #[serde(default)]
    pub lock_item: Option<i64>,
    /// Last allocated field identifier.
    #[serde(default)]
    pub field_id_gen: i64,
    #[serde(default)]
    pub deleted: bool,
}

fn default_language() -> i64 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: SETTINGS_ID,
            safe_mode: false,
            debugging: false,
            version: String::new(),
            language: default_language(),
            timeout: 0,
            ignore_change_ip: false,
            compressed_js: false,
            single_file_js: false,
            history_item: None,
            lock_item: None,
            field_id_gen: 0,
            deleted: false,
        }
    }
}

/// Side effects implied by a settings change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsEffects {
    /// Generated client assets are stale.
    pub client_modified: bool,
    /// Server modules are stale.
    pub server_modified: bool,
    /// Existing user sessions must be dropped.
    pub reset_sessions: bool,
}

impl Settings {
    /// Effects of replacing `self` with `next`.
    pub fn effects_of(&self, next: &Settings) -> SettingsEffects {
        let mut effects = SettingsEffects::default();
        if self.compressed_js != next.compressed_js {
            effects.client_modified = true;
        }
        if self.single_file_js != next.single_file_js {
            effects.client_modified = true;
            effects.server_modified = true;
        }
        if self.safe_mode != next.safe_mode {
            effects.reset_sessions = true;
        }
        effects
    }
}

impl MetaRecord for Settings {
    const TABLE: MetaTable = MetaTable::Params;

    fn id(&self) -> i64 {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn same_content(&self, other: &Self) -> bool {
        *self == self.adopt(other)
    }

    fn adopt(&self, incoming: &Self) -> Self {
        // the field id generator never moves backwards
        Self {
            safe_mode: self.safe_mode,
            debugging: self.debugging,
            field_id_gen: self.field_id_gen.max(incoming.field_id_gen),
            ..incoming.clone()
        }
    }
}

/// Registration of the task and its backing database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRegistration {
    pub id: i64,
    /// Item identifier of the task node.
    pub task_item: i64,
    pub dialect: DialectKind,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub encoding: String,
    #[serde(default)]
    pub deleted: bool,
}

impl TaskRegistration {
    /// Register a task backed by the given database.
    pub fn new(task_item: i64, dialect: DialectKind, database: impl Into<String>) -> Self {
        Self {
            id: TASK_REGISTRATION_ID,
            task_item,
            dialect,
            database: database.into(),
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: None,
            encoding: String::new(),
            deleted: false,
        }
    }

    /// Connection parameters for the backing database.
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            host: self.host.clone(),
            port: self.port,
            encoding: self.encoding.clone(),
        }
    }
}

impl MetaRecord for TaskRegistration {
    const TABLE: MetaTable = MetaTable::Tasks;

    fn id(&self) -> i64 {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
