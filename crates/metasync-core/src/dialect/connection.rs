//! Connection surface used by the apply pipeline.

use serde::{Deserialize, Serialize};

use super::DialectError;

/// Parameters needed to open a database connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    /// Database name, or file path for file-based engines.
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
}

impl ConnectParams {
    /// Parameters for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            database: path.into(),
            ..Self::default()
        }
    }
}

/// A column reported by table introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine type name without size.
    pub type_name: String,
    pub size: Option<u32>,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: Option<String>,
}

/// A dedicated connection to the backing database.
///
/// Connections used for DDL are opened by the apply pipeline, used for one
/// migration and closed; they are never shared with request handling.
pub trait DbConnection: Send {
    /// Execute one statement.
    fn execute(&mut self, sql: &str) -> Result<(), DialectError>;

    /// Start a transaction.
    fn begin(&mut self) -> Result<(), DialectError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), DialectError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), DialectError>;

    /// Names of all user tables.
    fn list_tables(&mut self) -> Result<Vec<String>, DialectError>;

    /// Columns of a table, in declaration order.
    fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DialectError>;

    /// Close the connection.
    fn close(self: Box<Self>) -> Result<(), DialectError>;
}
