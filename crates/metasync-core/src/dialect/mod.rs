//! Dialect adapters for the backing databases.
//!
//! A [`Dialect`] describes what a database engine can do (generators, DDL
//! rollback, inline foreign keys, dropping columns) and renders the DDL
//! strings the synthesizer emits. A [`DbConnection`] is the narrow
//! connection surface the apply pipeline needs: execute a statement,
//! control a transaction and introspect tables.

mod connection;
mod firebird;
mod mysql;
mod postgres;
mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::DataType;

pub use connection::{ColumnInfo, ConnectParams, DbConnection};
pub use firebird::FirebirdDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::{SqliteConnection, SqliteDialect};

/// Text size used when a text field declares none.
pub const DEFAULT_TEXT_SIZE: u32 = 255;

/// Errors raised by dialect adapters and their connections.
#[derive(Debug, Error)]
pub enum DialectError {
    /// The database could not be opened.
    #[error("cannot connect to {kind} database: {message}")]
    Connection {
        /// Dialect of the database.
        kind: DialectKind,
        /// Engine error text.
        message: String,
    },

    /// A statement failed.
    #[error("{message} (statement: {statement})")]
    Execution {
        /// The failing statement.
        statement: String,
        /// Engine error text.
        message: String,
    },

    /// A data type tag has no column type in the dialect.
    #[error("data type {tag} has no {kind} column type")]
    UnmappedType {
        /// Dialect of the database.
        kind: DialectKind,
        /// The unmapped tag.
        tag: u8,
    },

    /// This build carries no driver for the dialect.
    #[error("no {0} driver is available in this build")]
    DriverUnavailable(DialectKind),
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Sqlite,
    Postgres,
    Firebird,
    #[serde(rename = "mysql")]
    MySql,
}

impl DialectKind {
    /// All known dialects.
    pub const ALL: [DialectKind; 4] = [
        DialectKind::Sqlite,
        DialectKind::Postgres,
        DialectKind::Firebird,
        DialectKind::MySql,
    ];

    /// The adapter for this dialect.
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Sqlite => &SqliteDialect,
            DialectKind::Postgres => &PostgresDialect,
            DialectKind::Firebird => &FirebirdDialect,
            DialectKind::MySql => &MySqlDialect,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            DialectKind::Sqlite => "sqlite",
            DialectKind::Postgres => "postgres",
            DialectKind::Firebird => "firebird",
            DialectKind::MySql => "mysql",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DialectKind::Sqlite),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "firebird" => Ok(DialectKind::Firebird),
            "mysql" => Ok(DialectKind::MySql),
            other => Err(format!("unknown dialect: {other}")),
        }
    }
}

/// A physical column as rendered into DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Field the column belongs to.
    pub field_id: i64,
    /// Physical column name.
    pub name: String,
    /// Data type tag.
    pub data_type: u8,
    /// Declared size.
    pub size: u32,
    /// Default value literal.
    pub default_value: Option<String>,
    /// The column is the primary key.
    pub primary_key: bool,
}

/// An index as rendered into DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub unique: bool,
    /// Columns with their descending flag.
    pub columns: Vec<(String, bool)>,
}

/// A foreign-key constraint as rendered into DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub table: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// Capabilities and DDL syntax of one database engine.
pub trait Dialect: Send + Sync {
    /// The dialect identifier.
    fn kind(&self) -> DialectKind;

    /// Open a dedicated connection.
    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DbConnection>, DialectError>;

    /// Normalize an identifier to the engine's preferred case.
    fn literal_case(&self, identifier: &str) -> String;

    /// Map a data type tag and size to a column type.
    fn column_type(&self, data_type: u8, size: u32) -> Result<String, DialectError>;

    /// Surrogate keys need a generator (sequence) object.
    fn supports_generators(&self) -> bool;

    /// DDL statements can be rolled back inside a transaction.
    fn supports_ddl_rollback(&self) -> bool;

    /// Foreign keys can be added to an existing table.
    fn supports_inline_foreign_keys(&self) -> bool {
        true
    }

    /// `ALTER TABLE ... DROP COLUMN` is available.
    fn supports_drop_column(&self) -> bool {
        true
    }

    /// Quote an identifier.
    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Render a column definition.
    fn column_sql(&self, column: &ColumnDef) -> Result<String, DialectError> {
        let mut sql = format!(
            "{} {}",
            self.quote(&column.name),
            self.column_type(column.data_type, column.size)?
        );
        if column.primary_key {
            sql.push_str(" NOT NULL PRIMARY KEY");
        }
        if let Some(default) = default_literal(column) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        Ok(sql)
    }

    /// `CREATE TABLE` with all columns.
    fn create_table(&self, table: &str, columns: &[ColumnDef]) -> Result<String, DialectError> {
        let columns = columns
            .iter()
            .map(|c| self.column_sql(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!(
            "CREATE TABLE {} ({})",
            self.quote(table),
            columns.join(", ")
        ))
    }

    /// `DROP TABLE`.
    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote(table))
    }

    /// Rename a table.
    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote(from),
            self.quote(to)
        )
    }

    /// Create the generator for a table's surrogate key.
    fn create_generator(&self, name: &str) -> Option<String> {
        self.supports_generators()
            .then(|| format!("CREATE SEQUENCE {}", self.quote(name)))
    }

    /// Drop a generator.
    fn drop_generator(&self, name: &str) -> Option<String> {
        self.supports_generators()
            .then(|| format!("DROP SEQUENCE {}", self.quote(name)))
    }

    /// Add a column.
    fn add_column(&self, table: &str, column: &ColumnDef) -> Result<String, DialectError> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote(table),
            self.column_sql(column)?
        ))
    }

    /// Drop a column.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        )
    }

    /// Rename a column.
    fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote(table),
            self.quote(from),
            self.quote(to)
        )
    }

    /// Create an index.
    fn create_index(&self, index: &IndexDef) -> String {
        let columns = index
            .columns
            .iter()
            .map(|(name, desc)| {
                if *desc {
                    format!("{} DESC", self.quote(name))
                } else {
                    self.quote(name)
                }
            })
            .collect::<Vec<_>>();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote(&index.name),
            self.quote(&index.table),
            columns.join(", ")
        )
    }

    /// Drop an index.
    fn drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.quote(name))
    }

    /// Add a foreign-key constraint.
    fn add_foreign_key(&self, fk: &ForeignKeyDef) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote(&fk.table),
            self.quote(&fk.name),
            self.quote(&fk.column),
            self.quote(&fk.ref_table),
            self.quote(&fk.ref_column)
        )
    }

    /// Drop a foreign-key constraint.
    fn drop_foreign_key(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote(table),
            self.quote(name)
        )
    }
}

/// Render the default value of a column as an SQL literal.
///
/// Numbers pass through, booleans become 0/1, everything else is a quoted
/// string.
pub fn default_literal(column: &ColumnDef) -> Option<String> {
    let value = column.default_value.as_deref()?.trim();
    if value.is_empty() {
        return None;
    }
    match DataType::from_tag(column.data_type) {
        Some(DataType::Boolean) => Some(
            match value.to_ascii_lowercase().as_str() {
                "true" | "1" => "1",
                _ => "0",
            }
            .to_string(),
        ),
        Some(dt) if dt.is_numeric() && value.parse::<f64>().is_ok() => Some(value.to_string()),
        _ => Some(format!("'{}'", value.replace('\'', "''"))),
    }
}

/// Text size, falling back to [`DEFAULT_TEXT_SIZE`].
pub(crate) fn text_size(size: u32) -> u32 {
    if size == 0 {
        DEFAULT_TEXT_SIZE
    } else {
        size
    }
}

/// Split `VARCHAR(30)` style type names into name and size.
pub(crate) fn split_type_size(type_name: &str) -> (String, Option<u32>) {
    match type_name.find('(') {
        Some(open) => {
            let size = type_name[open + 1..]
                .trim_end_matches(')')
                .split(',')
                .next()
                .and_then(|s| s.trim().parse().ok());
            (type_name[..open].trim().to_string(), size)
        }
        None => (type_name.trim().to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(name: &str, data_type: DataType, size: u32) -> ColumnDef {
        ColumnDef {
            field_id: 1,
            name: name.into(),
            data_type: data_type.tag(),
            size,
            default_value: None,
            primary_key: false,
        }
    }

    #[test]
    fn test_dialect_kind_parse() {
        assert_eq!("PostgreSQL".parse::<DialectKind>(), Ok(DialectKind::Postgres));
        assert_eq!("mysql".parse::<DialectKind>(), Ok(DialectKind::MySql));
        assert!("oracle".parse::<DialectKind>().is_err());
        for kind in DialectKind::ALL {
            assert_eq!(kind.dialect().kind(), kind);
        }
    }

    #[test]
    fn test_default_literals() {
        let mut c = column("FLAG", DataType::Boolean, 0);
        c.default_value = Some("true".into());
        assert_eq!(default_literal(&c), Some("1".into()));

        let mut c = column("QTY", DataType::Integer, 0);
        c.default_value = Some("5".into());
        assert_eq!(default_literal(&c), Some("5".into()));

        let mut c = column("NAME", DataType::Text, 10);
        c.default_value = Some("O'Neil".into());
        assert_eq!(default_literal(&c), Some("'O''Neil'".into()));

        c.default_value = Some("  ".into());
        assert_eq!(default_literal(&c), None);
    }

    #[test]
    fn test_split_type_size() {
        assert_eq!(split_type_size("VARCHAR(30)"), ("VARCHAR".into(), Some(30)));
        assert_eq!(split_type_size("NUMERIC(18, 4)"), ("NUMERIC".into(), Some(18)));
        assert_eq!(split_type_size("INTEGER"), ("INTEGER".into(), None));
    }

    #[test]
    fn test_default_rendering() {
        let d = DialectKind::Postgres.dialect();
        let mut pk = column("ID", DataType::Integer, 0);
        pk.primary_key = true;
        let sql = d
            .create_table("orders", &[pk, column("NAME", DataType::Text, 30)])
            .unwrap();
        assert_eq!(
            sql,
            r#"CREATE TABLE "orders" ("ID" INTEGER NOT NULL PRIMARY KEY, "NAME" VARCHAR(30))"#
        );

        let index = IndexDef {
            name: "IX1".into(),
            table: "orders".into(),
            unique: true,
            columns: vec![("NAME".into(), false), ("ID".into(), true)],
        };
        assert_eq!(
            d.create_index(&index),
            r#"CREATE UNIQUE INDEX "IX1" ON "orders" ("NAME", "ID" DESC)"#
        );
    }
}
