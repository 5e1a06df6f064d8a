//! SQLite adapter.

use rusqlite::Connection;
use tracing::debug;

use super::{
    split_type_size, ColumnInfo, ConnectParams, DbConnection, Dialect, DialectError, DialectKind,
};
use crate::metadata::DataType;

/// SQLite: no generators, transactional DDL, no `ADD CONSTRAINT` and no
/// reliable `DROP COLUMN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DbConnection>, DialectError> {
        Ok(Box::new(SqliteConnection::open(&params.database)?))
    }

    fn literal_case(&self, identifier: &str) -> String {
        identifier.to_uppercase()
    }

    fn column_type(&self, data_type: u8, _size: u32) -> Result<String, DialectError> {
        let name = match DataType::from_tag(data_type) {
            Some(DataType::Integer | DataType::Boolean) => "INTEGER",
            Some(DataType::Float | DataType::Currency) => "REAL",
            Some(
                DataType::Text
                | DataType::LongText
                | DataType::Date
                | DataType::DateTime
                | DataType::Keys
                | DataType::File
                | DataType::Image,
            ) => "TEXT",
            None => {
                return Err(DialectError::UnmappedType {
                    kind: self.kind(),
                    tag: data_type,
                })
            }
        };
        Ok(name.to_string())
    }

    fn supports_generators(&self) -> bool {
        false
    }

    fn supports_ddl_rollback(&self) -> bool {
        true
    }

    fn supports_inline_foreign_keys(&self) -> bool {
        false
    }

    fn supports_drop_column(&self) -> bool {
        false
    }
}

/// A connection to an SQLite database file.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// Open (or create) the database file.
    pub fn open(path: &str) -> Result<Self, DialectError> {
        let conn = Connection::open(path).map_err(|e| DialectError::Connection {
            kind: DialectKind::Sqlite,
            message: e.to_string(),
        })?;
        debug!(path, "sqlite connection opened");
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DialectError> {
        Self::open(":memory:")
    }

    fn batch(&self, sql: &str) -> Result<(), DialectError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| execution_error(sql, e))
    }
}

fn execution_error(sql: &str, e: rusqlite::Error) -> DialectError {
    DialectError::Execution {
        statement: sql.to_string(),
        message: e.to_string(),
    }
}

impl DbConnection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> Result<(), DialectError> {
        self.batch(sql)
    }

    fn begin(&mut self) -> Result<(), DialectError> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> Result<(), DialectError> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DialectError> {
        self.batch("ROLLBACK")
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DialectError> {
        let sql = "SELECT name FROM sqlite_master \
                   WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| execution_error(sql, e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| execution_error(sql, e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| execution_error(sql, e))
    }

    fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DialectError> {
        let sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| execution_error(&sql, e))?;
        let rows = stmt
            .query_map([], |row| {
                let type_name: String = row.get(2)?;
                let (type_name, size) = split_type_size(&type_name);
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    type_name,
                    size,
                    nullable: row.get::<_, i64>(3)? == 0,
                    default: row.get(4)?,
                    primary_key: row.get::<_, i64>(5)? > 0,
                })
            })
            .map_err(|e| execution_error(&sql, e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| execution_error(&sql, e))
    }

    fn close(self: Box<Self>) -> Result<(), DialectError> {
        self.conn
            .close()
            .map_err(|(_, e)| DialectError::Connection {
                kind: DialectKind::Sqlite,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        let d = SqliteDialect;
        assert_eq!(d.column_type(DataType::Currency.tag(), 10).unwrap(), "REAL");
        assert_eq!(d.column_type(DataType::Text.tag(), 10).unwrap(), "TEXT");
        assert!(matches!(
            d.column_type(42, 0),
            Err(DialectError::UnmappedType { tag: 42, .. })
        ));
        assert_eq!(d.literal_case("orders"), "ORDERS");
    }

    #[test]
    fn test_describe_and_list() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute(
            r#"CREATE TABLE "ORDERS" ("ID" INTEGER NOT NULL PRIMARY KEY, "NAME" VARCHAR(30) DEFAULT 'x')"#,
        )
        .unwrap();
        conn.execute(r#"CREATE TABLE "A_FIRST" ("ID" INTEGER)"#).unwrap();

        assert_eq!(conn.list_tables().unwrap(), vec!["A_FIRST", "ORDERS"]);

        let columns = conn.describe_table("ORDERS").unwrap();
        assert_eq!(columns.len(), 2);
        assert!(columns[0].primary_key);
        assert_eq!(columns[1].type_name, "VARCHAR");
        assert_eq!(columns[1].size, Some(30));
        assert_eq!(columns[1].default.as_deref(), Some("'x'"));
    }

    #[test]
    fn test_rollback_discards_ddl() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.begin().unwrap();
        conn.execute(r#"CREATE TABLE "T" ("ID" INTEGER)"#).unwrap();
        conn.rollback().unwrap();
        assert!(conn.list_tables().unwrap().is_empty());

        let err = conn.execute("CREATE TABLE broken (").unwrap_err();
        assert!(matches!(err, DialectError::Execution { .. }));
    }
}
