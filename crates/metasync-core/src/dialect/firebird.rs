//! Firebird adapter (DDL synthesis only).

use super::{
    default_literal, text_size, ColumnDef, ConnectParams, DbConnection, Dialect, DialectError,
    DialectKind,
};
use crate::metadata::DataType;

/// Firebird: generators, non-transactional DDL, `ADD`/`DROP` without the
/// `COLUMN` keyword.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirebirdDialect;

impl Dialect for FirebirdDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Firebird
    }

    fn connect(&self, _params: &ConnectParams) -> Result<Box<dyn DbConnection>, DialectError> {
        Err(DialectError::DriverUnavailable(self.kind()))
    }

    fn literal_case(&self, identifier: &str) -> String {
        identifier.to_uppercase()
    }

    fn column_type(&self, data_type: u8, size: u32) -> Result<String, DialectError> {
        Ok(match DataType::from_tag(data_type) {
            Some(DataType::Text | DataType::File | DataType::Image) => {
                format!("VARCHAR({})", text_size(size))
            }
            Some(DataType::Integer | DataType::Boolean) => "INTEGER".into(),
            Some(DataType::Float) => "DOUBLE PRECISION".into(),
            Some(DataType::Currency) => "DECIMAL(18, 4)".into(),
            Some(DataType::Date) => "DATE".into(),
            Some(DataType::DateTime) => "TIMESTAMP".into(),
            Some(DataType::LongText | DataType::Keys) => "BLOB SUB_TYPE 1".into(),
            None => {
                return Err(DialectError::UnmappedType {
                    kind: self.kind(),
                    tag: data_type,
                })
            }
        })
    }

    fn supports_generators(&self) -> bool {
        true
    }

    fn supports_ddl_rollback(&self) -> bool {
        false
    }

    // DEFAULT must precede NOT NULL in Firebird column definitions
    fn column_sql(&self, column: &ColumnDef) -> Result<String, DialectError> {
        let mut sql = format!(
            "{} {}",
            self.quote(&column.name),
            self.column_type(column.data_type, column.size)?
        );
        if let Some(default) = default_literal(column) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        if column.primary_key {
            sql.push_str(" NOT NULL PRIMARY KEY");
        }
        Ok(sql)
    }

    fn create_generator(&self, name: &str) -> Option<String> {
        Some(format!("CREATE GENERATOR {}", self.quote(name)))
    }

    fn drop_generator(&self, name: &str) -> Option<String> {
        Some(format!("DROP GENERATOR {}", self.quote(name)))
    }

    fn add_column(&self, table: &str, column: &ColumnDef) -> Result<String, DialectError> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote(table),
            self.column_sql(column)?
        ))
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} DROP {}", self.quote(table), self.quote(column))
    }

    fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} TO {}",
            self.quote(table),
            self.quote(from),
            self.quote(to)
        )
    }
}
