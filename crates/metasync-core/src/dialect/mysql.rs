//! MySQL adapter (DDL synthesis only).

use super::{
    default_literal, text_size, ColumnDef, ConnectParams, DbConnection, Dialect, DialectError,
    DialectKind,
};
use crate::metadata::DataType;

/// MySQL: auto-increment keys, implicit commits on DDL, backtick quoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn connect(&self, _params: &ConnectParams) -> Result<Box<dyn DbConnection>, DialectError> {
        Err(DialectError::DriverUnavailable(self.kind()))
    }

    fn literal_case(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    fn column_type(&self, data_type: u8, size: u32) -> Result<String, DialectError> {
        Ok(match DataType::from_tag(data_type) {
            Some(DataType::Text | DataType::File | DataType::Image) => {
                format!("VARCHAR({})", text_size(size))
            }
            Some(DataType::Integer | DataType::Boolean) => "INT".into(),
            Some(DataType::Float) => "DOUBLE".into(),
            Some(DataType::Currency) => "DECIMAL(20, 4)".into(),
            Some(DataType::Date) => "DATE".into(),
            Some(DataType::DateTime) => "DATETIME".into(),
            Some(DataType::LongText | DataType::Keys) => "LONGTEXT".into(),
            None => {
                return Err(DialectError::UnmappedType {
                    kind: self.kind(),
                    tag: data_type,
                })
            }
        })
    }

    fn supports_generators(&self) -> bool {
        false
    }

    fn supports_ddl_rollback(&self) -> bool {
        false
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn column_sql(&self, column: &ColumnDef) -> Result<String, DialectError> {
        let mut sql = format!(
            "{} {}",
            self.quote(&column.name),
            self.column_type(column.data_type, column.size)?
        );
        if column.primary_key {
            sql.push_str(" NOT NULL AUTO_INCREMENT PRIMARY KEY");
        } else if let Some(default) = default_literal(column) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        Ok(sql)
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!("RENAME TABLE {} TO {}", self.quote(from), self.quote(to))
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        format!("DROP INDEX {} ON {}", self.quote(name), self.quote(table))
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote(table),
            self.quote(name)
        )
    }
}
