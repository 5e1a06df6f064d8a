//! PostgreSQL adapter.

use super::{text_size, ConnectParams, DbConnection, Dialect, DialectError, DialectKind};
use crate::metadata::DataType;

/// PostgreSQL: sequences for surrogate keys and fully transactional DDL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DbConnection>, DialectError> {
        #[cfg(feature = "postgres")]
        {
            Ok(Box::new(driver::PgDdlConnection::open(params)?))
        }
        #[cfg(not(feature = "postgres"))]
        {
            let _ = params;
            Err(DialectError::DriverUnavailable(self.kind()))
        }
    }

    fn literal_case(&self, identifier: &str) -> String {
        identifier.to_lowercase()
    }

    fn column_type(&self, data_type: u8, size: u32) -> Result<String, DialectError> {
        Ok(match DataType::from_tag(data_type) {
            Some(DataType::Text | DataType::File | DataType::Image) => {
                format!("VARCHAR({})", text_size(size))
            }
            Some(DataType::Integer | DataType::Boolean) => "INTEGER".into(),
            Some(DataType::Float | DataType::Currency) => "NUMERIC".into(),
            Some(DataType::Date) => "DATE".into(),
            Some(DataType::DateTime) => "TIMESTAMP".into(),
            Some(DataType::LongText | DataType::Keys) => "TEXT".into(),
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
        true
    }
}

#[cfg(feature = "postgres")]
mod driver {
    use sqlx::postgres::{PgConnectOptions, PgConnection};
    use sqlx::{Connection, Row};
    use tokio::runtime::{Builder, Runtime};

    use super::super::{split_type_size, ColumnInfo, ConnectParams, DbConnection, DialectError};
    use super::DialectKind;

    /// A single PostgreSQL connection driven by a private runtime.
    pub struct PgDdlConnection {
        conn: PgConnection,
        rt: Runtime,
    }

    fn connection_error(e: impl ToString) -> DialectError {
        DialectError::Connection {
            kind: DialectKind::Postgres,
            message: e.to_string(),
        }
    }

    fn execution_error(sql: &str, e: sqlx::Error) -> DialectError {
        DialectError::Execution {
            statement: sql.to_string(),
            message: e.to_string(),
        }
    }

    impl PgDdlConnection {
        pub fn open(params: &ConnectParams) -> Result<Self, DialectError> {
            let rt = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(connection_error)?;

            let mut options = PgConnectOptions::new().database(&params.database);
            if !params.host.is_empty() {
                options = options.host(&params.host);
            }
            if let Some(port) = params.port {
                options = options.port(port);
            }
            if !params.user.is_empty() {
                options = options.username(&params.user);
            }
            if !params.password.is_empty() {
                options = options.password(&params.password);
            }

            let conn = rt
                .block_on(PgConnection::connect_with(&options))
                .map_err(connection_error)?;
            Ok(Self { conn, rt })
        }

        fn run(&mut self, sql: &str) -> Result<(), DialectError> {
            let conn = &mut self.conn;
            self.rt
                .block_on(async { sqlx::raw_sql(sql).execute(&mut *conn).await })
                .map(|_| ())
                .map_err(|e| execution_error(sql, e))
        }
    }

    impl DbConnection for PgDdlConnection {
        fn execute(&mut self, sql: &str) -> Result<(), DialectError> {
            self.run(sql)
        }

        fn begin(&mut self) -> Result<(), DialectError> {
            self.run("BEGIN")
        }

        fn commit(&mut self) -> Result<(), DialectError> {
            self.run("COMMIT")
        }

        fn rollback(&mut self) -> Result<(), DialectError> {
            self.run("ROLLBACK")
        }

        fn list_tables(&mut self) -> Result<Vec<String>, DialectError> {
            let sql = "SELECT table_name::text FROM information_schema.tables \
                       WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                       ORDER BY table_name";
            let conn = &mut self.conn;
            self.rt
                .block_on(async {
                    sqlx::query_scalar::<_, String>(sql)
                        .fetch_all(&mut *conn)
                        .await
                })
                .map_err(|e| execution_error(sql, e))
        }

        fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DialectError> {
            let sql = "SELECT c.column_name::text AS name, c.data_type::text AS type_name, \
                       c.character_maximum_length AS size, c.is_nullable::text AS nullable, \
                       c.column_default::text AS dflt, \
                       EXISTS (SELECT 1 FROM information_schema.key_column_usage k \
                         JOIN information_schema.table_constraints t \
                           ON t.constraint_name = k.constraint_name \
                          AND t.table_name = k.table_name \
                         WHERE t.constraint_type = 'PRIMARY KEY' \
                           AND k.table_name = c.table_name \
                           AND k.column_name = c.column_name) AS pk \
                       FROM information_schema.columns c \
                       WHERE c.table_schema = 'public' AND c.table_name = $1 \
                       ORDER BY c.ordinal_position";
            let conn = &mut self.conn;
            let rows = self
                .rt
                .block_on(async { sqlx::query(sql).bind(table).fetch_all(&mut *conn).await })
                .map_err(|e| execution_error(sql, e))?;

            rows.iter()
                .map(|row| {
                    let type_name: String = row.try_get("type_name")?;
                    let size: Option<i32> = row.try_get("size")?;
                    let nullable: String = row.try_get("nullable")?;
                    Ok(ColumnInfo {
                        name: row.try_get("name")?,
                        type_name: split_type_size(&type_name).0,
                        size: size.and_then(|s| u32::try_from(s).ok()),
                        nullable: nullable == "YES",
                        primary_key: row.try_get("pk")?,
                        default: row.try_get("dflt")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
                .map_err(|e| execution_error(sql, e))
        }

        fn close(self: Box<Self>) -> Result<(), DialectError> {
            let PgDdlConnection { conn, rt } = *self;
            rt.block_on(conn.close()).map_err(connection_error)
        }
    }
}
