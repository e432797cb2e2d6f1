//! SQLite backend.
//!
//! The session's `database` is the path of an existing database file.
//! `:memory:` opens an empty private database, which is only useful in tests.

use crate::{ConnectionParams, Connector, Dialect, ResultSet, SqliteDialect, WarehouseConnection};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::Path;
use tablecheck_core::{Result, TableCheckError, Value};
use tracing::debug;

/// Connector for local SQLite database files
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SqliteConnector {
    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn WarehouseConnection>> {
        let conn = if params.database == ":memory:" {
            Connection::open_in_memory()
        } else {
            // Never create a database as a side effect of a typo
            if !Path::new(&params.database).exists() {
                return Err(TableCheckError::Connection(format!(
                    "Database file not found: {}",
                    params.database
                )));
            }
            Connection::open_with_flags(
                &params.database,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(|e| {
            TableCheckError::Connection(format!("Failed to open {}: {}", params.database, e))
        })?;

        debug!(database = %params.database, "Opened SQLite connection");
        Ok(Box::new(SqliteConnection { conn }))
    }
}

/// An open SQLite session
pub struct SqliteConnection {
    conn: Connection,
}

impl WarehouseConnection for SqliteConnection {
    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        debug!(sql, params = params.len(), "SQLite query");
        let mut stmt = self.conn.prepare(sql).map_err(query_error)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .map_err(query_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let cells = (0..width)
                .map(|i| row.get_ref(i).map(from_sql))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(query_error)?;
            out.push(cells);
        }

        Ok(ResultSet {
            columns,
            rows: out,
        })
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        debug!(sql, params = params.len(), "SQLite execute");
        let affected = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(to_sql)))
            .map_err(query_error)?;
        Ok(affected as u64)
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| TableCheckError::Connection(format!("Failed to close: {}", e)))
    }
}

fn query_error(e: rusqlite::Error) -> TableCheckError {
    TableCheckError::Query(e.to_string())
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(_) | Value::Timestamp(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
