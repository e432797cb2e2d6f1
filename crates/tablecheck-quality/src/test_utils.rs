//! Test Utilities Module
//!
//! Shared fixtures for exercising the quality engine. Enable via the
//! `test-utils` feature from other crates.
//!
//! - `TestWarehouse`: a temporary SQLite database standing in for the warehouse
//! - `ScriptedConnection`: a Snowflake-dialect connection answering from a
//!   script, for catalog paths SQLite cannot reach

use std::path::PathBuf;
use tablecheck_core::navigation::TableForm;
use tablecheck_core::{Result, SessionContext, TableCheckError, Value};
use tablecheck_warehouse::dialect::SQLITE_SCHEMA;
use tablecheck_warehouse::{Dialect, ResultSet, SnowflakeDialect, WarehouseConnection};
use tempfile::TempDir;

/// The CUSTOMERS table: one null EMAIL, and Bob/BOB duplicated ignoring case
pub const CUSTOMERS_SQL: &str = "
    CREATE TABLE CUSTOMERS (ID INTEGER PRIMARY KEY, NAME TEXT, EMAIL TEXT);
    INSERT INTO CUSTOMERS VALUES (1, 'Ann', NULL);
    INSERT INTO CUSTOMERS VALUES (2, 'Bob', 'bob@x');
    INSERT INTO CUSTOMERS VALUES (3, 'BOB', 'BOB@X');
";

/// Temporary SQLite warehouse, removed on drop
pub struct TestWarehouse {
    _dir: TempDir,
    path: PathBuf,
}

impl TestWarehouse {
    /// Empty database file
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()
            .map_err(|e| TableCheckError::Connection(format!("tempdir: {}", e)))?;
        let path = dir.path().join("warehouse.db");
        rusqlite::Connection::open(&path).map_err(sql_error)?;
        Ok(Self { _dir: dir, path })
    }

    /// Database seeded with the CUSTOMERS table
    pub fn customers() -> Result<Self> {
        let warehouse = Self::new()?;
        warehouse.execute_batch(CUSTOMERS_SQL)?;
        Ok(warehouse)
    }

    pub fn path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Run setup SQL directly against the file.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.open()?.execute_batch(sql).map_err(sql_error)
    }

    /// Direct connection for assertions
    pub fn open(&self) -> Result<rusqlite::Connection> {
        rusqlite::Connection::open(&self.path).map_err(sql_error)
    }

    /// Integer values of one column, ordered by that column.
    pub fn ids(&self, table: &str, column: &str) -> Result<Vec<i64>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT \"{c}\" FROM \"{t}\" ORDER BY \"{c}\"",
                c = column,
                t = table
            ))
            .map_err(sql_error)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(sql_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_error)?;
        Ok(ids)
    }

    /// Input form pointing at `table` in this database
    pub fn form(&self, table: &str) -> TableForm {
        TableForm {
            warehouse: "LOCAL".to_string(),
            database: self.path(),
            schema: SQLITE_SCHEMA.to_string(),
            table: table.to_string(),
        }
    }

    /// Loaded session context for `table` with `identifier` confirmed
    pub fn context(&self, table: &str, columns: &[&str], identifier: &str) -> SessionContext {
        let form = self.form(table);
        SessionContext {
            warehouse: form.warehouse,
            database: form.database,
            schema: form.schema,
            table: form.table,
            identifier_column: Some(identifier.to_string()),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            loaded: true,
        }
    }
}

fn sql_error(e: rusqlite::Error) -> TableCheckError {
    TableCheckError::Query(e.to_string())
}

enum Reply {
    Rows(ResultSet),
    Affected(u64),
    Fail(String),
}

/// Connection that answers by matching SQL text against a script.
///
/// The first entry whose pattern occurs in the SQL wins. Unscripted SQL is a
/// query error. Every statement is recorded in `log`.
pub struct ScriptedConnection {
    dialect: &'static dyn Dialect,
    script: Vec<(String, Reply)>,
    pub log: Vec<(String, Vec<Value>)>,
}

impl ScriptedConnection {
    pub fn snowflake() -> Self {
        Self {
            dialect: &SnowflakeDialect,
            script: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn respond(mut self, pattern: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let rs = ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        };
        self.script.push((pattern.to_string(), Reply::Rows(rs)));
        self
    }

    pub fn affect(mut self, pattern: &str, rows: u64) -> Self {
        self.script
            .push((pattern.to_string(), Reply::Affected(rows)));
        self
    }

    pub fn fail(mut self, pattern: &str, message: &str) -> Self {
        self.script
            .push((pattern.to_string(), Reply::Fail(message.to_string())));
        self
    }

    fn reply(&mut self, sql: &str, params: &[Value]) -> Result<&Reply> {
        self.log.push((sql.to_string(), params.to_vec()));
        self.script
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, reply)| reply)
            .ok_or_else(|| TableCheckError::Query(format!("unscripted SQL: {}", sql)))
    }
}

impl WarehouseConnection for ScriptedConnection {
    fn dialect(&self) -> &dyn Dialect {
        self.dialect
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        match self.reply(sql, params)? {
            Reply::Rows(rs) => Ok(rs.clone()),
            Reply::Affected(_) => Ok(ResultSet::default()),
            Reply::Fail(msg) => Err(TableCheckError::Query(msg.clone())),
        }
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        match self.reply(sql, params)? {
            Reply::Affected(n) => Ok(*n),
            Reply::Rows(rs) => Ok(rs.rows.len() as u64),
            Reply::Fail(msg) => Err(TableCheckError::Query(msg.clone())),
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
