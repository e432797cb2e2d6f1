//! Shared fixtures for the quality integration tests
#![allow(dead_code)]

use rusqlite::Connection;
use std::path::PathBuf;
use tablecheck_core::navigation::TableForm;
use tablecheck_core::SessionContext;
use tablecheck_warehouse::dialect::SQLITE_SCHEMA;
use tablecheck_warehouse::{with_connection, ConnectionParams, SqliteConnector, WarehouseConnection};
use tempfile::TempDir;

pub const CUSTOMERS_SQL: &str = "
    CREATE TABLE CUSTOMERS (ID INTEGER PRIMARY KEY, NAME TEXT, EMAIL TEXT);
    INSERT INTO CUSTOMERS VALUES (1, 'Ann', NULL);
    INSERT INTO CUSTOMERS VALUES (2, 'Bob', 'bob@x');
    INSERT INTO CUSTOMERS VALUES (3, 'BOB', 'BOB@X');
";

pub struct Fixture {
    _dir: TempDir,
    pub path: PathBuf,
}

impl Fixture {
    pub fn with_sql(sql: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warehouse.db");
        Connection::open(&path).unwrap().execute_batch(sql).unwrap();
        Self { _dir: dir, path }
    }

    pub fn customers() -> Self {
        Self::with_sql(CUSTOMERS_SQL)
    }

    pub fn database(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn form(&self, table: &str) -> TableForm {
        TableForm {
            warehouse: "LOCAL".to_string(),
            database: self.database(),
            schema: SQLITE_SCHEMA.to_string(),
            table: table.to_string(),
        }
    }

    pub fn context(&self, table: &str, identifier: &str) -> SessionContext {
        let form = self.form(table);
        SessionContext {
            warehouse: form.warehouse,
            database: form.database,
            schema: form.schema,
            table: form.table,
            identifier_column: Some(identifier.to_string()),
            columns: Vec::new(),
            loaded: true,
        }
    }

    /// Run `f` on a gateway connection to this database.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut dyn WarehouseConnection) -> tablecheck_core::Result<T>,
    ) -> T {
        let params = ConnectionParams::new("LOCAL", self.database(), SQLITE_SCHEMA);
        with_connection(&SqliteConnector::new(), &params, f).unwrap()
    }

    pub fn query_pairs(&self, sql: &str) -> Vec<(i64, Option<String>)> {
        let conn = Connection::open(&self.path).unwrap();
        let mut stmt = conn.prepare(sql).unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    }
}
