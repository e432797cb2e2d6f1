//! Catalog SQL from the SQLite dialect, run against real database files.

use rusqlite::Connection;
use tablecheck_core::Value;
use tablecheck_warehouse::{
    connector_from_config, with_connection, BackendKind, ConnectionParams, Connector,
    SqliteConnector, TableTarget, WarehouseConfig, WarehouseConnection,
};
use tempfile::TempDir;

fn setup() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE CUSTOMERS (ID INTEGER PRIMARY KEY, NAME TEXT, EMAIL TEXT, SCORE REAL);
         INSERT INTO CUSTOMERS VALUES (1, 'Ann', NULL, 1.5);
         INSERT INTO CUSTOMERS VALUES (2, 'Bob', 'bob@x', 2.0);
         CREATE TABLE EMPTY_T (ID INTEGER);",
    )
    .unwrap();
    (dir, path.to_string_lossy().into_owned())
}

#[test]
fn test_columns_in_ordinal_order() {
    let (_dir, path) = setup();
    let connector = SqliteConnector::new();
    let target = TableTarget::new(&path, "main", "CUSTOMERS");

    let rs = with_connection(&connector, &ConnectionParams::new("", &path, "main"), |conn| {
        let stmt = conn.dialect().columns(&target)?;
        conn.run(&stmt)
    })
    .unwrap();

    let names: Vec<String> = rs.rows.iter().map(|r| r[0].to_string()).collect();
    assert_eq!(names, vec!["ID", "NAME", "EMAIL", "SCORE"]);
}

#[test]
fn test_columns_of_missing_table_are_empty() {
    let (_dir, path) = setup();
    let connector = SqliteConnector::new();
    let target = TableTarget::new(&path, "main", "NOPE");

    let rs = with_connection(&connector, &ConnectionParams::new("", &path, "main"), |conn| {
        let stmt = conn.dialect().columns(&target)?;
        conn.run(&stmt)
    })
    .unwrap();
    assert!(rs.is_empty());
}

#[test]
fn test_overview_row() {
    let (_dir, path) = setup();
    let connector = SqliteConnector::new();
    let target = TableTarget::new(&path, "main", "CUSTOMERS");

    let rs = with_connection(&connector, &ConnectionParams::new("", &path, "main"), |conn| {
        let stmt = conn.dialect().table_overview(&target)?;
        conn.run(&stmt)
    })
    .unwrap();

    assert_eq!(rs.columns.len(), 12);
    assert_eq!(rs.columns[0], "Database Name");
    assert_eq!(rs.columns[11], "Total Number of Types");
    let row = &rs.rows[0];
    assert_eq!(row[1], Value::from("main"));
    assert_eq!(row[2], Value::from("CUSTOMERS"));
    assert_eq!(row[8], Value::Null);
    assert_eq!(row[9], Value::Integer(4));
    assert_eq!(row[10], Value::Integer(2));
    assert_eq!(row[11], Value::Integer(3));
}

#[test]
fn test_column_types() {
    let (_dir, path) = setup();
    let connector = SqliteConnector::new();
    let target = TableTarget::new(&path, "main", "CUSTOMERS");

    let rs = with_connection(&connector, &ConnectionParams::new("", &path, "main"), |conn| {
        let stmt = conn.dialect().column_types(&target)?;
        conn.run(&stmt)
    })
    .unwrap();

    let pairs: Vec<(String, i64)> = rs
        .rows
        .iter()
        .map(|r| (r[0].to_string(), r[1].as_i64().unwrap()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("INTEGER".to_string(), 1),
            ("REAL".to_string(), 1),
            ("TEXT".to_string(), 2)
        ]
    );
}

#[test]
fn test_connector_from_config() {
    let config = WarehouseConfig::builder(BackendKind::Sqlite).build().unwrap();
    let connector = connector_from_config(&config).unwrap();
    assert_eq!(connector.dialect().name(), "sqlite");

    let (_dir, path) = setup();
    let count = with_connection(
        connector.as_ref(),
        &ConnectionParams::new("", &path, "main"),
        |conn| conn.query_scalar("SELECT COUNT(*) FROM EMPTY_T", &[]),
    )
    .unwrap();
    assert_eq!(count, Some(Value::Integer(0)));
}
