//! Outlier detection against a real SQLite warehouse

mod common;

use common::Fixture;
use tablecheck_core::{ObservationTag, Value};
use tablecheck_quality::outliers::detect;

#[test]
fn test_customers_scenario() {
    let fx = Fixture::customers();
    let ctx = fx.context("CUSTOMERS", "ID");

    let report = fx.with_conn(|conn| detect(conn, &ctx)).expect("report");
    let kpis = &report.kpis;
    assert_eq!(kpis.total_rows, 3);
    assert_eq!(kpis.total_nulls, 1);
    assert_eq!(kpis.duplicate_count, 2);
    assert!((kpis.duplicate_percentage - 66.67).abs() < 0.01);
    assert_eq!(kpis.top_null_column, "EMAIL");

    let rows = &report.observations.rows;
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter().map(|r| r.observation).collect::<Vec<_>>(),
        vec![
            ObservationTag::Null,
            ObservationTag::Duplicated,
            ObservationTag::Duplicated
        ]
    );
    assert_eq!(rows[0].key, Value::Integer(1));
    assert_eq!(rows[0].cells[2], Value::Null);
    assert_eq!(
        rows.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(report.observations.columns, vec!["ID", "NAME", "EMAIL"]);
}

#[test]
fn test_null_counts_sum_to_total() {
    let fx = Fixture::with_sql(
        "CREATE TABLE T (ID INTEGER, A TEXT, B TEXT);
         INSERT INTO T VALUES (1, NULL, NULL);
         INSERT INTO T VALUES (2, 'x', NULL);
         INSERT INTO T VALUES (NULL, 'y', 'z');",
    );
    let ctx = fx.context("T", "ID");

    let report = fx.with_conn(|conn| detect(conn, &ctx)).expect("report");
    let per_column: i64 = report.null_stats.columns.iter().map(|c| c.null_count).sum();
    assert_eq!(per_column, report.null_stats.total_nulls);
    assert_eq!(report.kpis.total_nulls, 4);
    assert_eq!(report.kpis.top_null_column, "B");
    assert_eq!(report.kpis.duplicate_count, 0);
    // Every row holds a null
    assert_eq!(report.observations.len(), 3);
}

#[test]
fn test_row_with_null_and_duplicate_appears_under_both_tags() {
    let fx = Fixture::with_sql(
        "CREATE TABLE T (ID INTEGER, NAME TEXT, EMAIL TEXT);
         INSERT INTO T VALUES (1, 'Ann', NULL);
         INSERT INTO T VALUES (2, 'ANN', NULL);
         INSERT INTO T VALUES (3, 'Cy', 'cy@x');",
    );
    let ctx = fx.context("T", "ID");

    let report = fx.with_conn(|conn| detect(conn, &ctx)).expect("report");
    let tags: Vec<(Value, ObservationTag)> = report
        .observations
        .rows
        .iter()
        .map(|r| (r.key.clone(), r.observation))
        .collect();
    assert_eq!(
        tags,
        vec![
            (Value::Integer(1), ObservationTag::Null),
            (Value::Integer(2), ObservationTag::Null),
            (Value::Integer(1), ObservationTag::Duplicated),
            (Value::Integer(2), ObservationTag::Duplicated),
        ]
    );
}

#[test]
fn test_zero_rows() {
    let fx = Fixture::with_sql("CREATE TABLE EMPTY (ID INTEGER, NAME TEXT);");
    let ctx = fx.context("EMPTY", "ID");

    let report = fx.with_conn(|conn| detect(conn, &ctx)).expect("report");
    assert_eq!(report.kpis.total_rows, 0);
    assert_eq!(report.kpis.total_nulls, 0);
    assert_eq!(report.kpis.duplicate_count, 0);
    assert_eq!(report.kpis.duplicate_percentage, 0.0);
    assert_eq!(report.kpis.fill_percentage, 0.0);
    assert!(report.observations.is_empty());
}

#[test]
fn test_identifier_only_table_has_no_duplicates() {
    let fx = Fixture::with_sql(
        "CREATE TABLE IDS (ID INTEGER);
         INSERT INTO IDS VALUES (1);
         INSERT INTO IDS VALUES (1);",
    );
    let ctx = fx.context("IDS", "ID");

    let report = fx.with_conn(|conn| detect(conn, &ctx)).expect("report");
    assert_eq!(report.kpis.duplicate_count, 0);
    assert!(report.observations.is_empty());
}

#[test]
fn test_unknown_table_yields_none() {
    let fx = Fixture::customers();
    let ctx = fx.context("ORDERS", "ID");
    assert!(fx.with_conn(|conn| detect(conn, &ctx)).is_none());
}

#[test]
fn test_unknown_identifier_is_rejected() {
    let fx = Fixture::customers();
    let ctx = fx.context("CUSTOMERS", "CUSTOMER_ID");
    let params = tablecheck_warehouse::ConnectionParams::new(
        "LOCAL",
        fx.database(),
        tablecheck_warehouse::dialect::SQLITE_SCHEMA,
    );
    let result = tablecheck_warehouse::with_connection(
        &tablecheck_warehouse::SqliteConnector::new(),
        &params,
        |conn| detect(conn, &ctx),
    );
    assert!(matches!(
        result,
        Err(tablecheck_core::TableCheckError::Validation(_))
    ));
}

#[test]
fn test_detection_is_repeatable() {
    let fx = Fixture::customers();
    let ctx = fx.context("CUSTOMERS", "ID");

    let first = fx.with_conn(|conn| detect(conn, &ctx));
    let second = fx.with_conn(|conn| detect(conn, &ctx));
    assert_eq!(first, second);
}
