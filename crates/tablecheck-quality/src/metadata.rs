//! Metadata Reporter
//!
//! Structural and storage facts about the active table, read fresh from the
//! warehouse catalog on every call. Missing metadata is a warning or `N/A`,
//! never a hard failure.

use crate::history::{DmlEvent, PruningEvent};
use serde::Serialize;
use tablecheck_core::{Result, TableCheckError, Value};
use tablecheck_warehouse::{ResultSet, Statement, TableTarget, WarehouseConnection};
use tracing::{debug, info, warn};

/// Labels of the twelve overview fields, in display order
pub const OVERVIEW_LABELS: [&str; 12] = [
    "Database Name",
    "Schema Name",
    "Table Name",
    "LAST_ALTERED",
    "LAST_DDL",
    "LAST_DDL_BY",
    "Created At",
    "Comment",
    "Table Owner",
    "Total Number of Columns",
    "Total Number of Rows",
    "Total Number of Types",
];

/// One row of aggregate table metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub database_name: Value,
    pub schema_name: Value,
    pub table_name: Value,
    pub last_altered: Value,
    pub last_ddl: Value,
    pub last_ddl_by: Value,
    pub created_at: Value,
    pub comment: Value,
    pub owner: Value,
    pub column_count: Value,
    pub row_count: Value,
    pub type_count: Value,
    /// Columns per data type
    pub data_types: Vec<TypeCount>,
}

impl TableSnapshot {
    /// (label, display value) pairs in overview order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let values = [
            &self.database_name,
            &self.schema_name,
            &self.table_name,
            &self.last_altered,
            &self.last_ddl,
            &self.last_ddl_by,
            &self.created_at,
            &self.comment,
            &self.owner,
            &self.column_count,
            &self.row_count,
            &self.type_count,
        ];
        OVERVIEW_LABELS
            .iter()
            .zip(values)
            .map(|(label, value)| (*label, value.to_string()))
            .collect()
    }

    fn from_row(row: Vec<Value>, data_types: Vec<TypeCount>) -> Result<Self> {
        let [database_name, schema_name, table_name, last_altered, last_ddl, last_ddl_by, created_at, comment, owner, column_count, row_count, type_count]: [Value; 12] =
            row.try_into().map_err(|row: Vec<Value>| {
                TableCheckError::Query(format!(
                    "Table overview returned {} columns, expected {}",
                    row.len(),
                    OVERVIEW_LABELS.len()
                ))
            })?;

        Ok(Self {
            database_name,
            schema_name,
            table_name,
            last_altered,
            last_ddl,
            last_ddl_by,
            created_at,
            comment,
            owner,
            column_count,
            row_count,
            type_count,
            data_types,
        })
    }
}

/// Number of columns of one data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub data_type: String,
    pub count: i64,
}

/// Storage lookups; `Value::Null` renders as `N/A`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageMetrics {
    pub failsafe_bytes: Value,
    pub retention_days: Value,
    pub time_travel_bytes: Value,
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog column names in ordinal order; empty when the table is unknown.
pub fn get_columns(conn: &mut dyn WarehouseConnection, target: &TableTarget) -> Result<Vec<String>> {
    let stmt = conn.dialect().columns(target)?;
    let rs = conn.run(&stmt)?;
    let columns: Vec<String> = rs
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .filter(|v| !v.is_null())
        .map(|v| v.to_string())
        .collect();

    debug!(table = %target.table, columns = columns.len(), "Fetched column list");
    Ok(columns)
}

/// Columns per data type, ordered by type name.
pub fn get_column_types(
    conn: &mut dyn WarehouseConnection,
    target: &TableTarget,
) -> Result<Vec<TypeCount>> {
    let stmt = conn.dialect().column_types(target)?;
    let rs = conn.run(&stmt)?;
    Ok(rs
        .rows
        .into_iter()
        .filter_map(|row| {
            let mut cells = row.into_iter();
            let data_type = cells.next()?.to_string();
            let count = cells.next()?.as_i64()?;
            Some(TypeCount { data_type, count })
        })
        .collect())
}

/// Table overview with its data-type breakdown.
///
/// `None` when the table has no columns or no catalog row; callers render
/// that as a "not found" warning.
pub fn get_table_overview(
    conn: &mut dyn WarehouseConnection,
    target: &TableTarget,
) -> Result<Option<TableSnapshot>> {
    if get_columns(conn, target)?.is_empty() {
        warn!(table = %target.table, "Table overview requested for a table with no columns");
        return Ok(None);
    }

    let stmt = conn.dialect().table_overview(target)?;
    let Some(row) = conn.run(&stmt)?.rows.into_iter().next() else {
        warn!(table = %target.table, "No catalog row for table");
        return Ok(None);
    };

    let data_types = get_column_types(conn, target)?;
    let snapshot = TableSnapshot::from_row(row, data_types)?;
    info!(
        table = %target.table,
        rows = %snapshot.row_count,
        columns = %snapshot.column_count,
        "Table overview fetched"
    );
    Ok(Some(snapshot))
}

// ============================================================================
// Storage and history
// ============================================================================

/// Three independent scalar lookups.
///
/// A lookup the backend does not support, that returns no row, or that fails
/// yields `N/A` for that metric only.
pub fn get_storage_metrics(
    conn: &mut dyn WarehouseConnection,
    target: &TableTarget,
) -> Result<StorageMetrics> {
    let failsafe = conn.dialect().failsafe_bytes(target)?;
    let retention = conn.dialect().retention_days(target)?;
    let time_travel = conn.dialect().time_travel_bytes(target)?;

    Ok(StorageMetrics {
        failsafe_bytes: scalar_or_na(conn, failsafe, "failsafe_bytes"),
        retention_days: scalar_or_na(conn, retention, "retention_days"),
        time_travel_bytes: scalar_or_na(conn, time_travel, "time_travel_bytes"),
    })
}

fn scalar_or_na(
    conn: &mut dyn WarehouseConnection,
    stmt: Option<Statement>,
    metric: &str,
) -> Value {
    let Some(stmt) = stmt else {
        debug!(metric, "Storage metric not tracked by this backend");
        return Value::Null;
    };
    match conn.query_scalar(&stmt.sql, &stmt.params) {
        Ok(value) => value.unwrap_or(Value::Null),
        Err(e) => {
            warn!(metric, error = %e, "Storage metric lookup failed");
            Value::Null
        }
    }
}

/// DML events in time order; empty when the backend keeps no history.
pub fn get_dml_history(
    conn: &mut dyn WarehouseConnection,
    target: &TableTarget,
) -> Result<Vec<DmlEvent>> {
    let Some(stmt) = conn.dialect().dml_history(target)? else {
        return Ok(Vec::new());
    };
    let rs = conn.run(&stmt)?;
    let events = timed_rows(rs, 3, "DML history")?
        .into_iter()
        .map(|(start_time, m)| DmlEvent {
            start_time,
            rows_added: m[0],
            rows_updated: m[1],
            rows_removed: m[2],
        })
        .collect::<Vec<_>>();
    debug!(table = %target.table, events = events.len(), "Fetched DML history");
    Ok(events)
}

/// Pruning events in time order; empty when the backend keeps no history.
pub fn get_pruning_history(
    conn: &mut dyn WarehouseConnection,
    target: &TableTarget,
) -> Result<Vec<PruningEvent>> {
    let Some(stmt) = conn.dialect().pruning_history(target)? else {
        return Ok(Vec::new());
    };
    let rs = conn.run(&stmt)?;
    let events = timed_rows(rs, 5, "pruning history")?
        .into_iter()
        .map(|(start_time, m)| PruningEvent {
            start_time,
            num_scans: m[0],
            rows_scanned: m[1],
            rows_pruned: m[2],
            partitions_pruned: m[3],
            partitions_scanned: m[4],
        })
        .collect::<Vec<_>>();
    debug!(table = %target.table, events = events.len(), "Fetched pruning history");
    Ok(events)
}

/// Split history rows into (start time, metrics). Null metrics count as 0.
fn timed_rows(
    rs: ResultSet,
    width: usize,
    what: &str,
) -> Result<Vec<(chrono::DateTime<chrono::Utc>, Vec<i64>)>> {
    rs.rows
        .into_iter()
        .map(|row| {
            if row.len() < width + 1 {
                return Err(TableCheckError::Query(format!(
                    "{} row has {} columns, expected {}",
                    what,
                    row.len(),
                    width + 1
                )));
            }
            let start = row[0].as_timestamp().ok_or_else(|| {
                TableCheckError::Query(format!("{} row has no usable START_TIME", what))
            })?;
            let metrics = row[1..=width]
                .iter()
                .map(|v| v.as_i64().unwrap_or(0))
                .collect();
            Ok((start, metrics))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedConnection;

    fn target() -> TableTarget {
        TableTarget::new("SALES", "PUBLIC", "CUSTOMERS")
    }

    #[test]
    fn test_snapshot_fields_render_na() {
        let mut row = vec![Value::Null; 12];
        row[2] = Value::from("CUSTOMERS");
        row[10] = Value::Float(3.0);
        let snapshot = TableSnapshot::from_row(row, vec![]).unwrap();
        let fields = snapshot.fields();
        assert_eq!(fields.len(), 12);
        assert_eq!(fields[2], ("Table Name", "CUSTOMERS".to_string()));
        assert_eq!(fields[7], ("Comment", "N/A".to_string()));
        assert_eq!(fields[10], ("Total Number of Rows", "3".to_string()));
    }

    #[test]
    fn test_snapshot_rejects_short_row() {
        assert!(TableSnapshot::from_row(vec![Value::Null; 5], vec![]).is_err());
    }

    #[test]
    fn test_snowflake_overview_via_script() {
        let mut conn = ScriptedConnection::snowflake()
            .respond("SELECT COLUMN_NAME", &["COLUMN_NAME"], vec![
                vec![Value::from("ID")],
                vec![Value::from("EMAIL")],
            ])
            .respond("AS \"Database Name\"", &OVERVIEW_LABELS, vec![vec![
                Value::from("SALES"),
                Value::from("PUBLIC"),
                Value::from("CUSTOMERS"),
                Value::Null,
                Value::Null,
                Value::from("SYSADMIN"),
                Value::Null,
                Value::Null,
                Value::from("SYSADMIN"),
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(2),
            ]])
            .respond("SELECT DATA_TYPE", &["DATA_TYPE", "COUNT"], vec![
                vec![Value::from("NUMBER"), Value::Integer(1)],
                vec![Value::from("TEXT"), Value::Integer(1)],
            ]);

        let snapshot = get_table_overview(&mut conn, &target()).unwrap().unwrap();
        assert_eq!(snapshot.owner, Value::from("SYSADMIN"));
        assert_eq!(snapshot.data_types.len(), 2);
        assert_eq!(snapshot.data_types[0].data_type, "NUMBER");
    }

    #[test]
    fn test_overview_missing_table() {
        let mut conn = ScriptedConnection::snowflake().respond("SELECT COLUMN_NAME", &["COLUMN_NAME"], vec![]);
        assert!(get_table_overview(&mut conn, &target()).unwrap().is_none());
    }

    #[test]
    fn test_storage_metrics_degrade_independently() {
        let mut conn = ScriptedConnection::snowflake()
            .respond("SELECT FAILSAFE_BYTES", &["FAILSAFE_BYTES"], vec![vec![Value::Integer(1024)]])
            .respond("SELECT RETENTION_TIME", &["RETENTION_TIME"], vec![])
            .fail("SELECT TIME_TRAVEL_BYTES", "insufficient privileges");

        let metrics = get_storage_metrics(&mut conn, &target()).unwrap();
        assert_eq!(metrics.failsafe_bytes, Value::Integer(1024));
        assert_eq!(metrics.retention_days, Value::Null);
        assert_eq!(metrics.time_travel_bytes, Value::Null);
    }

    #[test]
    fn test_dml_history_rows() {
        let mut conn = ScriptedConnection::snowflake().respond(
            "TABLE_DML_HISTORY",
            &["START_TIME", "ROWS_ADDED", "ROWS_UPDATED", "ROWS_REMOVED"],
            vec![vec![
                Value::from("2024-01-02 03:00:00"),
                Value::Integer(5),
                Value::Null,
                Value::Integer(1),
            ]],
        );
        let events = get_dml_history(&mut conn, &target()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rows_added, 5);
        assert_eq!(events[0].rows_updated, 0);
    }

    #[test]
    fn test_pruning_history_bad_timestamp() {
        let mut conn = ScriptedConnection::snowflake().respond(
            "TABLE_PRUNING_HISTORY",
            &["START_TIME", "A", "B", "C", "D", "E"],
            vec![vec![
                Value::from("not a time"),
                Value::Integer(1),
                Value::Integer(1),
                Value::Integer(1),
                Value::Integer(1),
                Value::Integer(1),
            ]],
        );
        assert!(get_pruning_history(&mut conn, &target()).is_err());
    }
}
