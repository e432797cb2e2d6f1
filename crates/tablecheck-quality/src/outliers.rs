//! Outlier Detector
//!
//! Finds rows with at least one null cell and rows that duplicate another
//! row case-insensitively across every non-identifier column, and derives
//! the summary KPIs shown above the observation grid.
//!
//! # Fill percentage
//!
//! The fill KPI keeps the dashboard's historical formula:
//! `total_cells = column_count * total_nulls`, then
//! `(total_cells - total_nulls) / total_cells * 100`. It does not measure the
//! share of non-null cells (that would need `column_count * row_count`).
//! Dashboards and alerts already compare against this number.

use crate::metadata::get_columns;
use crate::percentage;
use serde::{Deserialize, Serialize};
use tablecheck_core::validation::quote_identifier;
use tablecheck_core::{
    dedup_rows, ObservationRow, ObservationTag, Result, SessionContext, TableCheckError, Value,
    NOT_AVAILABLE,
};
use tablecheck_warehouse::{ensure_known_column, TableTarget, WarehouseConnection};
use tracing::{debug, info, warn};

/// Column alias for the duplicate partition size
const GROUP_SIZE_ALIAS: &str = "TC_GROUP_SIZE";

/// Null count of one column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnNulls {
    pub column: String,
    pub null_count: i64,
    /// Share of all nulls in the table held by this column
    pub null_percentage: f64,
}

/// Per-column null counts and their total
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NullStats {
    pub columns: Vec<ColumnNulls>,
    pub total_nulls: i64,
}

/// Summary cards of the outliers view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierKpis {
    pub total_rows: i64,
    pub total_nulls: i64,
    pub duplicate_count: i64,
    pub duplicate_percentage: f64,
    pub fill_percentage: f64,
    /// Column with the most nulls, or `N/A`
    pub top_null_column: String,
}

/// Flagged rows, editable and saved back through the reconciliation editor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservationSet {
    /// Labels of each row's cells, in catalog order
    pub columns: Vec<String>,
    pub identifier_column: String,
    pub rows: Vec<ObservationRow>,
}

impl ObservationSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Everything the outliers view needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub kpis: OutlierKpis,
    pub null_stats: NullStats,
    pub observations: ObservationSet,
}

// ============================================================================
// Detection
// ============================================================================

/// Run detection for the session's table and identifier column.
///
/// Returns `Ok(None)` when the table has no columns or the null-count
/// aggregate returns no row; the view shows a warning in that case.
pub fn detect(conn: &mut dyn WarehouseConnection, ctx: &SessionContext) -> Result<Option<OutlierReport>> {
    let identifier = ctx.identifier()?;
    let target = TableTarget::from_context(ctx);
    let table_ref = conn.dialect().table_ref(&target)?;

    let columns = get_columns(conn, &target)?;
    if columns.is_empty() {
        warn!(table = %target.table, "No columns found; skipping outlier detection");
        return Ok(None);
    }
    ensure_known_column(&columns, identifier)?;
    let id_index = columns
        .iter()
        .position(|c| c == identifier)
        .ok_or_else(|| TableCheckError::Validation(format!("Unknown column: {}", identifier)))?;
    let quoted: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();

    // Step 1: null counts and row count in one aggregate
    let Some((total_rows, null_counts)) = count_nulls(conn, &table_ref, &quoted)? else {
        warn!(table = %target.table, "Null-count aggregate returned no row");
        return Ok(None);
    };
    let null_stats = compute_null_stats(&columns, &null_counts);
    debug!(table = %target.table, total_nulls = null_stats.total_nulls, "Counted nulls");

    // Step 2: case-insensitive duplicates over non-identifier columns
    let partition: Vec<String> = quoted
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_index)
        .map(|(_, q)| conn.dialect().lower_text(q))
        .collect();

    let duplicate_count = if partition.is_empty() {
        0
    } else {
        let sql = format!(
            "SELECT COUNT(*) FROM ({}) d WHERE d.{} > 1",
            grouped_select(&table_ref, &quoted, &partition),
            GROUP_SIZE_ALIAS
        );
        conn.query_scalar(&sql, &[])?
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    };

    // Step 3: the flagged rows themselves
    let order_by = &quoted[id_index];
    let select_list = quoted.join(", ");
    let null_rows = if null_stats.total_nulls > 0 {
        let any_null = quoted
            .iter()
            .map(|q| format!("{} IS NULL", q))
            .collect::<Vec<_>>()
            .join(" OR ");
        conn.query(
            &format!(
                "SELECT {} FROM {} WHERE {} ORDER BY {}",
                select_list, table_ref, any_null, order_by
            ),
            &[],
        )?
        .rows
    } else {
        Vec::new()
    };

    let duplicate_rows = if duplicate_count > 0 {
        conn.query(
            &format!(
                "SELECT {} FROM ({}) d WHERE d.{} > 1 ORDER BY {}",
                select_list,
                grouped_select(&table_ref, &quoted, &partition),
                GROUP_SIZE_ALIAS,
                order_by
            ),
            &[],
        )?
        .rows
    } else {
        Vec::new()
    };

    let rows = build_observations(id_index, null_rows, duplicate_rows);
    let kpis = compute_kpis(columns.len(), &null_stats, total_rows, duplicate_count);

    info!(
        table = %target.table,
        total_rows,
        total_nulls = kpis.total_nulls,
        duplicate_count,
        observations = rows.len(),
        "Outlier detection complete"
    );

    Ok(Some(OutlierReport {
        kpis,
        null_stats,
        observations: ObservationSet {
            columns,
            identifier_column: identifier.to_string(),
            rows,
        },
    }))
}

/// `SELECT cols, COUNT(*) OVER (PARTITION BY ...) AS group_size FROM table`
fn grouped_select(table_ref: &str, quoted: &[String], partition: &[String]) -> String {
    format!(
        "SELECT {}, COUNT(*) OVER (PARTITION BY {}) AS {} FROM {}",
        quoted.join(", "),
        partition.join(", "),
        GROUP_SIZE_ALIAS,
        table_ref
    )
}

/// Row count and per-column null counts. `None` when no row comes back.
fn count_nulls(
    conn: &mut dyn WarehouseConnection,
    table_ref: &str,
    quoted: &[String],
) -> Result<Option<(i64, Vec<i64>)>> {
    let sums = quoted
        .iter()
        .map(|q| format!("SUM(CASE WHEN {} IS NULL THEN 1 ELSE 0 END)", q))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT COUNT(*), {} FROM {}", sums, table_ref);

    let Some(row) = conn.query(&sql, &[])?.rows.into_iter().next() else {
        return Ok(None);
    };
    let mut cells = row.into_iter().map(|v| v.as_i64().unwrap_or(0));
    let total_rows = cells.next().unwrap_or(0);
    let counts: Vec<i64> = cells.collect();
    if counts.len() != quoted.len() {
        return Err(TableCheckError::Query(format!(
            "Null-count aggregate returned {} counts for {} columns",
            counts.len(),
            quoted.len()
        )));
    }
    Ok(Some((total_rows, counts)))
}

// ============================================================================
// Pure derivations
// ============================================================================

/// Pair counts with columns and compute each column's share of all nulls.
pub fn compute_null_stats(columns: &[String], counts: &[i64]) -> NullStats {
    let total_nulls: i64 = counts.iter().sum();
    let columns = columns
        .iter()
        .zip(counts)
        .map(|(column, &null_count)| ColumnNulls {
            column: column.clone(),
            null_count,
            null_percentage: percentage(null_count as f64, total_nulls as f64),
        })
        .collect();
    NullStats {
        columns,
        total_nulls,
    }
}

/// Column holding the most nulls; the first one on ties, `N/A` with none.
pub fn top_null_column(stats: &NullStats) -> String {
    let mut top: Option<&ColumnNulls> = None;
    for c in &stats.columns {
        if c.null_count > 0 && top.map_or(true, |t| c.null_count > t.null_count) {
            top = Some(c);
        }
    }
    top.map(|c| c.column.clone())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Summary KPIs; see the module docs for the fill formula.
pub fn compute_kpis(
    column_count: usize,
    stats: &NullStats,
    total_rows: i64,
    duplicate_count: i64,
) -> OutlierKpis {
    let total_nulls = stats.total_nulls;
    let total_cells = column_count as i64 * total_nulls;
    let fill_percentage = percentage((total_cells - total_nulls) as f64, total_cells as f64);

    OutlierKpis {
        total_rows,
        total_nulls,
        duplicate_count,
        duplicate_percentage: percentage(duplicate_count as f64, total_rows as f64).clamp(0.0, 100.0),
        fill_percentage,
        top_null_column: top_null_column(stats),
    }
}

/// Tag, union, drop exact repeats and number the flagged rows from 1.
pub fn build_observations(
    id_index: usize,
    null_rows: Vec<Vec<Value>>,
    duplicate_rows: Vec<Vec<Value>>,
) -> Vec<ObservationRow> {
    let tagged = null_rows
        .into_iter()
        .map(|r| (r, ObservationTag::Null))
        .chain(duplicate_rows.into_iter().map(|r| (r, ObservationTag::Duplicated)))
        .collect();

    dedup_rows(tagged)
        .into_iter()
        .enumerate()
        .map(|(i, (cells, observation))| ObservationRow {
            index: i + 1,
            key: cells.get(id_index).cloned().unwrap_or(Value::Null),
            cells,
            observation,
            delete: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedConnection;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_null_stats_sum_to_total() {
        let stats = compute_null_stats(&cols(&["ID", "NAME", "EMAIL"]), &[0, 1, 3]);
        assert_eq!(stats.total_nulls, 4);
        let sum: i64 = stats.columns.iter().map(|c| c.null_count).sum();
        assert_eq!(sum, stats.total_nulls);
        assert_eq!(stats.columns[2].null_percentage, 75.0);
    }

    #[test]
    fn test_null_stats_without_nulls() {
        let stats = compute_null_stats(&cols(&["ID", "NAME"]), &[0, 0]);
        assert_eq!(stats.total_nulls, 0);
        assert!(stats.columns.iter().all(|c| c.null_percentage == 0.0));
        assert_eq!(top_null_column(&stats), "N/A");
    }

    #[test]
    fn test_top_null_column_first_on_ties() {
        let stats = compute_null_stats(&cols(&["A", "B", "C"]), &[2, 5, 5]);
        assert_eq!(top_null_column(&stats), "B");
    }

    #[test]
    fn test_fill_percentage_formula() {
        let stats = compute_null_stats(&cols(&["ID", "NAME", "EMAIL"]), &[0, 0, 1]);
        let kpis = compute_kpis(3, &stats, 3, 2);
        // total_cells = 3 * 1, fill = (3 - 1) / 3 * 100
        assert!((kpis.fill_percentage - 66.666).abs() < 0.01);
        assert!((kpis.duplicate_percentage - 66.67).abs() < 0.01);

        let none = compute_null_stats(&cols(&["ID"]), &[0]);
        let kpis = compute_kpis(1, &none, 0, 0);
        assert_eq!(kpis.fill_percentage, 0.0);
        assert_eq!(kpis.duplicate_percentage, 0.0);
    }

    #[test]
    fn test_build_observations_dedups_and_indexes() {
        let ann = vec![Value::Integer(1), Value::from("Ann"), Value::Null];
        let bob = vec![Value::Integer(2), Value::from("Bob"), Value::from("bob@x")];
        let rows = build_observations(
            0,
            vec![ann.clone(), ann.clone()],
            vec![bob.clone(), ann.clone()],
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[0].observation, ObservationTag::Null);
        assert_eq!(rows[1].key, Value::Integer(2));
        assert_eq!(rows[1].observation, ObservationTag::Duplicated);
        assert_eq!(rows[2].index, 3);
        assert_eq!(rows[2].cells, ann);
        assert!(rows.iter().all(|r| !r.delete));
    }

    fn scripted_ctx() -> SessionContext {
        SessionContext {
            warehouse: "WH".to_string(),
            database: "SALES".to_string(),
            schema: "PUBLIC".to_string(),
            table: "CUSTOMERS".to_string(),
            identifier_column: Some("ID".to_string()),
            columns: cols(&["ID", "NAME"]),
            loaded: true,
        }
    }

    #[test]
    fn test_detect_stops_without_aggregate_row() {
        let mut conn = ScriptedConnection::snowflake()
            .respond("SELECT COLUMN_NAME", &["COLUMN_NAME"], vec![
                vec![Value::from("ID")],
                vec![Value::from("NAME")],
            ])
            .respond("SUM(CASE WHEN", &["COUNT"], vec![]);

        assert!(detect(&mut conn, &scripted_ctx()).unwrap().is_none());
        // No duplicate query after the aggregate came back empty
        assert!(!conn.log.iter().any(|(sql, _)| sql.contains("PARTITION BY")));
    }

    #[test]
    fn test_detect_snowflake_sql_shape() {
        let mut conn = ScriptedConnection::snowflake()
            .respond("SELECT COLUMN_NAME", &["COLUMN_NAME"], vec![
                vec![Value::from("ID")],
                vec![Value::from("NAME")],
            ])
            .respond("SUM(CASE WHEN", &["A", "B", "C"], vec![vec![
                Value::Integer(2),
                Value::Integer(0),
                Value::Integer(0),
            ]])
            .respond("SELECT COUNT(*) FROM (", &["N"], vec![vec![Value::Integer(0)]]);

        let report = detect(&mut conn, &scripted_ctx()).unwrap().unwrap();
        assert!(report.observations.is_empty());
        assert_eq!(report.kpis.total_rows, 2);

        let dup_sql = &conn
            .log
            .iter()
            .find(|(sql, _)| sql.contains("PARTITION BY"))
            .unwrap()
            .0;
        assert!(dup_sql.contains("PARTITION BY LOWER(CAST(\"NAME\" AS VARCHAR))"));
        assert!(dup_sql.contains("\"SALES\".\"PUBLIC\".\"CUSTOMERS\""));
        assert!(!dup_sql.contains("LOWER(CAST(\"ID\""));
    }

    #[test]
    fn test_detect_requires_identifier() {
        let mut ctx = scripted_ctx();
        ctx.identifier_column = None;
        let mut conn = ScriptedConnection::snowflake();
        assert!(matches!(
            detect(&mut conn, &ctx),
            Err(TableCheckError::Navigation(_))
        ));
    }
}
