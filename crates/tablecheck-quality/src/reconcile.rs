//! Reconciliation Editor
//!
//! Writes edited observation rows back to the source table, one statement
//! per row: DELETE for rows flagged for deletion, UPDATE of every column
//! otherwise. Each statement stands alone. A failing row is recorded and the
//! loop moves on; nothing is rolled back or retried.

use serde::Serialize;
use tablecheck_core::validation::quote_identifier;
use tablecheck_core::{EditIntent, ObservationRow, Result, SessionContext, TableCheckError, Value};
use tablecheck_warehouse::{ensure_known_column, Statement, TableTarget, WarehouseConnection};
use tracing::{debug, info, warn};

/// A row that could not be saved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    /// Display index of the observation row
    pub index: usize,
    pub key: Value,
    pub reason: String,
}

/// Outcome of a save
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveSummary {
    pub succeeded: usize,
    pub deleted: usize,
    pub updated: usize,
    /// Rows whose key was already deleted earlier in the same save
    pub skipped: usize,
    pub failed: Vec<RowFailure>,
}

impl SaveSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// SQL for one edit intent.
///
/// Every assigned column must appear in `catalog`; the identifier is the
/// WHERE key and takes the row's original identifier value.
pub fn render_statement(
    table_ref: &str,
    identifier: &str,
    catalog: &[String],
    intent: &EditIntent,
) -> Result<Statement> {
    ensure_known_column(catalog, identifier)?;
    let key_clause = format!("{} = ?", quote_identifier(identifier));

    match intent {
        EditIntent::Delete { key } => Ok(Statement::new(
            format!("DELETE FROM {} WHERE {}", table_ref, key_clause),
            vec![key.clone()],
        )),
        EditIntent::Update { key, assignments } => {
            if assignments.is_empty() {
                return Err(TableCheckError::Validation(
                    "Update has no columns to set".to_string(),
                ));
            }
            let mut sets = Vec::with_capacity(assignments.len());
            let mut params = Vec::with_capacity(assignments.len() + 1);
            for (column, value) in assignments {
                ensure_known_column(catalog, column)?;
                sets.push(format!("{} = ?", quote_identifier(column)));
                params.push(value.clone());
            }
            params.push(key.clone());
            Ok(Statement::new(
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    table_ref,
                    sets.join(", "),
                    key_clause
                ),
                params,
            ))
        }
    }
}

/// Apply edited rows to the session's table.
///
/// `columns` labels the cells of each row; `catalog` is the table's current
/// column list. Per-row problems (unknown column, wrong cell count, null key,
/// no matching row, warehouse error) land in `failed`. Only a bad session or
/// identifier aborts the whole save.
///
/// A row flagged both NULL and DUPLICATED appears twice; once its key is
/// deleted, later rows with that key are skipped without SQL.
pub fn apply_edits(
    conn: &mut dyn WarehouseConnection,
    ctx: &SessionContext,
    catalog: &[String],
    columns: &[String],
    rows: &[ObservationRow],
) -> Result<SaveSummary> {
    let identifier = ctx.identifier()?;
    ensure_known_column(catalog, identifier)?;
    let target = TableTarget::from_context(ctx);
    let table_ref = conn.dialect().table_ref(&target)?;

    let mut summary = SaveSummary::default();
    let mut deleted_keys: Vec<Value> = Vec::new();
    for row in rows {
        if deleted_keys.contains(&row.key) {
            debug!(index = row.index, key = %row.key, "Key already deleted, skipping row");
            summary.skipped += 1;
            continue;
        }
        match save_row(conn, &table_ref, identifier, catalog, columns, row) {
            Ok(intent) => {
                summary.succeeded += 1;
                match intent {
                    EditIntent::Delete { key } => {
                        summary.deleted += 1;
                        deleted_keys.push(key);
                    }
                    EditIntent::Update { .. } => summary.updated += 1,
                }
            }
            Err(e) => {
                warn!(
                    table = %target.table,
                    index = row.index,
                    key = %row.key,
                    error = %e,
                    "Row save failed"
                );
                summary.failed.push(RowFailure {
                    index: row.index,
                    key: row.key.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        table = %target.table,
        succeeded = summary.succeeded,
        deleted = summary.deleted,
        updated = summary.updated,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        "Edits saved"
    );
    Ok(summary)
}

fn save_row(
    conn: &mut dyn WarehouseConnection,
    table_ref: &str,
    identifier: &str,
    catalog: &[String],
    columns: &[String],
    row: &ObservationRow,
) -> Result<EditIntent> {
    if row.key.is_null() {
        return Err(TableCheckError::Validation(format!(
            "Row {} has no {} value to match on",
            row.index, identifier
        )));
    }
    if !row.delete && row.cells.len() != columns.len() {
        return Err(TableCheckError::Validation(format!(
            "Row {} has {} cells for {} columns",
            row.index,
            row.cells.len(),
            columns.len()
        )));
    }

    let intent = row.intent(columns);
    let stmt = render_statement(table_ref, identifier, catalog, &intent)?;
    debug!(index = row.index, sql = %stmt.sql, "Saving row");

    let affected = conn.execute(&stmt.sql, &stmt.params)?;
    if affected == 0 {
        return Err(TableCheckError::NotFound(format!(
            "No row with {} = {}",
            identifier, row.key
        )));
    }
    Ok(intent)
}
