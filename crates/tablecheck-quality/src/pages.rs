//! Page controllers for the four dashboard views.
//!
//! Each function takes the session's `Navigator` explicitly and opens one
//! warehouse connection for the duration of the call. `render` never fails:
//! problems are scoped to the view as a warning or error model.

use crate::history::{Interval, DmlEvent, PruningEvent};
use crate::metadata::{
    get_columns, get_dml_history, get_pruning_history, get_storage_metrics, get_table_overview,
};
use crate::outliers::{detect, ObservationSet};
use crate::reconcile::{apply_edits, SaveSummary};
use crate::view::{self, RenderedView, NO_COLUMNS_FOUND, NO_DML_HISTORY, NO_PRUNING_HISTORY};
use tablecheck_core::navigation::{Navigator, TableForm, Transition, View};
use tablecheck_core::{Result, SessionContext, TableCheckError};
use tablecheck_warehouse::{
    with_connection, ConnectionParams, DynConnector, TableTarget, WarehouseConnection,
};
use tracing::{error, info, warn};

/// Submit the input form: fetch the table's columns and load the session.
///
/// On a validation or connection error the session is left as it was.
pub fn submit_form(
    connector: &DynConnector,
    nav: &mut Navigator,
    form: TableForm,
) -> Result<RenderedView> {
    let target = TableTarget::new(&form.database, &form.schema, &form.table);
    connector.dialect().validate_target(&target)?;
    let params = ConnectionParams::new(&form.warehouse, &form.database, &form.schema);

    let columns = with_connection(connector, &params, |conn| get_columns(conn, &target))?;
    if columns.is_empty() {
        warn!(table = %form.table, "No columns found for submitted table");
    }
    info!(
        database = %form.database,
        schema = %form.schema,
        table = %form.table,
        columns = columns.len(),
        "Table form submitted"
    );

    nav.apply(Transition::Submit { form, columns })?;
    Ok(input_form(nav))
}

/// Confirm the identifier column and redirect to the Table Overview.
pub fn confirm_identifier(nav: &mut Navigator, column: &str) -> Result<View> {
    let view = nav.apply(Transition::ConfirmIdentifier(column.to_string()))?;
    info!(table = %nav.context.table, identifier = column, "Identifier column confirmed");
    Ok(view)
}

/// Menu selection. Any view may be selected from any view.
pub fn select_view(nav: &mut Navigator, view: View) -> View {
    // Select never fails
    nav.apply(Transition::Select(view)).unwrap_or(view)
}

/// Render the current view.
pub fn render(connector: &DynConnector, nav: &Navigator, interval: Interval) -> RenderedView {
    let target_view = nav.view;
    if let Some(message) = nav.requirement(target_view) {
        return RenderedView::Warning {
            target: target_view,
            message: message.to_string(),
        };
    }

    let result = match target_view {
        View::InputForm => Ok(input_form(nav)),
        View::TableOverview => table_overview(connector, &nav.context),
        View::DataStatistics => data_statistics(connector, &nav.context, interval),
        View::OutliersOverview => outliers_overview(connector, nav),
    };

    result.unwrap_or_else(|e| {
        error!(view = target_view.as_str(), table = %nav.context.table, error = %e, "View failed");
        RenderedView::Error {
            target: target_view,
            message: e.to_string(),
        }
    })
}

/// Save edited observation rows.
///
/// Rows that fail stay in the session as pending edits; rows that succeed
/// are dropped from it.
pub fn save_edits(
    connector: &DynConnector,
    nav: &mut Navigator,
    edits: &ObservationSet,
) -> Result<SaveSummary> {
    if let Some(message) = nav.requirement(View::OutliersOverview) {
        return Err(TableCheckError::Navigation(message.to_string()));
    }
    let ctx = nav.context.clone();
    let identifier = ctx.identifier()?;
    if edits.identifier_column != identifier {
        return Err(TableCheckError::Validation(format!(
            "Edits are keyed by {} but the session identifier is {}",
            edits.identifier_column, identifier
        )));
    }

    let summary = with_session(connector, &ctx, |conn| {
        let catalog = get_columns(conn, &TableTarget::from_context(&ctx))?;
        apply_edits(conn, &ctx, &catalog, &edits.columns, &edits.rows)
    })?;

    nav.pending_edits = edits
        .rows
        .iter()
        .filter(|row| summary.failed.iter().any(|f| f.index == row.index))
        .cloned()
        .collect();
    Ok(summary)
}

// ============================================================================
// Views
// ============================================================================

fn with_session<T, F>(connector: &DynConnector, ctx: &SessionContext, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn WarehouseConnection) -> Result<T>,
{
    with_connection(connector, &ConnectionParams::from_context(ctx), f)
}

fn input_form(nav: &Navigator) -> RenderedView {
    let ctx = &nav.context;
    let message = (ctx.loaded && ctx.columns.is_empty()).then(|| NO_COLUMNS_FOUND.to_string());
    RenderedView::InputForm {
        form: TableForm {
            warehouse: ctx.warehouse.clone(),
            database: ctx.database.clone(),
            schema: ctx.schema.clone(),
            table: ctx.table.clone(),
        },
        loaded: ctx.loaded,
        columns: ctx.columns.clone(),
        identifier_column: ctx.identifier_column.clone(),
        message,
    }
}

fn not_found(target: View) -> RenderedView {
    RenderedView::Warning {
        target,
        message: NO_COLUMNS_FOUND.to_string(),
    }
}

fn table_overview(connector: &DynConnector, ctx: &SessionContext) -> Result<RenderedView> {
    let target = TableTarget::from_context(ctx);
    let snapshot = with_session(connector, ctx, |conn| get_table_overview(conn, &target))?;
    Ok(match snapshot {
        Some(snapshot) => view::overview(&snapshot),
        None => not_found(View::TableOverview),
    })
}

fn data_statistics(
    connector: &DynConnector,
    ctx: &SessionContext,
    interval: Interval,
) -> Result<RenderedView> {
    let target = TableTarget::from_context(ctx);
    let (metrics, dml, pruning) = with_session(connector, ctx, |conn| {
        let metrics = get_storage_metrics(conn, &target)?;
        let dml: Vec<DmlEvent> = history_or_empty(get_dml_history(conn, &target), "dml");
        let pruning: Vec<PruningEvent> =
            history_or_empty(get_pruning_history(conn, &target), "pruning");
        Ok((metrics, dml, pruning))
    })?;

    Ok(RenderedView::DataStatistics {
        interval,
        cards: view::storage_cards(&metrics),
        dml: view::history_chart(
            &dml,
            interval,
            "DML Operations Over Time",
            "Number of Rows",
            NO_DML_HISTORY,
        ),
        pruning: view::history_chart(
            &pruning,
            interval,
            "Table Pruning Operations Over Time",
            "Count",
            NO_PRUNING_HISTORY,
        ),
    })
}

/// History views often need elevated grants; a failed read shows as no data.
fn history_or_empty<E>(result: Result<Vec<E>>, history: &str) -> Vec<E> {
    result.unwrap_or_else(|e| {
        warn!(history, error = %e, "History lookup failed");
        Vec::new()
    })
}

fn outliers_overview(connector: &DynConnector, nav: &Navigator) -> Result<RenderedView> {
    let report = with_session(connector, &nav.context, |conn| detect(conn, &nav.context))?;
    Ok(match report {
        Some(report) => view::outliers(report, nav.pending_edits.clone()),
        None => not_found(View::OutliersOverview),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestWarehouse;
    use tablecheck_core::navigation::{IDENTIFIER_REQUIRED, LOGIN_REQUIRED};
    use tablecheck_warehouse::SqliteConnector;

    #[test]
    fn test_views_warn_before_login() {
        let connector = SqliteConnector::new();
        let mut nav = Navigator::new();
        for view in [View::TableOverview, View::DataStatistics, View::OutliersOverview] {
            select_view(&mut nav, view);
            assert_eq!(
                render(&connector, &nav, Interval::Daily),
                RenderedView::Warning {
                    target: view,
                    message: LOGIN_REQUIRED.to_string()
                }
            );
        }
    }

    #[test]
    fn test_submit_then_outliers_needs_identifier() {
        let wh = TestWarehouse::customers().unwrap();
        let connector = SqliteConnector::new();
        let mut nav = Navigator::new();

        let form = submit_form(&connector, &mut nav, wh.form("CUSTOMERS")).unwrap();
        match form {
            RenderedView::InputForm {
                loaded,
                columns,
                message,
                ..
            } => {
                assert!(loaded);
                assert_eq!(columns, vec!["ID", "NAME", "EMAIL"]);
                assert!(message.is_none());
            }
            other => panic!("expected input form, got {:?}", other),
        }

        select_view(&mut nav, View::OutliersOverview);
        assert_eq!(
            render(&connector, &nav, Interval::Daily),
            RenderedView::Warning {
                target: View::OutliersOverview,
                message: IDENTIFIER_REQUIRED.to_string()
            }
        );
    }

    #[test]
    fn test_submit_unknown_table_warns() {
        let wh = TestWarehouse::customers().unwrap();
        let connector = SqliteConnector::new();
        let mut nav = Navigator::new();

        let view = submit_form(&connector, &mut nav, wh.form("ORDERS")).unwrap();
        match view {
            RenderedView::InputForm { message, columns, .. } => {
                assert!(columns.is_empty());
                assert_eq!(message.as_deref(), Some(NO_COLUMNS_FOUND));
            }
            other => panic!("expected input form, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_error_keeps_session() {
        let wh = TestWarehouse::customers().unwrap();
        let connector = SqliteConnector::new();
        let mut nav = Navigator::new();
        submit_form(&connector, &mut nav, wh.form("CUSTOMERS")).unwrap();

        let mut missing = wh.form("CUSTOMERS");
        missing.database = format!("{}.gone", wh.path());
        assert!(submit_form(&connector, &mut nav, missing).is_err());
        assert_eq!(nav.context.database, wh.path());
        assert_eq!(nav.context.columns.len(), 3);
    }

    #[test]
    fn test_statistics_on_sqlite_show_placeholders() {
        let wh = TestWarehouse::customers().unwrap();
        let connector = SqliteConnector::new();
        let mut nav = Navigator::new();
        submit_form(&connector, &mut nav, wh.form("CUSTOMERS")).unwrap();
        select_view(&mut nav, View::DataStatistics);

        match render(&connector, &nav, Interval::Weekly) {
            RenderedView::DataStatistics {
                interval,
                cards,
                dml,
                pruning,
            } => {
                assert_eq!(interval, Interval::Weekly);
                assert!(cards.iter().all(|c| c.value == "N/A"));
                assert!(matches!(dml, view::Chart::NoData { .. }));
                assert!(matches!(pruning, view::Chart::NoData { .. }));
            }
            other => panic!("expected statistics, got {:?}", other),
        }
    }

    #[test]
    fn test_save_requires_matching_identifier() {
        let wh = TestWarehouse::customers().unwrap();
        let connector = SqliteConnector::new();
        let mut nav = Navigator::new();
        submit_form(&connector, &mut nav, wh.form("CUSTOMERS")).unwrap();
        confirm_identifier(&mut nav, "ID").unwrap();

        let edits = ObservationSet {
            columns: vec!["ID".to_string(), "NAME".to_string(), "EMAIL".to_string()],
            identifier_column: "NAME".to_string(),
            rows: vec![],
        };
        let err = save_edits(&connector, &mut nav, &edits).unwrap_err();
        assert!(matches!(err, TableCheckError::Validation(_)));
    }
}
