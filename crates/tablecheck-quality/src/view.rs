//! Render-ready view models.
//!
//! Cards, chart series, grids and style hints, serialized as JSON for the
//! HTTP surface and printed as text by the CLI. Drawing them is a client
//! concern.

use crate::history::{resample, Bucket, HistoryEvent, Interval};
use crate::outliers::{ObservationSet, OutlierReport};
use crate::metadata::{StorageMetrics, TableSnapshot};
use serde::Serialize;
use tablecheck_core::navigation::{TableForm, View};
use tablecheck_core::{ObservationRow, ObservationTag, Value, NOT_AVAILABLE};

/// Placeholder text for an empty DML history
pub const NO_DML_HISTORY: &str = "No DML history data available for the selected table.";

/// Placeholder text for an empty pruning history
pub const NO_PRUNING_HISTORY: &str = "No pruning history data available for the selected table.";

/// Warning on the input form when the catalog knows no such table
pub const NO_COLUMNS_FOUND: &str = "No columns found for the specified table.";

/// A titled KPI box
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub title: String,
    pub value: String,
}

impl Card {
    pub fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
        }
    }
}

/// One plotted series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub values: Vec<f64>,
}

/// One pie slice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Chart {
    Line {
        title: String,
        x_label: String,
        y_label: String,
        x: Vec<String>,
        series: Vec<Series>,
    },
    Bar {
        title: String,
        categories: Vec<String>,
        series: Vec<Series>,
    },
    Pie {
        title: String,
        slices: Vec<Slice>,
    },
    NoData {
        title: String,
        message: String,
    },
}

/// Style hint for one grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStyle {
    /// Null cell (red)
    Null,
    /// Cell of a duplicated row (yellow)
    Duplicate,
}

/// A read-only grid row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub index: usize,
    pub cells: Vec<String>,
    pub styles: Vec<Option<CellStyle>>,
    pub observation: ObservationTag,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    pub columns: Vec<String>,
    pub rows: Vec<GridRow>,
}

/// What a view renders to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum RenderedView {
    InputForm {
        form: TableForm,
        loaded: bool,
        columns: Vec<String>,
        identifier_column: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TableOverview {
        cards: Vec<Card>,
        chart: Chart,
    },
    DataStatistics {
        interval: Interval,
        cards: Vec<Card>,
        dml: Chart,
        pruning: Chart,
    },
    OutliersOverview {
        cards: Vec<Card>,
        nulls: Chart,
        duplicates: Chart,
        table: Grid,
        editor: ObservationSet,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pending_edits: Vec<ObservationRow>,
    },
    /// Preconditions unmet or nothing to show
    Warning { target: View, message: String },
    /// A scoped failure of one view
    Error { target: View, message: String },
}

impl RenderedView {
    /// The navigation state this model belongs to
    pub fn view(&self) -> View {
        match self {
            RenderedView::InputForm { .. } => View::InputForm,
            RenderedView::TableOverview { .. } => View::TableOverview,
            RenderedView::DataStatistics { .. } => View::DataStatistics,
            RenderedView::OutliersOverview { .. } => View::OutliersOverview,
            RenderedView::Warning { target, .. } | RenderedView::Error { target, .. } => *target,
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn overview(snapshot: &TableSnapshot) -> RenderedView {
    let cards = snapshot
        .fields()
        .into_iter()
        .map(|(label, value)| Card::new(label, value))
        .collect();

    let chart = if snapshot.data_types.is_empty() {
        Chart::NoData {
            title: "Data types".to_string(),
            message: "No column types found.".to_string(),
        }
    } else {
        Chart::Pie {
            title: "Data types".to_string(),
            slices: snapshot
                .data_types
                .iter()
                .map(|t| Slice {
                    label: t.data_type.clone(),
                    value: t.count as f64,
                })
                .collect(),
        }
    };

    RenderedView::TableOverview { cards, chart }
}

fn with_unit(value: &Value, unit: &str) -> String {
    if value.is_null() {
        NOT_AVAILABLE.to_string()
    } else {
        format!("{} {}", value, unit)
    }
}

pub fn storage_cards(metrics: &StorageMetrics) -> Vec<Card> {
    vec![
        Card::new("Failsafe Bytes", with_unit(&metrics.failsafe_bytes, "bytes")),
        Card::new("Retention Time", with_unit(&metrics.retention_days, "days")),
        Card::new(
            "Time Travel Bytes",
            with_unit(&metrics.time_travel_bytes, "bytes"),
        ),
    ]
}

/// Line chart of resampled history, or a placeholder when there is none.
pub fn history_chart<E: HistoryEvent>(
    events: &[E],
    interval: Interval,
    title: &str,
    y_label: &str,
    empty_message: &str,
) -> Chart {
    let buckets: Vec<Bucket> = resample(events, interval);
    let title = format!("{} ({})", title, interval);
    if buckets.is_empty() {
        return Chart::NoData {
            title,
            message: empty_message.to_string(),
        };
    }

    let series = E::SERIES
        .iter()
        .enumerate()
        .map(|(i, (name, color))| Series {
            name: name.to_string(),
            color: Some(color.to_string()),
            values: buckets
                .iter()
                .map(|b| b.values.get(i).copied().unwrap_or(0) as f64)
                .collect(),
        })
        .collect();

    Chart::Line {
        title,
        x_label: "Time".to_string(),
        y_label: y_label.to_string(),
        x: buckets
            .iter()
            .map(|b| b.period.format("%Y-%m-%d").to_string())
            .collect(),
        series,
    }
}

/// Grid with null and duplicate style hints. Nulls display as `"null"`.
pub fn observation_grid(set: &ObservationSet) -> Grid {
    let rows = set
        .rows
        .iter()
        .map(|row| GridRow {
            index: row.index,
            cells: row.cells.iter().map(Value::grid_text).collect(),
            styles: row
                .cells
                .iter()
                .map(|cell| {
                    if cell.is_null() {
                        Some(CellStyle::Null)
                    } else if row.observation == ObservationTag::Duplicated {
                        Some(CellStyle::Duplicate)
                    } else {
                        None
                    }
                })
                .collect(),
            observation: row.observation,
        })
        .collect();

    Grid {
        columns: set.columns.clone(),
        rows,
    }
}

pub fn outliers(report: OutlierReport, pending_edits: Vec<ObservationRow>) -> RenderedView {
    let kpis = &report.kpis;
    let cards = vec![
        Card::new("Total Null Values", kpis.total_nulls.to_string()),
        Card::new("Total Duplicate Rows", kpis.duplicate_count.to_string()),
        Card::new("Filled Percentage", format!("{:.2}%", kpis.fill_percentage)),
        Card::new("Top Null Column", kpis.top_null_column.clone()),
    ];

    let nulls = Chart::Bar {
        title: "Null Values Percentage by Column".to_string(),
        categories: report
            .null_stats
            .columns
            .iter()
            .map(|c| c.column.clone())
            .collect(),
        series: vec![Series {
            name: "Null Percentage (%)".to_string(),
            color: Some("skyblue".to_string()),
            values: report
                .null_stats
                .columns
                .iter()
                .map(|c| c.null_percentage)
                .collect(),
        }],
    };

    let duplicates = Chart::Pie {
        title: "Percentage of Duplicate Rows".to_string(),
        slices: vec![
            Slice {
                label: "Duplicates".to_string(),
                value: kpis.duplicate_count as f64,
            },
            Slice {
                label: "Non-Duplicates".to_string(),
                value: (kpis.total_rows - kpis.duplicate_count).max(0) as f64,
            },
        ],
    };

    let table = observation_grid(&report.observations);
    RenderedView::OutliersOverview {
        cards,
        nulls,
        duplicates,
        table,
        editor: report.observations,
        pending_edits,
    }
}

// ============================================================================
// Text rendering (CLI)
// ============================================================================

impl Chart {
    fn write_text(&self, out: &mut String) {
        match self {
            Chart::Line { title, x, series, .. } => {
                out.push_str(&format!("{}\n", title));
                for (i, period) in x.iter().enumerate() {
                    let values: Vec<String> = series
                        .iter()
                        .map(|s| format!("{}={}", s.name, s.values.get(i).copied().unwrap_or(0.0)))
                        .collect();
                    out.push_str(&format!("  {}  {}\n", period, values.join("  ")));
                }
            }
            Chart::Bar {
                title,
                categories,
                series,
            } => {
                out.push_str(&format!("{}\n", title));
                for (i, category) in categories.iter().enumerate() {
                    for s in series {
                        let v = s.values.get(i).copied().unwrap_or(0.0);
                        out.push_str(&format!("  {:<24} {:>7.2}\n", category, v));
                    }
                }
            }
            Chart::Pie { title, slices } => {
                out.push_str(&format!("{}\n", title));
                for slice in slices {
                    out.push_str(&format!("  {:<24} {}\n", slice.label, slice.value));
                }
            }
            Chart::NoData { title, message } => {
                out.push_str(&format!("{}\n  {}\n", title, message));
            }
        }
    }
}

fn write_cards(cards: &[Card], out: &mut String) {
    for card in cards {
        out.push_str(&format!("{:<26} {}\n", card.title, card.value));
    }
}

impl RenderedView {
    /// Plain-text rendering for terminals.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        match self {
            RenderedView::InputForm {
                form,
                columns,
                identifier_column,
                message,
                ..
            } => {
                out.push_str(&format!(
                    "{}.{}.{} (warehouse {})\n",
                    form.database, form.schema, form.table, form.warehouse
                ));
                if let Some(message) = message {
                    out.push_str(&format!("{}\n", message));
                }
                for column in columns {
                    let marker = if identifier_column.as_deref() == Some(column.as_str()) {
                        " *"
                    } else {
                        ""
                    };
                    out.push_str(&format!("  {}{}\n", column, marker));
                }
            }
            RenderedView::TableOverview { cards, chart } => {
                write_cards(cards, &mut out);
                out.push('\n');
                chart.write_text(&mut out);
            }
            RenderedView::DataStatistics {
                cards, dml, pruning, ..
            } => {
                write_cards(cards, &mut out);
                out.push('\n');
                dml.write_text(&mut out);
                out.push('\n');
                pruning.write_text(&mut out);
            }
            RenderedView::OutliersOverview {
                cards,
                nulls,
                duplicates,
                table,
                ..
            } => {
                write_cards(cards, &mut out);
                out.push('\n');
                nulls.write_text(&mut out);
                out.push('\n');
                duplicates.write_text(&mut out);
                out.push('\n');
                out.push_str(&format!(
                    "#\t{}\tOBSERVATION\n",
                    table.columns.join("\t")
                ));
                for row in &table.rows {
                    out.push_str(&format!(
                        "{}\t{}\t{}\n",
                        row.index,
                        row.cells.join("\t"),
                        row.observation
                    ));
                }
            }
            RenderedView::Warning { message, .. } => {
                out.push_str(&format!("Warning: {}\n", message));
            }
            RenderedView::Error { message, .. } => {
                out.push_str(&format!("Error: {}\n", message));
            }
        }
        out
    }
}
