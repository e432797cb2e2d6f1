//! TableCheck CLI
//!
//! Renders the dashboard views for one table from the command line, and
//! saves reconciliation edits from a JSON file.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tablecheck_core::navigation::{Navigator, TableForm, View};
use tablecheck_quality::outliers::ObservationSet;
use tablecheck_quality::pages;
use tablecheck_quality::{Interval, RenderedView};
use tablecheck_warehouse::{connector_from_config, DynConnector, WarehouseConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "tablecheck")]
#[command(version, about = "TableCheck data-quality CLI", long_about = None)]
struct Cli {
    /// Print view models as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Table selection shared by every command
#[derive(Args, Debug, Clone)]
struct TableArgs {
    /// Compute warehouse (ignored by SQLite)
    #[arg(short, long, env = "TABLECHECK_WAREHOUSE", default_value = "LOCAL")]
    warehouse: String,

    /// Database name, or the database file for SQLite
    #[arg(short, long, env = "TABLECHECK_DATABASE")]
    database: String,

    /// Schema name
    #[arg(short, long, env = "TABLECHECK_SCHEMA")]
    schema: String,

    /// Table name
    #[arg(short, long)]
    table: String,
}

impl From<TableArgs> for TableForm {
    fn from(args: TableArgs) -> Self {
        TableForm {
            warehouse: args.warehouse,
            database: args.database,
            schema: args.schema,
            table: args.table,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the table's columns
    Columns {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Show the table overview and data-type breakdown
    Overview {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Show storage metrics and DML/pruning history
    Stats {
        #[command(flatten)]
        table: TableArgs,

        /// Resampling interval: daily or weekly
        #[arg(short, long, default_value = "daily")]
        interval: Interval,
    },

    /// Find rows with nulls or case-insensitive duplicates
    Outliers {
        #[command(flatten)]
        table: TableArgs,

        /// Column identifying rows
        #[arg(long)]
        id_column: String,
    },

    /// Apply edited observation rows from a JSON file
    Save {
        #[command(flatten)]
        table: TableArgs,

        /// Column identifying rows
        #[arg(long)]
        id_column: String,

        /// Observation set as printed by `outliers --json` under "editor"
        #[arg(long)]
        edits: std::path::PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = WarehouseConfig::from_env()?;
    let connector = connector_from_config(&config)?;
    let connector = connector.as_ref();
    debug!(dialect = connector.dialect().name(), "Warehouse connector ready");

    match cli.command {
        Commands::Columns { table } => {
            let view = load(connector, table)?.1;
            emit(&view, cli.json)
        }
        Commands::Overview { table } => {
            let (nav, _) = load(connector, table)?;
            show(connector, nav, View::TableOverview, Interval::default(), cli.json)
        }
        Commands::Stats { table, interval } => {
            let (nav, _) = load(connector, table)?;
            show(connector, nav, View::DataStatistics, interval, cli.json)
        }
        Commands::Outliers { table, id_column } => {
            let (mut nav, _) = load(connector, table)?;
            pages::confirm_identifier(&mut nav, &id_column)?;
            show(connector, nav, View::OutliersOverview, Interval::default(), cli.json)
        }
        Commands::Save {
            table,
            id_column,
            edits,
        } => save(connector, table, &id_column, &edits, cli.json),
    }
}

/// Submit the table form; an unknown table is an error here.
fn load(connector: &DynConnector, table: TableArgs) -> CliResult<(Navigator, RenderedView)> {
    let mut nav = Navigator::new();
    let view = pages::submit_form(connector, &mut nav, table.into())?;
    if nav.context.columns.is_empty() {
        return Err(tablecheck_quality::view::NO_COLUMNS_FOUND.into());
    }
    Ok((nav, view))
}

fn show(
    connector: &DynConnector,
    mut nav: Navigator,
    view: View,
    interval: Interval,
    json: bool,
) -> CliResult<()> {
    pages::select_view(&mut nav, view);
    let rendered = pages::render(connector, &nav, interval);
    emit(&rendered, json)?;
    match rendered {
        RenderedView::Error { message, .. } => Err(message.into()),
        _ => Ok(()),
    }
}

fn save(
    connector: &DynConnector,
    table: TableArgs,
    id_column: &str,
    path: &std::path::Path,
    json: bool,
) -> CliResult<()> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let edits: ObservationSet = serde_json::from_str(&contents)?;
    debug!(path = %path.display(), rows = edits.rows.len(), "Loaded edits file");

    let (mut nav, _) = load(connector, table)?;
    pages::confirm_identifier(&mut nav, id_column)?;
    let summary = pages::save_edits(connector, &mut nav, &edits)?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Saved {} row(s): {} updated, {} deleted, {} skipped",
            summary.succeeded, summary.updated, summary.deleted, summary.skipped
        );
        for failure in &summary.failed {
            println!("  row {} ({}): {}", failure.index, failure.key, failure.reason);
        }
    }

    if summary.is_complete() {
        Ok(())
    } else {
        Err(format!("{} row(s) failed to save", summary.failed.len()).into())
    }
}

fn emit(view: &RenderedView, json: bool) -> CliResult<()> {
    if json {
        print_json(view)
    } else {
        print!("{}", view.to_text());
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
