//! TableCheck Warehouse Gateway
//!
//! Connector abstraction over the data warehouse. Every view opens a fresh
//! connection through a [`Connector`], runs its statements, and closes it.
//! There is no pooling and no result cache.
//!
//! Supported backends:
//! - Snowflake (HTTP session protocol)
//! - SQLite (local database file)

use tablecheck_core::{Result, SessionContext, TableCheckError, Value};
use tracing::{debug, warn};

pub mod config;
pub mod dialect;
pub mod snowflake;
pub mod sqlite;

pub use config::{BackendKind, WarehouseConfig};
pub use dialect::{Dialect, SnowflakeDialect, SqliteDialect, Statement, TableTarget};
pub use snowflake::SnowflakeConnector;
pub use sqlite::SqliteConnector;

/// Convenience alias for trait objects.
pub type DynConnector = dyn Connector;

/// Session-scoped connection parameters taken from the session context.
///
/// Credentials never travel through here; they live in the connector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    pub warehouse: String,
    pub database: String,
    pub schema: String,
}

impl ConnectionParams {
    pub fn new(
        warehouse: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            warehouse: warehouse.into(),
            database: database.into(),
            schema: schema.into(),
        }
    }

    pub fn from_context(ctx: &SessionContext) -> Self {
        Self::new(&ctx.warehouse, &ctx.database, &ctx.schema)
    }
}

/// Rows returned by a query, with column labels in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First cell of the first row.
    pub fn into_first_cell(self) -> Option<Value> {
        self.rows.into_iter().next().and_then(|r| r.into_iter().next())
    }

    /// Position of a column label, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// An open warehouse session.
///
/// Values are always bound positionally; SQL text never carries user data
/// other than validated, quoted identifiers.
pub trait WarehouseConnection {
    /// SQL dialect spoken by this connection
    fn dialect(&self) -> &dyn Dialect;

    /// Run a statement that returns rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet>;

    /// Run a statement that modifies rows; returns the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// First cell of the first row, or `None` when no row comes back.
    fn query_scalar(&mut self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self.query(sql, params)?.into_first_cell())
    }

    /// Run a dialect-generated statement.
    fn run(&mut self, statement: &Statement) -> Result<ResultSet> {
        self.query(&statement.sql, &statement.params)
    }

    /// End the session.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens warehouse connections with credentials held by the connector.
pub trait Connector: Send + Sync {
    /// SQL dialect of connections produced by this connector
    fn dialect(&self) -> &dyn Dialect;

    /// Open a session for the given warehouse, database and schema.
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn WarehouseConnection>>;
}

/// Build a connector for the configured backend.
pub fn connector_from_config(config: &WarehouseConfig) -> Result<Box<DynConnector>> {
    config.validate()?;
    match config.backend {
        BackendKind::Snowflake => Ok(Box::new(SnowflakeConnector::new(config.clone())?)),
        BackendKind::Sqlite => Ok(Box::new(SqliteConnector::new())),
    }
}

/// Open a connection, run `f`, and close the connection whatever `f` returns.
///
/// Identifiers in `params` are validated by the connector's dialect before
/// anything reaches the warehouse.
pub fn with_connection<T, F>(connector: &DynConnector, params: &ConnectionParams, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn WarehouseConnection) -> Result<T>,
{
    connector.dialect().validate_params(params)?;

    debug!(
        warehouse = %params.warehouse,
        database = %params.database,
        schema = %params.schema,
        "Opening warehouse connection"
    );
    let mut conn = connector.connect(params)?;
    let result = f(conn.as_mut());

    if let Err(e) = conn.close() {
        warn!(error = %e, "Failed to close warehouse connection");
    }

    result
}

/// Validate that a column name exists in the catalog column list.
///
/// Catalog names may hold any character (`"first name"`); membership is the
/// check, and callers always quote the name.
pub fn ensure_known_column(columns: &[String], column: &str) -> Result<()> {
    if column.is_empty() {
        return Err(TableCheckError::Validation(
            "Column name cannot be empty".to_string(),
        ));
    }
    if columns.iter().any(|c| c == column) {
        Ok(())
    } else {
        Err(TableCheckError::Validation(format!(
            "Column not in table catalog: {}",
            column
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_set_first_cell() {
        let rs = ResultSet {
            columns: vec!["N".to_string()],
            rows: vec![vec![Value::Integer(3)], vec![Value::Integer(4)]],
        };
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.column_index("n"), Some(0));
        assert_eq!(rs.into_first_cell(), Some(Value::Integer(3)));

        assert_eq!(ResultSet::default().into_first_cell(), None);
    }

    #[test]
    fn test_params_from_context() {
        let ctx = SessionContext {
            warehouse: "WH".to_string(),
            database: "DB".to_string(),
            schema: "PUBLIC".to_string(),
            table: "T".to_string(),
            ..Default::default()
        };
        assert_eq!(
            ConnectionParams::from_context(&ctx),
            ConnectionParams::new("WH", "DB", "PUBLIC")
        );
    }

    #[test]
    fn test_ensure_known_column() {
        let cols = vec!["ID".to_string(), "NAME".to_string()];
        assert!(ensure_known_column(&cols, "NAME").is_ok());
        assert!(ensure_known_column(&cols, "name").is_err());
        assert!(ensure_known_column(&cols, "EMAIL").is_err());
        assert!(ensure_known_column(&cols, "x; --").is_err());
        assert!(ensure_known_column(&cols, "").is_err());
    }

    #[test]
    fn test_catalog_column_with_space_is_known() {
        let cols = vec!["ID".to_string(), "first name".to_string()];
        assert!(ensure_known_column(&cols, "first name").is_ok());
        assert!(ensure_known_column(&cols, "first").is_err());
    }

    #[test]
    fn test_with_connection_validates_before_connecting() {
        let connector = SqliteConnector::new();
        let params = ConnectionParams::new("", ":memory:", "bad schema");
        let err = with_connection(&connector, &params, |_| Ok(())).unwrap_err();
        assert!(matches!(err, TableCheckError::Validation(_)));
    }
}
