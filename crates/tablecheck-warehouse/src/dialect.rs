//! SQL dialects for catalog, storage and history lookups.
//!
//! Each backend answers the same metadata questions from different system
//! views. Identifiers are validated and quoted here; values are returned as
//! bound parameters alongside the SQL.

use crate::ConnectionParams;
use tablecheck_core::validation::{quote_identifier, validate_database_path, validate_identifier};
use tablecheck_core::{Result, SessionContext, TableCheckError, Value};

/// SQL text plus positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// The table a view is looking at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TableTarget {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn from_context(ctx: &SessionContext) -> Self {
        Self::new(&ctx.database, &ctx.schema, &ctx.table)
    }
}

/// Per-backend producer of catalog and history SQL.
///
/// Storage metrics and history are optional: a dialect returns `None` when
/// its backend does not track them, and callers render that as unavailable.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validate session parameters before connecting.
    fn validate_params(&self, params: &ConnectionParams) -> Result<()>;

    /// Validate a table target before generating SQL for it.
    fn validate_target(&self, target: &TableTarget) -> Result<()>;

    /// Name as stored in the catalog for an identifier typed by the user.
    fn catalog_name(&self, name: &str) -> String {
        name.to_string()
    }

    /// Fully qualified, quoted table reference.
    fn table_ref(&self, target: &TableTarget) -> Result<String>;

    /// Column names in ordinal order. One column, one row per column.
    fn columns(&self, target: &TableTarget) -> Result<Statement>;

    /// One row of table metadata with twelve columns: database, schema,
    /// table, last altered, last DDL, last DDL by, created, comment, owner,
    /// column count, row count, distinct type count.
    fn table_overview(&self, target: &TableTarget) -> Result<Statement>;

    /// Rows of (data type, column count).
    fn column_types(&self, target: &TableTarget) -> Result<Statement>;

    fn failsafe_bytes(&self, target: &TableTarget) -> Result<Option<Statement>>;

    fn retention_days(&self, target: &TableTarget) -> Result<Option<Statement>>;

    fn time_travel_bytes(&self, target: &TableTarget) -> Result<Option<Statement>>;

    /// Rows of (start time, rows added, rows updated, rows removed).
    fn dml_history(&self, target: &TableTarget) -> Result<Option<Statement>>;

    /// Rows of (start time, scans, rows scanned, rows pruned, partitions
    /// pruned, partitions scanned).
    fn pruning_history(&self, target: &TableTarget) -> Result<Option<Statement>>;

    /// Lower-cased text form of an expression, for case-insensitive grouping.
    fn lower_text(&self, expr: &str) -> String {
        format!("LOWER(CAST({} AS VARCHAR))", expr)
    }
}

// ============================================================================
// Snowflake
// ============================================================================

/// Snowflake: `INFORMATION_SCHEMA` and `SNOWFLAKE.ACCOUNT_USAGE` views.
///
/// Unquoted Snowflake identifiers are stored upper-case, so user input is
/// upper-cased before it is quoted or bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnowflakeDialect;

impl SnowflakeDialect {
    fn information_schema(&self, target: &TableTarget) -> String {
        format!(
            "{}.INFORMATION_SCHEMA",
            quote_identifier(&self.catalog_name(&target.database))
        )
    }

    fn schema_and_table(&self, target: &TableTarget) -> Vec<Value> {
        vec![
            Value::Text(self.catalog_name(&target.schema)),
            Value::Text(self.catalog_name(&target.table)),
        ]
    }

    fn qualified(&self, target: &TableTarget) -> Vec<Value> {
        vec![
            Value::Text(self.catalog_name(&target.database)),
            Value::Text(self.catalog_name(&target.schema)),
            Value::Text(self.catalog_name(&target.table)),
        ]
    }

    fn storage_metric(&self, target: &TableTarget, metric: &str) -> Result<Option<Statement>> {
        self.validate_target(target)?;
        Ok(Some(Statement::new(
            format!(
                "SELECT {} FROM {}.TABLE_STORAGE_METRICS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND DELETED = FALSE",
                metric,
                self.information_schema(target)
            ),
            self.schema_and_table(target),
        )))
    }
}

impl Dialect for SnowflakeDialect {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn validate_params(&self, params: &ConnectionParams) -> Result<()> {
        validate_identifier(&params.warehouse, "Warehouse name")?;
        validate_identifier(&params.database, "Database name")?;
        validate_identifier(&params.schema, "Schema name")
    }

    fn validate_target(&self, target: &TableTarget) -> Result<()> {
        validate_identifier(&target.database, "Database name")?;
        validate_identifier(&target.schema, "Schema name")?;
        validate_identifier(&target.table, "Table name")
    }

    fn catalog_name(&self, name: &str) -> String {
        name.to_uppercase()
    }

    fn table_ref(&self, target: &TableTarget) -> Result<String> {
        self.validate_target(target)?;
        Ok(format!(
            "{}.{}.{}",
            quote_identifier(&self.catalog_name(&target.database)),
            quote_identifier(&self.catalog_name(&target.schema)),
            quote_identifier(&self.catalog_name(&target.table))
        ))
    }

    fn columns(&self, target: &TableTarget) -> Result<Statement> {
        self.validate_target(target)?;
        Ok(Statement::new(
            format!(
                "SELECT COLUMN_NAME FROM {}.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                self.information_schema(target)
            ),
            self.schema_and_table(target),
        ))
    }

    fn table_overview(&self, target: &TableTarget) -> Result<Statement> {
        self.validate_target(target)?;
        let info = self.information_schema(target);
        Ok(Statement::new(
            format!(
                "SELECT \
                   t.TABLE_CATALOG AS \"Database Name\", \
                   t.TABLE_SCHEMA AS \"Schema Name\", \
                   t.TABLE_NAME AS \"Table Name\", \
                   t.LAST_ALTERED AS \"LAST_ALTERED\", \
                   t.LAST_DDL AS \"LAST_DDL\", \
                   t.LAST_DDL_BY AS \"LAST_DDL_BY\", \
                   t.CREATED AS \"Created At\", \
                   t.COMMENT AS \"Comment\", \
                   t.TABLE_OWNER AS \"Table Owner\", \
                   (SELECT COUNT(*) FROM {info}.COLUMNS c \
                     WHERE c.TABLE_SCHEMA = t.TABLE_SCHEMA AND c.TABLE_NAME = t.TABLE_NAME) \
                     AS \"Total Number of Columns\", \
                   t.ROW_COUNT AS \"Total Number of Rows\", \
                   (SELECT COUNT(DISTINCT c.DATA_TYPE) FROM {info}.COLUMNS c \
                     WHERE c.TABLE_SCHEMA = t.TABLE_SCHEMA AND c.TABLE_NAME = t.TABLE_NAME) \
                     AS \"Total Number of Types\" \
                 FROM {info}.TABLES t \
                 WHERE t.TABLE_SCHEMA = ? AND t.TABLE_NAME = ?",
                info = info
            ),
            self.schema_and_table(target),
        ))
    }

    fn column_types(&self, target: &TableTarget) -> Result<Statement> {
        self.validate_target(target)?;
        Ok(Statement::new(
            format!(
                "SELECT DATA_TYPE, COUNT(*) AS COUNT FROM {}.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 GROUP BY DATA_TYPE ORDER BY DATA_TYPE",
                self.information_schema(target)
            ),
            self.schema_and_table(target),
        ))
    }

    fn failsafe_bytes(&self, target: &TableTarget) -> Result<Option<Statement>> {
        self.storage_metric(target, "FAILSAFE_BYTES")
    }

    fn retention_days(&self, target: &TableTarget) -> Result<Option<Statement>> {
        self.validate_target(target)?;
        Ok(Some(Statement::new(
            format!(
                "SELECT RETENTION_TIME FROM {}.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
                self.information_schema(target)
            ),
            self.schema_and_table(target),
        )))
    }

    fn time_travel_bytes(&self, target: &TableTarget) -> Result<Option<Statement>> {
        self.storage_metric(target, "TIME_TRAVEL_BYTES")
    }

    fn dml_history(&self, target: &TableTarget) -> Result<Option<Statement>> {
        self.validate_target(target)?;
        Ok(Some(Statement::new(
            "SELECT START_TIME, ROWS_ADDED, ROWS_UPDATED, ROWS_REMOVED \
             FROM SNOWFLAKE.ACCOUNT_USAGE.TABLE_DML_HISTORY \
             WHERE DATABASE_NAME = ? AND SCHEMA_NAME = ? AND TABLE_NAME = ? \
             ORDER BY START_TIME",
            self.qualified(target),
        )))
    }

    fn pruning_history(&self, target: &TableTarget) -> Result<Option<Statement>> {
        self.validate_target(target)?;
        Ok(Some(Statement::new(
            "SELECT START_TIME, NUM_SCANS, ROWS_SCANNED, ROWS_PRUNED, \
                    PARTITIONS_PRUNED, PARTITIONS_SCANNED \
             FROM SNOWFLAKE.ACCOUNT_USAGE.TABLE_PRUNING_HISTORY \
             WHERE DATABASE_NAME = ? AND SCHEMA_NAME = ? AND TABLE_NAME = ? \
             ORDER BY START_TIME",
            self.qualified(target),
        )))
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite: `sqlite_master` and `pragma_table_info`.
///
/// The database is a file path and the only schema is `main`. SQLite keeps no
/// storage or DML statistics, so those lookups are unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

/// The only schema an SQLite session exposes
pub const SQLITE_SCHEMA: &str = "main";

fn validate_sqlite_schema(schema: &str) -> Result<()> {
    if schema.eq_ignore_ascii_case(SQLITE_SCHEMA) {
        Ok(())
    } else {
        Err(TableCheckError::Validation(format!(
            "SQLite schema must be '{}', got '{}'",
            SQLITE_SCHEMA, schema
        )))
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn validate_params(&self, params: &ConnectionParams) -> Result<()> {
        validate_database_path(&params.database)?;
        validate_sqlite_schema(&params.schema)
    }

    fn validate_target(&self, target: &TableTarget) -> Result<()> {
        validate_database_path(&target.database)?;
        validate_sqlite_schema(&target.schema)?;
        validate_identifier(&target.table, "Table name")
    }

    fn table_ref(&self, target: &TableTarget) -> Result<String> {
        self.validate_target(target)?;
        Ok(format!(
            "{}.{}",
            quote_identifier(SQLITE_SCHEMA),
            quote_identifier(&target.table)
        ))
    }

    fn columns(&self, target: &TableTarget) -> Result<Statement> {
        self.validate_target(target)?;
        Ok(Statement::new(
            "SELECT name FROM pragma_table_info(?) ORDER BY cid",
            vec![Value::Text(target.table.clone())],
        ))
    }

    fn table_overview(&self, target: &TableTarget) -> Result<Statement> {
        let table_ref = self.table_ref(target)?;
        Ok(Statement::new(
            format!(
                "SELECT \
                   ? AS \"Database Name\", \
                   '{schema}' AS \"Schema Name\", \
                   m.name AS \"Table Name\", \
                   NULL AS \"LAST_ALTERED\", \
                   NULL AS \"LAST_DDL\", \
                   NULL AS \"LAST_DDL_BY\", \
                   NULL AS \"Created At\", \
                   NULL AS \"Comment\", \
                   NULL AS \"Table Owner\", \
                   (SELECT COUNT(*) FROM pragma_table_info(m.name)) AS \"Total Number of Columns\", \
                   (SELECT COUNT(*) FROM {table_ref}) AS \"Total Number of Rows\", \
                   (SELECT COUNT(DISTINCT type) FROM pragma_table_info(m.name)) AS \"Total Number of Types\" \
                 FROM sqlite_master m \
                 WHERE m.type = 'table' AND m.name = ?",
                schema = SQLITE_SCHEMA,
                table_ref = table_ref
            ),
            vec![
                Value::Text(target.database.clone()),
                Value::Text(target.table.clone()),
            ],
        ))
    }

    fn column_types(&self, target: &TableTarget) -> Result<Statement> {
        self.validate_target(target)?;
        Ok(Statement::new(
            "SELECT type AS DATA_TYPE, COUNT(*) AS COUNT FROM pragma_table_info(?) \
             GROUP BY type ORDER BY type",
            vec![Value::Text(target.table.clone())],
        ))
    }

    fn failsafe_bytes(&self, _target: &TableTarget) -> Result<Option<Statement>> {
        Ok(None)
    }

    fn retention_days(&self, _target: &TableTarget) -> Result<Option<Statement>> {
        Ok(None)
    }

    fn time_travel_bytes(&self, _target: &TableTarget) -> Result<Option<Statement>> {
        Ok(None)
    }

    fn dml_history(&self, _target: &TableTarget) -> Result<Option<Statement>> {
        Ok(None)
    }

    fn pruning_history(&self, _target: &TableTarget) -> Result<Option<Statement>> {
        Ok(None)
    }

    fn lower_text(&self, expr: &str) -> String {
        format!("LOWER(CAST({} AS TEXT))", expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TableTarget {
        TableTarget::new("sales", "public", "customers")
    }

    #[test]
    fn test_snowflake_uppercases_and_binds() {
        let stmt = SnowflakeDialect.columns(&target()).unwrap();
        assert!(stmt.sql.contains("\"SALES\".INFORMATION_SCHEMA.COLUMNS"));
        assert!(stmt.sql.contains("ORDER BY ORDINAL_POSITION"));
        assert_eq!(
            stmt.params,
            vec![Value::from("PUBLIC"), Value::from("CUSTOMERS")]
        );
    }

    #[test]
    fn test_snowflake_table_ref() {
        assert_eq!(
            SnowflakeDialect.table_ref(&target()).unwrap(),
            "\"SALES\".\"PUBLIC\".\"CUSTOMERS\""
        );
    }

    #[test]
    fn test_snowflake_rejects_bad_identifiers() {
        let bad = TableTarget::new("sales", "public", "customers; DROP TABLE x");
        assert!(SnowflakeDialect.table_ref(&bad).is_err());
        assert!(SnowflakeDialect.columns(&bad).is_err());
        assert!(SnowflakeDialect
            .validate_params(&ConnectionParams::new("", "DB", "PUBLIC"))
            .is_err());
    }

    #[test]
    fn test_snowflake_overview_has_twelve_columns() {
        let stmt = SnowflakeDialect.table_overview(&target()).unwrap();
        for label in [
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
        ] {
            assert!(stmt.sql.contains(&format!("\"{}\"", label)), "{}", label);
        }
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_snowflake_history_sources() {
        let dml = SnowflakeDialect.dml_history(&target()).unwrap().unwrap();
        assert!(dml.sql.contains("SNOWFLAKE.ACCOUNT_USAGE.TABLE_DML_HISTORY"));
        assert_eq!(dml.params.len(), 3);

        let pruning = SnowflakeDialect.pruning_history(&target()).unwrap().unwrap();
        assert!(pruning.sql.contains("TABLE_PRUNING_HISTORY"));

        let failsafe = SnowflakeDialect.failsafe_bytes(&target()).unwrap().unwrap();
        assert!(failsafe.sql.starts_with("SELECT FAILSAFE_BYTES"));
        let retention = SnowflakeDialect.retention_days(&target()).unwrap().unwrap();
        assert!(retention.sql.starts_with("SELECT RETENTION_TIME"));
    }

    #[test]
    fn test_sqlite_keeps_case_and_requires_main() {
        let t = TableTarget::new(":memory:", "main", "Customers");
        assert_eq!(
            SqliteDialect.table_ref(&t).unwrap(),
            "\"main\".\"Customers\""
        );

        let other = TableTarget::new(":memory:", "public", "Customers");
        assert!(SqliteDialect.table_ref(&other).is_err());
    }

    #[test]
    fn test_sqlite_has_no_statistics() {
        let t = TableTarget::new(":memory:", "main", "t");
        assert!(SqliteDialect.failsafe_bytes(&t).unwrap().is_none());
        assert!(SqliteDialect.retention_days(&t).unwrap().is_none());
        assert!(SqliteDialect.time_travel_bytes(&t).unwrap().is_none());
        assert!(SqliteDialect.dml_history(&t).unwrap().is_none());
        assert!(SqliteDialect.pruning_history(&t).unwrap().is_none());
    }

    #[test]
    fn test_lower_text() {
        assert_eq!(
            SnowflakeDialect.lower_text("\"NAME\""),
            "LOWER(CAST(\"NAME\" AS VARCHAR))"
        );
        assert_eq!(
            SqliteDialect.lower_text("\"NAME\""),
            "LOWER(CAST(\"NAME\" AS TEXT))"
        );
    }
}
