//! Input validation for TableCheck
//!
//! Every warehouse, database, schema, table and column name that reaches SQL
//! passes through here first. Names are allow-listed, then always quoted.

use crate::{Result, TableCheckError};

/// Maximum length for any warehouse identifier
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Maximum length for an SQLite database path
pub const MAX_DATABASE_PATH_LEN: usize = 4096;

/// Validate a warehouse identifier
///
/// Requirements:
/// - Not empty
/// - <= 255 characters
/// - Letters, digits, underscore, dollar only
/// - Cannot start with a digit or dollar
pub fn validate_identifier(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TableCheckError::Validation(format!(
            "{} cannot be empty",
            what
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(TableCheckError::Validation(format!(
            "{} too long: {} > {} characters",
            what,
            name.chars().count(),
            MAX_IDENTIFIER_LEN
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    {
        return Err(TableCheckError::Validation(format!(
            "{} contains invalid characters (allowed: letters, digits, _, $): {}",
            what, name
        )));
    }

    if name.starts_with(|c: char| c.is_ascii_digit() || c == '$') {
        return Err(TableCheckError::Validation(format!(
            "{} cannot start with a digit or $: {}",
            what, name
        )));
    }

    Ok(())
}

/// Validate an SQLite database path
///
/// `:memory:` is accepted. Paths may be absolute but must not traverse
/// upwards or embed null bytes.
pub fn validate_database_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(TableCheckError::Validation(
            "Database path cannot be empty".to_string(),
        ));
    }

    if path.len() > MAX_DATABASE_PATH_LEN {
        return Err(TableCheckError::Validation(format!(
            "Database path too long: {} > {} characters",
            path.len(),
            MAX_DATABASE_PATH_LEN
        )));
    }

    if path.contains('\0') {
        return Err(TableCheckError::Validation(
            "Database path contains null byte".to_string(),
        ));
    }

    if path.split(['/', '\\']).any(|part| part == "..") {
        return Err(TableCheckError::Validation(
            "Database path contains traversal pattern (..)".to_string(),
        ));
    }

    Ok(())
}

/// Quote an identifier for use in SQL.
///
/// Embedded double quotes are doubled. Callers validate first; quoting is
/// applied regardless so case is preserved.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("CUSTOMERS", "Table name").is_ok());
        assert!(validate_identifier("customer_id", "Column name").is_ok());
        assert!(validate_identifier("_staging", "Schema name").is_ok());
        assert!(validate_identifier("COMPUTE_WH", "Warehouse name").is_ok());
        assert!(validate_identifier("A$B", "Column name").is_ok());
        assert!(validate_identifier(&"a".repeat(255), "Column name").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("", "Table name").is_err()); // Empty
        assert!(validate_identifier(&"a".repeat(256), "Table name").is_err()); // Too long
        assert!(validate_identifier("1ST", "Table name").is_err()); // Leading digit
        assert!(validate_identifier("$X", "Table name").is_err()); // Leading dollar
        assert!(validate_identifier("my table", "Table name").is_err()); // Space
        assert!(validate_identifier("t\"; DROP TABLE x; --", "Table name").is_err());
        assert!(validate_identifier("a.b", "Table name").is_err()); // Dot
    }

    #[test]
    fn test_error_names_the_field() {
        let err = validate_identifier("", "Schema name").unwrap_err();
        assert!(err.to_string().contains("Schema name"));
    }

    #[test]
    fn test_validate_database_path() {
        assert!(validate_database_path(":memory:").is_ok());
        assert!(validate_database_path("/var/data/warehouse.db").is_ok());
        assert!(validate_database_path("local.db").is_ok());
        assert!(validate_database_path("").is_err());
        assert!(validate_database_path("../secret.db").is_err());
        assert!(validate_database_path("/data/../etc/x.db").is_err());
        assert!(validate_database_path("x\0.db").is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("EMAIL"), "\"EMAIL\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
