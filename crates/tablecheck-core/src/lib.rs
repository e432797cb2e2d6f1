//! TableCheck Core
//!
//! Core types, errors, identifier validation and the navigation state machine
//! shared by the TableCheck warehouse gateway, quality engine, API and CLI.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod navigation;
pub mod validation;

/// Display marker for a metric that has no value
pub const NOT_AVAILABLE: &str = "N/A";

/// Display token for a null cell in the observation grid
pub const NULL_TOKEN: &str = "null";

// ============================================================================
// Cell Values
// ============================================================================

/// A single cell returned by (or bound to) the warehouse.
///
/// Arbitrary-precision decimals are decoded as `Float` so every value is
/// display-safe. Serializes as plain JSON (null, bool, number, string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value, used for counts and history metrics.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Boolean(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Timestamp view of the value. Text is accepted in RFC 3339 or
    /// `YYYY-MM-DD HH:MM:SS` form (the latter read as UTC).
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            Value::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                        .ok()
                        .map(|dt| dt.and_utc())
                }),
            _ => None,
        }
    }

    /// Text shown in the observation grid: nulls become the `"null"` token.
    pub fn grid_text(&self) -> String {
        match self {
            Value::Null => NULL_TOKEN.to_string(),
            other => other.to_string(),
        }
    }

    /// Key used for full-row equality. Keeps a real null apart from the
    /// string `"null"`.
    fn identity_key(&self) -> String {
        match self {
            Value::Null => "\0".to_string(),
            Value::Text(s) => format!("t:{}", s),
            other => format!("v:{}", other),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "{}", NOT_AVAILABLE),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Session Context
// ============================================================================

/// Per-session selection of the table under inspection.
///
/// Owned by the navigation shell and passed explicitly to every operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub table: String,
    /// Column chosen to address rows for update/delete
    pub identifier_column: Option<String>,
    /// Catalog column names in ordinal order
    pub columns: Vec<String>,
    /// Set once the input form has been submitted
    pub loaded: bool,
}

impl SessionContext {
    /// Confirmed identifier column, or a navigation error.
    pub fn identifier(&self) -> Result<&str> {
        self.identifier_column
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                TableCheckError::Navigation("No identifier column has been confirmed".to_string())
            })
    }
}

// ============================================================================
// Observations
// ============================================================================

/// Why a row was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObservationTag {
    /// At least one cell is null
    #[serde(rename = "NULL")]
    Null,
    /// Part of a case-insensitive duplicate group
    #[serde(rename = "DUPLICATED")]
    Duplicated,
}

impl std::fmt::Display for ObservationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservationTag::Null => write!(f, "NULL"),
            ObservationTag::Duplicated => write!(f, "DUPLICATED"),
        }
    }
}

/// A flagged source row, editable in the reconciliation grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    /// 1-based display index
    pub index: usize,
    /// Identifier value as read from the source; the update/delete key
    pub key: Value,
    /// Cell values aligned with the observation set's columns
    pub cells: Vec<Value>,
    pub observation: ObservationTag,
    #[serde(default)]
    pub delete: bool,
}

impl ObservationRow {
    /// Derive the statement intent for this row at save time.
    pub fn intent(&self, columns: &[String]) -> EditIntent {
        if self.delete {
            EditIntent::Delete {
                key: self.key.clone(),
            }
        } else {
            EditIntent::Update {
                key: self.key.clone(),
                assignments: columns
                    .iter()
                    .cloned()
                    .zip(self.cells.iter().cloned())
                    .collect(),
            }
        }
    }
}

/// Drop rows equal in every cell and in tag, keeping the first occurrence.
pub fn dedup_rows(rows: Vec<(Vec<Value>, ObservationTag)>) -> Vec<(Vec<Value>, ObservationTag)> {
    let mut seen: HashSet<(Vec<String>, ObservationTag)> = HashSet::new();
    rows.into_iter()
        .filter(|(cells, tag)| {
            let key: Vec<String> = cells.iter().map(Value::identity_key).collect();
            seen.insert((key, *tag))
        })
        .collect()
}

/// What saving an observation row does to the source table
#[derive(Debug, Clone, PartialEq)]
pub enum EditIntent {
    Delete {
        key: Value,
    },
    Update {
        key: Value,
        assignments: Vec<(String, Value)>,
    },
}

impl EditIntent {
    pub fn key(&self) -> &Value {
        match self {
            EditIntent::Delete { key } | EditIntent::Update { key, .. } => key,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur anywhere in TableCheck
#[derive(Debug, thiserror::Error)]
pub enum TableCheckError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for TableCheck operations
pub type Result<T> = std::result::Result<T, TableCheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "N/A");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Float(1234.5).to_string(), "1234.5");
        let ts = DateTime::parse_from_rfc3339("2024-03-01T10:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Value::Timestamp(ts).to_string(), "2024-03-01 10:15:00");
    }

    #[test]
    fn test_grid_text_marks_nulls() {
        assert_eq!(Value::Null.grid_text(), "null");
        assert_eq!(Value::from("null").grid_text(), "null");
        assert_eq!(Value::from("ann").grid_text(), "ann");
    }

    #[test]
    fn test_value_json_is_plain() {
        let cells = vec![
            Value::Null,
            Value::Boolean(true),
            Value::Integer(7),
            Value::from("x"),
        ];
        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(json, r#"[null,true,7,"x"]"#);

        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cells);
    }

    #[test]
    fn test_as_timestamp_from_text() {
        let v = Value::from("2024-01-02 03:04:05");
        let ts = v.as_timestamp().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        assert!(Value::from("yesterday").as_timestamp().is_none());
    }

    #[test]
    fn test_intent_delete_and_update() {
        let columns = vec!["ID".to_string(), "NAME".to_string()];
        let mut row = ObservationRow {
            index: 1,
            key: Value::Integer(3),
            cells: vec![Value::Integer(3), Value::from("Bob")],
            observation: ObservationTag::Duplicated,
            delete: false,
        };

        match row.intent(&columns) {
            EditIntent::Update { key, assignments } => {
                assert_eq!(key, Value::Integer(3));
                assert_eq!(assignments.len(), 2);
                assert_eq!(assignments[1], ("NAME".to_string(), Value::from("Bob")));
            }
            other => panic!("expected update, got {:?}", other),
        }

        row.delete = true;
        assert_eq!(
            row.intent(&columns),
            EditIntent::Delete {
                key: Value::Integer(3)
            }
        );
    }

    #[test]
    fn test_dedup_rows_respects_tag_and_null() {
        let a = vec![Value::Integer(1), Value::Null];
        let b = vec![Value::Integer(1), Value::from("null")];
        let rows = vec![
            (a.clone(), ObservationTag::Null),
            (a.clone(), ObservationTag::Null),
            (a.clone(), ObservationTag::Duplicated),
            (b.clone(), ObservationTag::Null),
        ];
        let deduped = dedup_rows(rows);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0], (a.clone(), ObservationTag::Null));
        assert_eq!(deduped[1], (a, ObservationTag::Duplicated));
        assert_eq!(deduped[2], (b, ObservationTag::Null));
    }

    #[test]
    fn test_identifier_required() {
        let mut ctx = SessionContext::default();
        assert!(ctx.identifier().is_err());
        ctx.identifier_column = Some(String::new());
        assert!(ctx.identifier().is_err());
        ctx.identifier_column = Some("ID".to_string());
        assert_eq!(ctx.identifier().unwrap(), "ID");
    }
}
