//! Navigation state machine
//!
//! One `Navigator` per user session. It owns the session context, the view
//! currently shown and any edits that failed to save. Transitions are the only
//! way the context changes.

use crate::{ObservationRow, Result, SessionContext, TableCheckError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Warning shown by every view that needs a submitted input form
pub const LOGIN_REQUIRED: &str = "Please enter the login information on the home page.";

/// Warning shown by the outliers view without a confirmed identifier column
pub const IDENTIFIER_REQUIRED: &str =
    "Please select and confirm an identifier column on the home page.";

/// The four screens of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    InputForm,
    TableOverview,
    OutliersOverview,
    DataStatistics,
}

impl View {
    pub const ALL: [View; 4] = [
        View::InputForm,
        View::TableOverview,
        View::OutliersOverview,
        View::DataStatistics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::InputForm => "input_form",
            View::TableOverview => "table_overview",
            View::OutliersOverview => "outliers_overview",
            View::DataStatistics => "data_statistics",
        }
    }

    /// Menu label
    pub fn title(&self) -> &'static str {
        match self {
            View::InputForm => "Input Form",
            View::TableOverview => "Table Overview",
            View::OutliersOverview => "Outliers Overview",
            View::DataStatistics => "Data Statistics",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

impl FromStr for View {
    type Err = TableCheckError;

    fn from_str(s: &str) -> Result<Self> {
        View::ALL
            .into_iter()
            .find(|v| v.as_str() == s || v.title().eq_ignore_ascii_case(s))
            .ok_or_else(|| TableCheckError::Validation(format!("Unknown view: {}", s)))
    }
}

/// Values entered on the input form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableForm {
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub table: String,
}

/// Inputs that move the shell between views
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Menu selection; any view to any view
    Select(View),
    /// Form submitted; `columns` is what the catalog returned for the table
    Submit { form: TableForm, columns: Vec<String> },
    /// Identifier chosen; redirects to the table overview
    ConfirmIdentifier(String),
}

/// Per-session navigation state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Navigator {
    pub view: View,
    pub context: SessionContext,
    /// Observation rows whose last save attempt failed
    #[serde(default)]
    pub pending_edits: Vec<ObservationRow>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a transition and return the view now shown.
    ///
    /// On error the state is left untouched.
    pub fn apply(&mut self, transition: Transition) -> Result<View> {
        match transition {
            Transition::Select(view) => {
                self.view = view;
            }
            Transition::Submit { form, columns } => {
                let ctx = &mut self.context;
                ctx.warehouse = form.warehouse;
                ctx.database = form.database;
                ctx.schema = form.schema;
                ctx.table = form.table;
                ctx.loaded = true;
                ctx.identifier_column = None;
                // Empty catalog result means an unknown table; stale columns must not survive it
                ctx.columns = columns;
                self.pending_edits.clear();
                self.view = View::InputForm;
            }
            Transition::ConfirmIdentifier(column) => {
                if !self.context.loaded {
                    return Err(TableCheckError::Navigation(LOGIN_REQUIRED.to_string()));
                }
                if !self.context.columns.iter().any(|c| c == &column) {
                    return Err(TableCheckError::Validation(format!(
                        "Unknown identifier column for {}: {}",
                        self.context.table, column
                    )));
                }
                self.context.identifier_column = Some(column);
                self.pending_edits.clear();
                self.view = View::TableOverview;
            }
        }
        Ok(self.view)
    }

    /// Warning to show instead of `view`, when its preconditions are unmet.
    pub fn requirement(&self, view: View) -> Option<&'static str> {
        match view {
            View::InputForm => None,
            _ if !self.context.loaded => Some(LOGIN_REQUIRED),
            View::OutliersOverview if self.context.identifier().is_err() => {
                Some(IDENTIFIER_REQUIRED)
            }
            _ => None,
        }
    }
}
