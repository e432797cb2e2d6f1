//! TableCheck Quality Engine
//!
//! Everything a dashboard view computes from the warehouse:
//! - **Metadata Reporter**: columns, table overview, storage metrics, history
//! - **Outlier Detector**: null and case-insensitive duplicate rows with KPIs
//! - **Reconciliation Editor**: per-row DELETE/UPDATE of edited observations
//! - **Pages**: the view models each navigation state renders
//!
//! All operations are synchronous and run against one open connection.
//! Nothing is cached; every view refetches.

pub mod history;
pub mod metadata;
pub mod outliers;
pub mod pages;
pub mod reconcile;
pub mod view;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use history::{DmlEvent, Interval, PruningEvent};
pub use metadata::{StorageMetrics, TableSnapshot, TypeCount};
pub use outliers::{ObservationSet, OutlierKpis, OutlierReport};
pub use reconcile::{RowFailure, SaveSummary};
pub use view::RenderedView;

/// `part / whole * 100`, or 0 when `whole` is 0.
///
/// Non-finite results (never expected from counts) collapse to 0.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let pct = part / whole * 100.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}
