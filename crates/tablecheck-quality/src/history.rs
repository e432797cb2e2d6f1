//! DML and pruning history, resampled into calendar buckets.
//!
//! Buckets run contiguously from the first event to the last; gaps are
//! zero-filled. Daily buckets are labelled with the day, weekly buckets end
//! on Sunday and are labelled with that Sunday.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tablecheck_core::{Result, TableCheckError};

/// Resampling interval for history charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
}

impl Interval {
    /// Bucket label for an instant
    pub fn bucket(&self, at: DateTime<Utc>) -> NaiveDate {
        let day = at.date_naive();
        match self {
            Interval::Daily => day,
            Interval::Weekly => {
                let to_sunday = 6 - i64::from(day.weekday().num_days_from_monday());
                day + Duration::days(to_sunday)
            }
        }
    }

    fn step(&self) -> Duration {
        match self {
            Interval::Daily => Duration::days(1),
            Interval::Weekly => Duration::days(7),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Daily => write!(f, "Daily"),
            Interval::Weekly => write!(f, "Weekly"),
        }
    }
}

impl FromStr for Interval {
    type Err = TableCheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Interval::Daily),
            "weekly" | "w" => Ok(Interval::Weekly),
            _ => Err(TableCheckError::Validation(format!(
                "Unknown interval '{}' (expected daily or weekly)",
                s
            ))),
        }
    }
}

/// A timestamped record whose metrics are summed per bucket.
pub trait HistoryEvent {
    /// (label, color) per metric, in `metrics()` order
    const SERIES: &'static [(&'static str, &'static str)];

    fn start_time(&self) -> DateTime<Utc>;

    fn metrics(&self) -> Vec<i64>;
}

/// One row of `TABLE_DML_HISTORY`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DmlEvent {
    pub start_time: DateTime<Utc>,
    pub rows_added: i64,
    pub rows_updated: i64,
    pub rows_removed: i64,
}

impl HistoryEvent for DmlEvent {
    const SERIES: &'static [(&'static str, &'static str)] = &[
        ("Rows Added", "green"),
        ("Rows Updated", "blue"),
        ("Rows Removed", "red"),
    ];

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn metrics(&self) -> Vec<i64> {
        vec![self.rows_added, self.rows_updated, self.rows_removed]
    }
}

/// One row of `TABLE_PRUNING_HISTORY`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PruningEvent {
    pub start_time: DateTime<Utc>,
    pub num_scans: i64,
    pub rows_scanned: i64,
    pub rows_pruned: i64,
    pub partitions_pruned: i64,
    pub partitions_scanned: i64,
}

impl HistoryEvent for PruningEvent {
    const SERIES: &'static [(&'static str, &'static str)] = &[
        ("Number of Scans", "purple"),
        ("Rows Scanned", "orange"),
        ("Rows Pruned", "cyan"),
        ("Partition Pruned", "magenta"),
        ("Partition Scanned", "brown"),
    ];

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn metrics(&self) -> Vec<i64> {
        vec![
            self.num_scans,
            self.rows_scanned,
            self.rows_pruned,
            self.partitions_pruned,
            self.partitions_scanned,
        ]
    }
}

/// Summed metrics for one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub period: NaiveDate,
    pub values: Vec<i64>,
}

/// Sum events into contiguous, zero-filled buckets.
pub fn resample<E: HistoryEvent>(events: &[E], interval: Interval) -> Vec<Bucket> {
    let width = E::SERIES.len();
    let mut sums: BTreeMap<NaiveDate, Vec<i64>> = BTreeMap::new();

    for event in events {
        let slot = sums
            .entry(interval.bucket(event.start_time()))
            .or_insert_with(|| vec![0; width]);
        for (total, value) in slot.iter_mut().zip(event.metrics()) {
            *total = total.saturating_add(value);
        }
    }

    let (Some(&first), Some(&last)) = (sums.keys().next(), sums.keys().next_back()) else {
        return Vec::new();
    };

    let mut buckets = Vec::new();
    let mut period = first;
    while period <= last {
        let values = sums.remove(&period).unwrap_or_else(|| vec![0; width]);
        buckets.push(Bucket { period, values });
        period += interval.step();
    }
    buckets
}
