use chrono::NaiveDate;
use thiserror::Error;

use super::heatmap::CalendarView;

/// Reasons an aggregation or a heatmap projection can be rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// Placing such a point anywhere would put it into the wrong bucket, so the whole call fails.
    #[error("Data point {id} has a malformed timestamp {timestamp:?}")]
    MalformedTimestamp { id: String, timestamp: String },

    #[error("Moving {steps} {view} views from {anchor} leaves the supported calendar")]
    OutOfRange {
        anchor: NaiveDate,
        view: CalendarView,
        steps: i32,
    },
}
