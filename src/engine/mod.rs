//! Turns stored data points into chart series and calendar grids. Everything here is synchronous
//! and works on borrowed input, results are recomputed on every call.

use std::fmt::Display;

use chrono::TimeZone;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::storage::entities::{DataPoint, Tracker};

use self::{
    bucketing::{bucket, Interval},
    error::AggregationError,
    reduction::{effective_operator, reduce, summarize_notes, Operator},
};

pub mod bucketing;
pub mod error;
pub mod heatmap;
pub mod reduction;

/// One point of a chart series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPoint {
    /// Start of the bucket in epoch milliseconds.
    pub timestamp: i64,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub source_count: usize,
    pub label: String,
}

/// Buckets the points of `tracker` by `interval` and reduces every bucket to a single value.
///
/// `operator` is only honoured for value trackers, see [`effective_operator`]. At the raw
/// interval each point is passed through with its own note.
#[instrument(skip(tracker, points, tz), fields(tracker = %tracker.id, points = points.len()))]
pub fn aggregate<Tz: TimeZone>(
    tracker: &Tracker,
    points: &[DataPoint],
    interval: Interval,
    operator: Option<Operator>,
    tz: &Tz,
) -> Result<Vec<ProcessedPoint>, AggregationError>
where
    Tz::Offset: Display,
{
    let buckets = bucket(tracker.kind, points, interval, tz)?;
    let operator = effective_operator(tracker.kind, interval, operator);
    debug!("Reducing {} buckets with {:?}", buckets.len(), operator);

    let processed = buckets
        .iter()
        .map(|bucket| {
            let (value, notes) = match operator {
                Some(operator) => (
                    reduce(bucket, operator),
                    summarize_notes(bucket.len(), bucket.notes()),
                ),
                // Raw buckets hold exactly one point.
                None => (
                    reduce(bucket, Operator::Sum),
                    bucket.notes().first().cloned(),
                ),
            };
            ProcessedPoint {
                timestamp: bucket.start().timestamp_millis(),
                value,
                notes,
                source_count: bucket.len(),
                label: bucket.label(),
            }
        })
        .collect();
    Ok(processed)
}
