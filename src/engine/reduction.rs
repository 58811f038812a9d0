use std::fmt::Display;

use chrono::TimeZone;
use clap::ValueEnum;
use serde::Serialize;

use crate::storage::entities::TrackerKind;

use super::bucketing::{Bucket, Interval};

const SHOWN_NOTES: usize = 2;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Sum,
    Average,
    Count,
    Min,
    Max,
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Sum => write!(f, "sum"),
            Operator::Average => write!(f, "average"),
            Operator::Count => write!(f, "count"),
            Operator::Min => write!(f, "min"),
            Operator::Max => write!(f, "max"),
        }
    }
}

/// Collapses the values of a bucket into one number.
pub fn reduce<Tz: TimeZone>(bucket: &Bucket<Tz>, operator: Operator) -> f64 {
    let values = bucket.values();
    debug_assert!(!values.is_empty(), "buckets always hold a point");

    match operator {
        Operator::Sum => values.iter().sum(),
        Operator::Average => values.iter().sum::<f64>() / values.len() as f64,
        Operator::Count => values.len() as f64,
        Operator::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Operator::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Operator used when the user hasn't picked one.
pub fn default_operator(kind: TrackerKind, interval: Interval) -> Option<Operator> {
    match (kind, interval) {
        (_, Interval::Raw) => None,
        (TrackerKind::Event, _) => Some(Operator::Count),
        (TrackerKind::Value, Interval::Daily) => Some(Operator::Sum),
        (TrackerKind::Value, Interval::Monthly | Interval::Yearly) => Some(Operator::Average),
    }
}

/// Operator that is actually applied. Raw data isn't reduced and events are always counted, the
/// requested operator only matters for grouped value trackers.
pub fn effective_operator(
    kind: TrackerKind,
    interval: Interval,
    requested: Option<Operator>,
) -> Option<Operator> {
    match (kind, interval) {
        (_, Interval::Raw) => None,
        (TrackerKind::Event, _) => Some(Operator::Count),
        (TrackerKind::Value, _) => requested.or_else(|| default_operator(kind, interval)),
    }
}

/// Short description of a bucket's notes, e.g. `3 entries. Notes: a; b...`. Only the first two
/// distinct notes are shown. `None` when no entry had a note.
pub fn summarize_notes(entries: usize, notes: &[String]) -> Option<String> {
    let mut distinct: Vec<&str> = vec![];
    for note in notes {
        if !distinct.contains(&note.as_str()) {
            distinct.push(note);
        }
    }
    if distinct.is_empty() {
        return None;
    }

    let noun = if entries == 1 { "entry" } else { "entries" };
    let more = if distinct.len() > SHOWN_NOTES { "..." } else { "" };
    let shown = distinct[..distinct.len().min(SHOWN_NOTES)].join("; ");
    Some(format!("{entries} {noun}. Notes: {shown}{more}"))
}
