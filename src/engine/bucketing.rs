use std::fmt::Display;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone};
use clap::ValueEnum;
use serde::Serialize;
use tracing::{instrument, trace};

use crate::{
    storage::entities::{normalized_value, DataPoint, TrackerKind},
    utils::time::{resolve_local, start_of_day},
};

use super::error::AggregationError;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Raw,
    Daily,
    Monthly,
    Yearly,
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interval::Raw => write!(f, "raw"),
            Interval::Daily => write!(f, "daily"),
            Interval::Monthly => write!(f, "monthly"),
            Interval::Yearly => write!(f, "yearly"),
        }
    }
}

/// Identifies the calendar period a bucket covers. Keys of the same interval order
/// chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    interval: Interval,
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
}

impl BucketKey {
    /// Key of the period containing `date`. Raw buckets aren't grouped, so they have no key.
    pub fn for_date(interval: Interval, date: NaiveDate) -> Option<Self> {
        let (month, day) = match interval {
            Interval::Raw => return None,
            Interval::Daily => (Some(date.month()), Some(date.day())),
            Interval::Monthly => (Some(date.month()), None),
            Interval::Yearly => (None, None),
        };
        Some(Self {
            interval,
            year: date.year(),
            month,
            day,
        })
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn day(&self) -> Option<u32> {
        self.day
    }

    /// First calendar day of the period.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }
}

impl Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.month, self.day) {
            (Some(month), Some(day)) => write!(f, "{:04}-{month:02}-{day:02}", self.year),
            (Some(month), None) => write!(f, "{:04}-{month:02}", self.year),
            _ => write!(f, "{:04}", self.year),
        }
    }
}

/// Group of points sharing one period. A bucket is created from its first point, so it is never
/// empty.
#[derive(Debug, Clone)]
pub struct Bucket<Tz: TimeZone> {
    key: Option<BucketKey>,
    start: DateTime<Tz>,
    values: Vec<f64>,
    notes: Vec<String>,
}

impl<Tz: TimeZone> Bucket<Tz> {
    fn new(key: Option<BucketKey>, start: DateTime<Tz>, value: f64, note: Option<&str>) -> Self {
        let mut bucket = Self {
            key,
            start,
            values: vec![],
            notes: vec![],
        };
        bucket.push(value, note);
        bucket
    }

    fn push(&mut self, value: f64, note: Option<&str>) {
        self.values.push(value);
        if let Some(note) = note {
            self.notes.push(note.to_string());
        }
    }

    pub fn key(&self) -> Option<&BucketKey> {
        self.key.as_ref()
    }

    pub fn start(&self) -> &DateTime<Tz> {
        &self.start
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Amount of points in the bucket.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Human readable name of the period, e.g. "Jan 1, 2024" for a daily bucket.
    pub fn label(&self) -> String
    where
        Tz::Offset: Display,
    {
        let format = match self.key.map(|v| v.interval) {
            None | Some(Interval::Raw) => "%b %-d, %y %-I:%M %p",
            Some(Interval::Daily) => "%b %-d, %Y",
            Some(Interval::Monthly) => "%b %Y",
            Some(Interval::Yearly) => "%Y",
        };
        self.start.format(format).to_string()
    }
}

/// Buckets in ascending chronological order.
#[derive(Debug, Clone)]
pub struct Buckets<Tz: TimeZone> {
    interval: Interval,
    entries: Vec<Bucket<Tz>>,
}

impl<Tz: TimeZone> Buckets<Tz> {
    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bucket<Tz>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &BucketKey) -> Option<&Bucket<Tz>> {
        self.entries
            .binary_search_by(|v| v.key.as_ref().cmp(&Some(key)))
            .ok()
            .map(|index| &self.entries[index])
    }
}

impl<Tz: TimeZone> IntoIterator for Buckets<Tz> {
    type Item = Bucket<Tz>;
    type IntoIter = std::vec::IntoIter<Bucket<Tz>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Data point paired with its parsed timestamp.
pub(crate) struct TimedPoint<'a, Tz: TimeZone> {
    pub point: &'a DataPoint,
    pub at: DateTime<Tz>,
}

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parses a stored timestamp. Timestamps with an offset are exact instants, ones without it are
/// wall clock times of `tz`.
pub fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if let Ok(v) = DateTime::parse_from_rfc3339(raw) {
        return Some(v.with_timezone(tz));
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        return resolve_local(tz, naive);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| start_of_day(tz, date))
}

/// Parses every timestamp and sorts points by it. Sorting is stable, so points sharing an instant
/// keep their input order.
pub(crate) fn sort_chronologically<'a, Tz: TimeZone>(
    points: &'a [DataPoint],
    tz: &Tz,
) -> Result<Vec<TimedPoint<'a, Tz>>, AggregationError> {
    let mut timed = points
        .iter()
        .map(|point| {
            parse_timestamp(&point.timestamp, tz)
                .map(|at| TimedPoint { point, at })
                .ok_or_else(|| AggregationError::MalformedTimestamp {
                    id: point.id.clone(),
                    timestamp: point.timestamp.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    timed.sort_by(|a, b| a.at.cmp(&b.at));
    Ok(timed)
}

/// Groups points of a single tracker into periods of `interval`, using the calendar of `tz`.
///
/// Only periods containing points produce a bucket. Event points contribute 1 regardless of the
/// stored value.
#[instrument(skip(points, tz), fields(points = points.len()))]
pub fn bucket<Tz: TimeZone>(
    kind: TrackerKind,
    points: &[DataPoint],
    interval: Interval,
    tz: &Tz,
) -> Result<Buckets<Tz>, AggregationError> {
    let mut entries: Vec<Bucket<Tz>> = vec![];

    for TimedPoint { point, at } in sort_chronologically(points, tz)? {
        let value = normalized_value(kind, point.value);
        let note = point.note();

        let Some(key) = BucketKey::for_date(interval, at.date_naive()) else {
            entries.push(Bucket::new(None, at, value, note));
            continue;
        };

        // Input is sorted, so a point either extends the latest bucket or opens a new one.
        match entries.last_mut() {
            Some(last) if last.key == Some(key) => last.push(value, note),
            _ => {
                let start = key
                    .first_day()
                    .and_then(|date| start_of_day(tz, date))
                    .unwrap_or_else(|| at.clone());
                trace!("Opening bucket {key}");
                entries.push(Bucket::new(Some(key), start, value, note));
            }
        }
    }

    Ok(Buckets { interval, entries })
}
