use std::{collections::HashSet, fmt::Display};

use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unit every event tracker carries. Events don't have a magnitude, only occurrences.
pub const EVENT_UNIT: &str = "occurrence";

pub const DEFAULT_TRACKER_COLOR: &str = "hsl(var(--primary))";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    /// Numeric series, every data point carries a user supplied value.
    #[default]
    Value,
    /// Occurrences, every data point counts as 1.
    Event,
}

impl Display for TrackerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerKind::Value => write!(f, "value"),
            TrackerKind::Event => write!(f, "event"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Tracker name is required")]
    EmptyName,
    #[error("Unit is required for value-based trackers")]
    MissingUnit,
    #[error("A value is required for value-based trackers")]
    MissingValue,
    #[error("Value {0} is not a finite number")]
    NonFiniteValue(f64),
    #[error("Data point belongs to tracker {expected}, not {actual}")]
    TrackerMismatch { expected: String, actual: String },
}

/// The only place where event/value coercion happens. Event trackers always log 1.
pub fn normalized_value(kind: TrackerKind, value: f64) -> f64 {
    match kind {
        TrackerKind::Event => 1.,
        TrackerKind::Value => value,
    }
}

fn canonical_unit(kind: TrackerKind, unit: Option<&str>) -> Result<String, ValidationError> {
    match kind {
        TrackerKind::Event => Ok(EVENT_UNIT.to_string()),
        TrackerKind::Value => unit
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(ValidationError::MissingUnit),
    }
}

/// User defined series. Field names match the persisted schema, so records exported from older
/// versions deserialize as is. Records without `type` predate event trackers and are values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracker {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: TrackerKind,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything the user chooses when creating a tracker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackerDraft {
    pub name: String,
    pub kind: TrackerKind,
    pub unit: Option<String>,
    pub color: Option<String>,
    pub is_pinned: bool,
}

/// Partial update of a tracker. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackerEdit {
    pub name: Option<String>,
    pub kind: Option<TrackerKind>,
    pub unit: Option<String>,
    pub color: Option<String>,
}

impl Tracker {
    pub fn new(
        id: String,
        created_at: DateTime<Utc>,
        draft: TrackerDraft,
    ) -> Result<Self, ValidationError> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(Self {
            id,
            unit: canonical_unit(draft.kind, draft.unit.as_deref())?,
            name,
            kind: draft.kind,
            color: Some(
                draft
                    .color
                    .unwrap_or_else(|| DEFAULT_TRACKER_COLOR.to_string()),
            ),
            is_pinned: draft.is_pinned,
            created_at,
        })
    }

    /// Applies an edit and re-establishes the tracker invariants. Switching to an event tracker
    /// drops the unit, switching to a value tracker requires one.
    pub fn edit(self, edit: TrackerEdit) -> Result<Self, ValidationError> {
        let kind = edit.kind.unwrap_or(self.kind);
        let unit = match (edit.unit, kind) {
            (Some(unit), _) => Some(unit),
            (None, TrackerKind::Value) if self.kind == TrackerKind::Value => Some(self.unit),
            (None, _) => None,
        };
        let draft = TrackerDraft {
            name: edit.name.unwrap_or(self.name),
            kind,
            unit,
            color: edit.color.or(self.color),
            is_pinned: self.is_pinned,
        };
        Self::new(self.id, self.created_at, draft)
    }
}

/// One timestamped observation. `timestamp` stays a string so that malformed legacy values
/// survive a load and are reported by aggregation instead of being silently replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub id: String,
    pub tracker_id: String,
    pub value: f64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl DataPoint {
    pub fn new(
        id: String,
        tracker: &Tracker,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Self, ValidationError> {
        let value = match (tracker.kind, value) {
            (TrackerKind::Value, None) => return Err(ValidationError::MissingValue),
            (TrackerKind::Value, Some(v)) if !v.is_finite() => {
                return Err(ValidationError::NonFiniteValue(v));
            }
            (kind, value) => normalized_value(kind, value.unwrap_or_default()),
        };
        Ok(Self {
            id,
            tracker_id: tracker.id.clone(),
            value,
            timestamp: format_timestamp(timestamp),
            notes: notes.filter(|v| !v.is_empty()),
        })
    }

    /// Returns the point with its value coerced for the tracker kind. Used when reading points
    /// back from storage.
    pub fn normalized(self, kind: TrackerKind) -> Self {
        Self {
            value: normalized_value(kind, self.value),
            ..self
        }
    }

    /// Non-empty note of the point.
    pub fn note(&self) -> Option<&str> {
        self.notes.as_deref().filter(|v| !v.is_empty())
    }
}

/// The persisted timestamp format, e.g. `2024-01-01T08:00:00.000Z`.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Creates an id from the creation time in milliseconds, moving forward until it doesn't collide
/// with `taken`.
pub fn unique_id(now: DateTime<Utc>, taken: &HashSet<&str>) -> String {
    let mut candidate = now.timestamp_millis();
    loop {
        let id = candidate.to_string();
        if !taken.contains(id.as_str()) {
            return id;
        }
        candidate += 1;
    }
}
