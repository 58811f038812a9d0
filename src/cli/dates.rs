use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, TimeZone};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};

use super::Args;

pub const DATE_EXAMPLES: &str =
    "Examples are \"now\", \"yesterday\", \"2 hours ago\", \"15/03/2025\", \"12:00 16/03/2025\"";

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Parses a user supplied date relative to `now`. `what` names the argument in the error.
pub fn parse_user_date<Tz: TimeZone>(
    value: &str,
    what: &str,
    now: DateTime<Tz>,
    style: DateStyle,
) -> Result<DateTime<Tz>>
where
    Tz::Offset: Copy,
{
    parse_date_string(value, now, style.into()).map_err(|e| {
        Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {what} {value:?}: {e}"),
            )
            .into()
    })
}

/// Parses an optional date, `None` stays `None`.
pub fn parse_optional_date<Tz: TimeZone>(
    value: Option<&str>,
    what: &str,
    now: DateTime<Tz>,
    style: DateStyle,
) -> Result<Option<DateTime<Tz>>>
where
    Tz::Offset: Copy,
{
    value
        .map(|v| parse_user_date(v, what, now, style))
        .transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{parse_optional_date, parse_user_date, DateStyle};

    #[test]
    fn test_relative_dates() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(
            parse_user_date("2 hours ago", "date", now, DateStyle::Uk).unwrap(),
            now - Duration::hours(2)
        );
    }

    #[test]
    fn test_date_styles() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let uk = parse_user_date("03/04/2024", "date", now, DateStyle::Uk).unwrap();
        let us = parse_user_date("03/04/2024", "date", now, DateStyle::Us).unwrap();
        assert_eq!(uk.format("%m-%d").to_string(), "04-03");
        assert_eq!(us.format("%m-%d").to_string(), "03-04");
    }

    #[test]
    fn test_invalid_dates() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let error = parse_user_date("the day after never", "--at", now, DateStyle::Uk).unwrap_err();
        assert!(error.to_string().contains("--at"));
        assert_eq!(
            parse_optional_date(None, "--at", now, DateStyle::Uk).unwrap(),
            None
        );
    }
}
