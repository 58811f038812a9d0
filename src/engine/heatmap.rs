use std::{collections::HashMap, fmt::Display};

use chrono::{Datelike, Days, Duration, Months, NaiveDate, TimeZone};
use clap::ValueEnum;
use serde::Serialize;
use tracing::instrument;

use crate::{
    storage::entities::DataPoint,
    utils::time::{days_in_month, month_name, week_start},
};

use super::{bucketing::sort_chronologically, error::AggregationError};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarView {
    Week,
    Month,
    Year,
}

impl Display for CalendarView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarView::Week => write!(f, "week"),
            CalendarView::Month => write!(f, "month"),
            CalendarView::Year => write!(f, "year"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub occurrence_count: usize,
    /// Notes of the day in the order they were logged.
    pub notes: Vec<String>,
}

impl CalendarDay {
    pub fn intensity(&self) -> IntensityTier {
        IntensityTier::for_count(self.occurrence_count)
    }
}

/// Seven column grid of a month. Leading `None` cells pad the first week so that the first day
/// lands in its weekday column, Sunday being the first column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub name: &'static str,
    pub cells: Vec<Option<CalendarDay>>,
}

impl MonthGrid {
    pub fn days(&self) -> impl Iterator<Item = &CalendarDay> {
        self.cells.iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum CalendarGrid {
    Week { days: Vec<CalendarDay> },
    Month(MonthGrid),
    Year { year: i32, months: Vec<MonthGrid> },
}

impl CalendarGrid {
    pub fn view(&self) -> CalendarView {
        match self {
            CalendarGrid::Week { .. } => CalendarView::Week,
            CalendarGrid::Month(_) => CalendarView::Month,
            CalendarGrid::Year { .. } => CalendarView::Year,
        }
    }

    /// Every day of the grid, padding excluded.
    pub fn days(&self) -> Box<dyn Iterator<Item = &CalendarDay> + '_> {
        match self {
            CalendarGrid::Week { days } => Box::new(days.iter()),
            CalendarGrid::Month(grid) => Box::new(grid.days()),
            CalendarGrid::Year { months, .. } => Box::new(months.iter().flat_map(|v| v.days())),
        }
    }

    pub fn total_occurrences(&self) -> usize {
        self.days().map(|v| v.occurrence_count).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntensityTier {
    Empty,
    Low,
    Medium,
    High,
    Peak,
}

impl IntensityTier {
    const ORDERED: [IntensityTier; 5] = [
        IntensityTier::Empty,
        IntensityTier::Low,
        IntensityTier::Medium,
        IntensityTier::High,
        IntensityTier::Peak,
    ];

    /// Tier of a day with `count` occurrences. Four or more is the peak.
    pub fn for_count(count: usize) -> Self {
        Self::ORDERED[count.min(4)]
    }

    /// Tier of `value` relative to the largest value shown next to it.
    pub fn relative(value: f64, max: f64) -> Self {
        if max <= 0. || value <= 0. {
            return IntensityTier::Empty;
        }
        let index = (value / max * 5.).floor().min(4.) as usize;
        Self::ORDERED[index]
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Occurrences and notes per local date.
struct DayIndex(HashMap<NaiveDate, (usize, Vec<String>)>);

impl DayIndex {
    fn build<Tz: TimeZone>(points: &[DataPoint], tz: &Tz) -> Result<Self, AggregationError> {
        let mut days: HashMap<NaiveDate, (usize, Vec<String>)> = HashMap::new();
        for timed in sort_chronologically(points, tz)? {
            let entry = days.entry(timed.at.date_naive()).or_default();
            entry.0 += 1;
            if let Some(note) = timed.point.note() {
                entry.1.push(note.to_string());
            }
        }
        Ok(Self(days))
    }

    fn day(&self, date: NaiveDate) -> CalendarDay {
        let (occurrence_count, notes) = self.0.get(&date).cloned().unwrap_or_default();
        CalendarDay {
            date,
            occurrence_count,
            notes,
        }
    }

    fn month(&self, year: i32, month: u32) -> Option<MonthGrid> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let leading = first.weekday().num_days_from_sunday() as usize;

        let mut cells = vec![None; leading];
        for day in 1..=days_in_month(year, month)? {
            cells.push(Some(self.day(NaiveDate::from_ymd_opt(year, month, day)?)));
        }

        Some(MonthGrid {
            year,
            month,
            name: month_name(month),
            cells,
        })
    }

    fn week(&self, anchor: NaiveDate) -> Option<Vec<CalendarDay>> {
        let start = week_start(anchor)?;
        (0..7)
            .map(|offset| start.checked_add_days(Days::new(offset)).map(|v| self.day(v)))
            .collect()
    }
}

/// Lays the occurrences of `points` onto the calendar grid of `view` containing `anchor`. Days
/// are the local dates of `tz`.
#[instrument(skip(points, tz), fields(points = points.len()))]
pub fn project<Tz: TimeZone>(
    points: &[DataPoint],
    view: CalendarView,
    anchor: NaiveDate,
    tz: &Tz,
) -> Result<CalendarGrid, AggregationError> {
    let index = DayIndex::build(points, tz)?;
    let out_of_range = || AggregationError::OutOfRange {
        anchor,
        view,
        steps: 0,
    };

    let grid = match view {
        CalendarView::Week => CalendarGrid::Week {
            days: index.week(anchor).ok_or_else(out_of_range)?,
        },
        CalendarView::Month => CalendarGrid::Month(
            index
                .month(anchor.year(), anchor.month())
                .ok_or_else(out_of_range)?,
        ),
        CalendarView::Year => CalendarGrid::Year {
            year: anchor.year(),
            months: (1..=12)
                .map(|month| index.month(anchor.year(), month))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(out_of_range)?,
        },
    };
    Ok(grid)
}

/// Moves `anchor` by `steps` whole views. Month and year moves keep the day of month, clamped to
/// the length of the target month.
pub fn navigate(
    anchor: NaiveDate,
    view: CalendarView,
    steps: i32,
) -> Result<NaiveDate, AggregationError> {
    let shift_months = |months: i32| {
        let amount = Months::new(months.unsigned_abs());
        if months >= 0 {
            anchor.checked_add_months(amount)
        } else {
            anchor.checked_sub_months(amount)
        }
    };

    let shifted = match view {
        CalendarView::Week => anchor.checked_add_signed(Duration::weeks(steps.into())),
        CalendarView::Month => shift_months(steps),
        CalendarView::Year => steps.checked_mul(12).and_then(shift_months),
    };
    shifted.ok_or(AggregationError::OutOfRange {
        anchor,
        view,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Datelike, FixedOffset, NaiveDate, Utc, Weekday};

    use crate::{engine::error::AggregationError, storage::entities::DataPoint};

    use super::{navigate, project, CalendarGrid, CalendarView, IntensityTier};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn event(id: &str, timestamp: &str, notes: Option<&str>) -> DataPoint {
        DataPoint {
            id: id.into(),
            tracker_id: "t".into(),
            value: 1.,
            timestamp: timestamp.into(),
            notes: notes.map(str::to_string),
        }
    }

    #[test]
    fn test_month_padding() -> Result<()> {
        // May 2024 starts on a Wednesday
        let grid = project(&[], CalendarView::Month, date(2024, 5, 17), &Utc)?;
        let CalendarGrid::Month(month) = grid else {
            panic!("expected a month grid");
        };
        assert_eq!(month.name, "May");
        assert_eq!(month.cells.len(), 3 + 31);
        assert!(month.cells[..3].iter().all(Option::is_none));
        assert_eq!(month.cells[3].as_ref().unwrap().date, date(2024, 5, 1));
        assert_eq!(month.cells.last().unwrap().as_ref().unwrap().date, date(2024, 5, 31));
        Ok(())
    }

    #[test]
    fn test_week_runs_sunday_to_saturday() -> Result<()> {
        let grid = project(&[], CalendarView::Week, date(2024, 5, 1), &Utc)?;
        let CalendarGrid::Week { days } = grid else {
            panic!("expected a week grid");
        };
        assert_eq!(days.len(), 7);
        assert_eq!(days[0].date.weekday(), Weekday::Sun);
        assert_eq!(days[0].date, date(2024, 4, 28));
        assert_eq!(days[6].date, date(2024, 5, 4));
        Ok(())
    }

    #[test]
    fn test_year_view() -> Result<()> {
        let points = vec![
            event("a", "2024-02-29T10:00:00Z", None),
            event("b", "2023-12-31T10:00:00Z", None),
        ];
        let grid = project(&points, CalendarView::Year, date(2024, 7, 1), &Utc)?;
        let CalendarGrid::Year { year, months } = &grid else {
            panic!("expected a year grid");
        };
        assert_eq!(*year, 2024);
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].name, "January");
        assert_eq!(months[1].days().count(), 29);
        assert_eq!(grid.days().count(), 366);
        assert_eq!(grid.total_occurrences(), 1);
        Ok(())
    }

    #[test]
    fn test_days_collect_counts_and_notes() -> Result<()> {
        let points = vec![
            event("c", "2024-05-02T18:00:00Z", Some("late")),
            event("a", "2024-05-02T08:00:00Z", Some("early")),
            event("b", "2024-05-02T12:00:00Z", None),
            event("d", "2024-05-02T20:00:00Z", Some("late")),
        ];
        let grid = project(&points, CalendarView::Week, date(2024, 5, 2), &Utc)?;
        let day = grid
            .days()
            .find(|v| v.date == date(2024, 5, 2))
            .unwrap();
        assert_eq!(day.occurrence_count, 4);
        assert_eq!(day.notes, vec!["early", "late", "late"]);
        assert_eq!(day.intensity(), IntensityTier::Peak);
        Ok(())
    }

    #[test]
    fn test_days_follow_local_calendar() -> Result<()> {
        let points = vec![event("a", "2024-05-01T23:30:00Z", None)];
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let grid = project(&points, CalendarView::Week, date(2024, 5, 1), &offset)?;
        let counted = grid
            .days()
            .filter(|v| v.occurrence_count > 0)
            .map(|v| v.date)
            .collect::<Vec<_>>();
        assert_eq!(counted, vec![date(2024, 5, 2)]);
        Ok(())
    }

    #[test]
    fn test_malformed_points_fail_projection() {
        let points = vec![event("a", "not a date", None)];
        assert!(matches!(
            project(&points, CalendarView::Month, date(2024, 5, 1), &Utc),
            Err(AggregationError::MalformedTimestamp { .. })
        ));
    }

    #[test]
    fn test_navigation() -> Result<()> {
        assert_eq!(navigate(date(2024, 12, 15), CalendarView::Month, 1)?, date(2025, 1, 15));
        assert_eq!(navigate(date(2024, 1, 15), CalendarView::Month, -1)?, date(2023, 12, 15));
        assert_eq!(navigate(date(2024, 1, 31), CalendarView::Month, 1)?, date(2024, 2, 29));
        assert_eq!(navigate(date(2024, 2, 29), CalendarView::Year, 1)?, date(2025, 2, 28));
        assert_eq!(navigate(date(2024, 5, 1), CalendarView::Week, -2)?, date(2024, 4, 17));
        assert!(matches!(
            navigate(NaiveDate::MAX, CalendarView::Year, 1),
            Err(AggregationError::OutOfRange { steps: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_intensity_is_monotonic() {
        let tiers = (0..8).map(IntensityTier::for_count).collect::<Vec<_>>();
        assert!(tiers.windows(2).all(|v| v[0] <= v[1]));
        assert_eq!(tiers[0], IntensityTier::Empty);
        assert_eq!(tiers[1], IntensityTier::Low);
        assert_eq!(tiers[3], IntensityTier::High);
        assert_eq!(tiers[7], IntensityTier::Peak);

        let relative = (0..=10)
            .map(|v| IntensityTier::relative(v as f64, 10.))
            .collect::<Vec<_>>();
        assert!(relative.windows(2).all(|v| v[0] <= v[1]));
        assert_eq!(relative[10], IntensityTier::Peak);
        assert_eq!(IntensityTier::relative(3., 10.).index(), 1);
        assert_eq!(IntensityTier::relative(5., 0.), IntensityTier::Empty);
    }
}
