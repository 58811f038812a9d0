use anyhow::{bail, Result};
use ansi_term::{Colour, Style};
use chrono::{Datelike, Local, NaiveDate, TimeZone};
use clap::Parser;
use serde::Serialize;

use crate::{
    engine::heatmap::{
        navigate, project, CalendarDay, CalendarGrid, CalendarView, IntensityTier, MonthGrid,
    },
    storage::{database::TrackerStore, entities::TrackerKind},
    utils::clock::Clock,
};

use super::{
    dates::{parse_optional_date, DateStyle, DATE_EXAMPLES},
    trackers::require_tracker,
};

const WEEKDAYS: &str = "Su Mo Tu We Th Fr Sa";

#[derive(Debug, Parser)]
pub struct HeatmapCommand {
    tracker_id: String,
    #[arg(long, short, default_value_t = CalendarView::Year)]
    view: CalendarView,
    #[arg(long, short, help = format!("Date inside the shown period, today by default. {DATE_EXAMPLES}"))]
    anchor: Option<String>,
    #[arg(
        long,
        short,
        default_value_t = 0,
        allow_negative_numbers = true,
        help = "Move by this many periods, negative values go back in time"
    )]
    shift: i32,
    #[arg(long, help = "Print the grid as JSON")]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heatmap {
    pub tracker_id: String,
    pub tracker_name: String,
    pub anchor: NaiveDate,
    pub grid: CalendarGrid,
}

pub async fn process_heatmap_command(
    store: &impl TrackerStore,
    clock: &impl Clock,
    date_style: DateStyle,
    HeatmapCommand {
        tracker_id,
        view,
        anchor,
        shift,
        json,
    }: HeatmapCommand,
) -> Result<()> {
    let now = clock.time().with_timezone(&Local);
    let anchor = parse_optional_date(anchor.as_deref(), "--anchor", now, date_style)?
        .unwrap_or(now)
        .date_naive();

    let heatmap = build_heatmap(store, &tracker_id, view, anchor, shift, &Local).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&heatmap)?);
        return Ok(());
    }

    println!(
        "{}: {} events",
        heatmap.tracker_name,
        heatmap.grid.total_occurrences()
    );
    for line in render_grid(&heatmap.grid) {
        println!("{line}");
    }
    Ok(())
}

/// Projects the events of an event tracker onto the `view` containing `anchor` moved by `shift`
/// views.
pub async fn build_heatmap<Tz: TimeZone>(
    store: &impl TrackerStore,
    tracker_id: &str,
    view: CalendarView,
    anchor: NaiveDate,
    shift: i32,
    tz: &Tz,
) -> Result<Heatmap> {
    let tracker = require_tracker(store, tracker_id).await?;
    if tracker.kind != TrackerKind::Event {
        bail!(
            "Heatmaps are only available for event trackers, {} tracks values",
            tracker.name
        );
    }

    let anchor = navigate(anchor, view, shift)?;
    let points = store.get_data_points_for(&tracker).await?;
    let grid = project(&points, view, anchor, tz)?;
    Ok(Heatmap {
        tracker_id: tracker.id,
        tracker_name: tracker.name,
        anchor,
        grid,
    })
}

/// Colors `text` with the shade of `tier`. Empty days are dimmed.
pub fn paint_tier(tier: IntensityTier, text: &str) -> String {
    let style = match tier {
        IntensityTier::Empty => Style::new().dimmed(),
        IntensityTier::Low => Colour::Fixed(151).normal(),
        IntensityTier::Medium => Colour::Fixed(114).normal(),
        IntensityTier::High => Colour::Fixed(71).normal(),
        IntensityTier::Peak => Colour::Fixed(28).bold(),
    };
    style.paint(text).to_string()
}

fn render_day(day: &CalendarDay) -> String {
    paint_tier(day.intensity(), &format!("{:>2}", day.date.day()))
}

fn render_month(grid: &MonthGrid) -> Vec<String> {
    let mut lines = vec![format!("{} {}", grid.name, grid.year), WEEKDAYS.to_string()];
    for week in grid.cells.chunks(7) {
        let cells = week
            .iter()
            .map(|cell| match cell {
                Some(day) => render_day(day),
                None => "  ".to_string(),
            })
            .collect::<Vec<_>>();
        lines.push(cells.join(" "));
    }
    lines
}

pub fn render_grid(grid: &CalendarGrid) -> Vec<String> {
    match grid {
        CalendarGrid::Week { days } => {
            let mut lines = vec![];
            for day in days {
                let mut line = format!(
                    "{} {}\t{}",
                    day.date.format("%a %x"),
                    paint_tier(day.intensity(), "■"),
                    day.occurrence_count
                );
                if !day.notes.is_empty() {
                    line.push_str(&format!("\t{}", day.notes.join("; ")));
                }
                lines.push(line);
            }
            lines
        }
        CalendarGrid::Month(month) => render_month(month),
        CalendarGrid::Year { months, .. } => months
            .iter()
            .flat_map(|month| {
                let mut lines = render_month(month);
                lines.push(String::new());
                lines
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, Utc};
    use tempfile::tempdir;

    use crate::{
        engine::heatmap::{CalendarGrid, CalendarView},
        storage::{
            database::{Database, TrackerStore},
            entities::{DataPoint, Tracker, TrackerKind},
        },
        utils::logging::TEST_LOGGING,
    };

    use super::{build_heatmap, render_grid};

    fn tracker(id: &str, kind: TrackerKind) -> Tracker {
        Tracker {
            id: id.into(),
            name: format!("tracker {id}"),
            kind,
            unit: "occurrence".into(),
            color: None,
            is_pinned: false,
            created_at: Utc::now(),
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    async fn database_with_events(dir: &std::path::Path) -> Result<Database> {
        let database = Database::open(dir.to_owned())?;
        database.add_tracker(tracker("gym", TrackerKind::Event)).await?;
        for (id, timestamp) in [
            ("a", "2024-05-01T08:00:00Z"),
            ("b", "2024-05-01T18:00:00Z"),
            ("c", "2024-06-10T08:00:00Z"),
        ] {
            database
                .add_data_point(DataPoint {
                    id: id.into(),
                    tracker_id: "gym".into(),
                    value: 1.,
                    timestamp: timestamp.into(),
                    notes: None,
                })
                .await?;
        }
        Ok(database)
    }

    #[tokio::test]
    async fn test_month_heatmap() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let database = database_with_events(dir.path()).await?;

        let heatmap =
            build_heatmap(&database, "gym", CalendarView::Month, date(2024, 5, 20), 0, &Utc).await?;
        assert_eq!(heatmap.anchor, date(2024, 5, 20));
        assert_eq!(heatmap.grid.total_occurrences(), 2);

        // Title, weekday header and five weeks
        assert_eq!(render_grid(&heatmap.grid).len(), 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_shifted_heatmap() -> Result<()> {
        let dir = tempdir()?;
        let database = database_with_events(dir.path()).await?;

        let heatmap =
            build_heatmap(&database, "gym", CalendarView::Month, date(2024, 5, 31), 1, &Utc).await?;
        assert_eq!(heatmap.anchor, date(2024, 6, 30));
        let CalendarGrid::Month(month) = &heatmap.grid else {
            panic!("expected a month grid");
        };
        assert_eq!(month.name, "June");
        assert_eq!(heatmap.grid.total_occurrences(), 1);

        let year =
            build_heatmap(&database, "gym", CalendarView::Year, date(2025, 1, 1), -1, &Utc).await?;
        assert_eq!(year.grid.total_occurrences(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_value_trackers_have_no_heatmap() -> Result<()> {
        let dir = tempdir()?;
        let database = database_with_events(dir.path()).await?;
        database.add_tracker(tracker("weight", TrackerKind::Value)).await?;

        assert!(
            build_heatmap(&database, "weight", CalendarView::Week, date(2024, 5, 1), 0, &Utc)
                .await
                .is_err()
        );
        Ok(())
    }
}
