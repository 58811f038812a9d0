use std::{cmp::Reverse, collections::HashSet};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};

use crate::{
    engine::bucketing::parse_timestamp,
    storage::{
        database::TrackerStore,
        entities::{format_timestamp, unique_id, DataPoint, Tracker},
    },
    utils::clock::Clock,
};

use super::{
    dates::{parse_optional_date, DateStyle, DATE_EXAMPLES},
    trackers::require_tracker,
};

#[derive(Debug, Parser)]
pub struct LogCommand {
    tracker_id: String,
    #[arg(
        long,
        short,
        allow_negative_numbers = true,
        help = "Logged value. Required for value trackers, ignored for event trackers"
    )]
    value: Option<f64>,
    #[arg(long, short, help = format!("When it happened, now by default. {DATE_EXAMPLES}"))]
    at: Option<String>,
    #[arg(long, short)]
    notes: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum PointCommand {
    #[command(about = "List data points of a tracker, newest first")]
    List { tracker_id: String },
    #[command(about = "Change a data point. Omitted options keep their current value")]
    Edit {
        id: String,
        #[arg(long, short, allow_negative_numbers = true)]
        value: Option<f64>,
        #[arg(long, short, help = format!("New time of the data point. {DATE_EXAMPLES}"))]
        at: Option<String>,
        #[arg(long, short, help = "New notes, an empty string removes them")]
        notes: Option<String>,
    },
    #[command(about = "Delete a data point")]
    Delete { id: String },
}

pub async fn process_log_command(
    store: &impl TrackerStore,
    clock: &impl Clock,
    date_style: DateStyle,
    LogCommand {
        tracker_id,
        value,
        at,
        notes,
    }: LogCommand,
) -> Result<()> {
    let now = clock.time().with_timezone(&Local);
    let at = parse_optional_date(at.as_deref(), "--at", now, date_style)?;
    let point = log_point(
        store,
        clock,
        &tracker_id,
        value,
        at.map(|v| v.to_utc()),
        notes,
    )
    .await?;
    println!("Logged {} for tracker {tracker_id}", point.id);
    Ok(())
}

pub async fn process_point_command(
    store: &impl TrackerStore,
    clock: &impl Clock,
    date_style: DateStyle,
    command: PointCommand,
) -> Result<()> {
    match command {
        PointCommand::List { tracker_id } => {
            let (tracker, points) = list_points(store, &tracker_id).await?;
            if points.is_empty() {
                println!("No data points for {} yet.", tracker.name);
            }
            for point in points {
                println!(
                    "{}\t{}\t{} {}\t{}",
                    point.id,
                    display_timestamp(&point.timestamp),
                    point.value,
                    tracker.unit,
                    point.notes.as_deref().unwrap_or_default()
                );
            }
        }
        PointCommand::Edit {
            id,
            value,
            at,
            notes,
        } => {
            let now = clock.time().with_timezone(&Local);
            let at = parse_optional_date(at.as_deref(), "--at", now, date_style)?;
            let point = edit_point(store, &id, value, at.map(|v| v.to_utc()), notes).await?;
            println!("Updated data point {}", point.id);
        }
        PointCommand::Delete { id } => {
            if !store.delete_data_point(&id).await? {
                bail!("Data point {id} doesn't exist");
            }
            println!("Deleted data point {id}");
        }
    }
    Ok(())
}

fn display_timestamp(raw: &str) -> String {
    parse_timestamp(raw, &Local)
        .map(|v| v.format("%x %H:%M").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Records a new data point for `tracker_id`. The point is logged at `at`, or now when it's
/// absent.
pub async fn log_point(
    store: &impl TrackerStore,
    clock: &impl Clock,
    tracker_id: &str,
    value: Option<f64>,
    at: Option<DateTime<Utc>>,
    notes: Option<String>,
) -> Result<DataPoint> {
    let (tracker, existing) = futures::try_join!(
        require_tracker(store, tracker_id),
        store.get_all_data_points()
    )?;
    let taken = existing.iter().map(|v| v.id.as_str()).collect::<HashSet<_>>();

    let now = clock.time();
    let point = DataPoint::new(
        unique_id(now, &taken),
        &tracker,
        value,
        at.unwrap_or(now),
        notes,
    )?;
    store.add_data_point(point.clone()).await?;
    Ok(point)
}

/// Data points of a tracker, newest first. Points with unreadable timestamps go last.
pub async fn list_points(
    store: &impl TrackerStore,
    tracker_id: &str,
) -> Result<(Tracker, Vec<DataPoint>)> {
    let tracker = require_tracker(store, tracker_id).await?;
    let mut points = store.get_data_points_for(&tracker).await?;
    points.sort_by_cached_key(|v| Reverse(parse_timestamp(&v.timestamp, &Local)));
    Ok((tracker, points))
}

pub async fn edit_point(
    store: &impl TrackerStore,
    id: &str,
    value: Option<f64>,
    at: Option<DateTime<Utc>>,
    notes: Option<String>,
) -> Result<DataPoint> {
    let point = store
        .get_all_data_points()
        .await?
        .into_iter()
        .find(|v| v.id == id)
        .with_context(|| format!("Data point {id} doesn't exist"))?;
    let tracker = require_tracker(store, &point.tracker_id).await?;

    // Without --at the stored text is kept as is, offset-less wall clock times included
    let timestamp = at.map(format_timestamp).unwrap_or(point.timestamp);
    let edited = DataPoint {
        timestamp,
        ..DataPoint::new(
            point.id,
            &tracker,
            Some(value.unwrap_or(point.value)),
            at.unwrap_or_default(),
            notes.or(point.notes),
        )?
    };
    store.update_data_point(edited.clone()).await?;
    Ok(edited)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        cli::trackers::create_tracker,
        storage::{
            database::{Database, TrackerStore},
            entities::{DataPoint, Tracker, TrackerDraft, TrackerKind, ValidationError},
        },
        utils::{clock::MockClock, logging::TEST_LOGGING},
    };

    use super::{edit_point, list_points, log_point};

    fn clock_at(millis: i64) -> MockClock {
        let mut clock = MockClock::new();
        clock
            .expect_time()
            .returning(move || Utc.timestamp_millis_opt(millis).unwrap());
        clock
    }

    async fn tracker(database: &Database, kind: TrackerKind) -> Result<Tracker> {
        let draft = TrackerDraft {
            name: "Tracked".into(),
            kind,
            unit: Some("kg".into()),
            ..Default::default()
        };
        create_tracker(database, &clock_at(0), draft).await
    }

    #[tokio::test]
    async fn test_log_value_point() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let weight = tracker(&database, TrackerKind::Value).await?;
        let clock = clock_at(1_704_096_000_000);

        let point = log_point(&database, &clock, &weight.id, Some(80.5), None, None).await?;
        assert_eq!(point.value, 80.5);
        assert_eq!(point.timestamp, "2024-01-01T08:00:00.000Z");

        let second = log_point(&database, &clock, &weight.id, Some(81.), None, None).await?;
        assert_ne!(point.id, second.id);

        let error = log_point(&database, &clock, &weight.id, None, None, None)
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<ValidationError>(),
            Some(&ValidationError::MissingValue)
        );
        assert!(log_point(&database, &clock, "missing", Some(1.), None, None)
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_log_event_ignores_value() -> Result<()> {
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let gym = tracker(&database, TrackerKind::Event).await?;
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 18, 0, 0).unwrap();

        let point = log_point(
            &database,
            &clock_at(0),
            &gym.id,
            Some(42.),
            Some(at),
            Some("legs".into()),
        )
        .await?;
        assert_eq!(point.value, 1.);
        assert_eq!(point.timestamp, "2024-02-01T18:00:00.000Z");
        assert_eq!(point.notes.as_deref(), Some("legs"));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_newest_first() -> Result<()> {
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let weight = tracker(&database, TrackerKind::Value).await?;

        for (id, day) in [("a", 2), ("b", 5), ("c", 3)] {
            database
                .add_data_point(DataPoint {
                    id: id.into(),
                    tracker_id: weight.id.clone(),
                    value: 1.,
                    timestamp: format!("2024-01-0{day}T10:00:00.000Z"),
                    notes: None,
                })
                .await?;
        }
        database
            .add_data_point(DataPoint {
                id: "broken".into(),
                tracker_id: weight.id.clone(),
                value: 1.,
                timestamp: "someday".into(),
                notes: None,
            })
            .await?;

        let (_, points) = list_points(&database, &weight.id).await?;
        let ids = points.iter().map(|v| v.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "c", "a", "broken"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_point() -> Result<()> {
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let weight = tracker(&database, TrackerKind::Value).await?;
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 18, 0, 0).unwrap();
        let point = log_point(
            &database,
            &clock_at(0),
            &weight.id,
            Some(80.),
            Some(at),
            Some("before".into()),
        )
        .await?;

        let edited = edit_point(&database, &point.id, Some(79.), None, Some("".into())).await?;
        assert_eq!(edited.value, 79.);
        assert_eq!(edited.timestamp, point.timestamp);
        assert_eq!(edited.notes, None);

        let (_, stored) = list_points(&database, &weight.id).await?;
        assert_eq!(stored, vec![edited]);

        assert!(edit_point(&database, "missing", None, None, None)
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_keeps_wall_clock_timestamp() -> Result<()> {
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let weight = tracker(&database, TrackerKind::Value).await?;
        database
            .add_data_point(DataPoint {
                id: "morning".into(),
                tracker_id: weight.id.clone(),
                value: 80.,
                timestamp: "2024-01-01T08:00".into(),
                notes: None,
            })
            .await?;

        let edited = edit_point(&database, "morning", Some(79.), None, None).await?;
        assert_eq!(edited.value, 79.);
        assert_eq!(edited.timestamp, "2024-01-01T08:00");

        let (_, stored) = list_points(&database, &weight.id).await?;
        assert_eq!(stored, vec![edited]);

        let at = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let moved = edit_point(&database, "morning", None, Some(at), None).await?;
        assert_eq!(moved.timestamp, "2024-01-02T09:00:00.000Z");
        assert_eq!(moved.value, 79.);
        Ok(())
    }
}
