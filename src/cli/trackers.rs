use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use crate::{
    storage::{
        database::{delete_tracker_cascade, TrackerStore},
        entities::{unique_id, Tracker, TrackerDraft, TrackerEdit, TrackerKind},
    },
    utils::clock::Clock,
};

#[derive(Subcommand, Debug)]
pub enum TrackerCommand {
    #[command(about = "Create a new tracker")]
    Add {
        #[arg(long, short)]
        name: String,
        #[arg(long, short, default_value_t = TrackerKind::Value, help = "Value trackers record numbers, event trackers record occurrences")]
        kind: TrackerKind,
        #[arg(long, short, help = "Unit of the values. Required for value trackers")]
        unit: Option<String>,
        #[arg(long, help = "Any CSS color")]
        color: Option<String>,
        #[arg(long, help = "Show the tracker before unpinned ones")]
        pinned: bool,
    },
    #[command(about = "List trackers, pinned ones first")]
    List {},
    #[command(about = "Change a tracker. Omitted options keep their current value")]
    Edit {
        id: String,
        #[arg(long, short)]
        name: Option<String>,
        #[arg(long, short)]
        kind: Option<TrackerKind>,
        #[arg(long, short)]
        unit: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    #[command(about = "Pin or unpin a tracker")]
    Pin { id: String },
    #[command(about = "Delete a tracker together with its data points")]
    Delete { id: String },
}

pub async fn process_tracker_command(
    store: &impl TrackerStore,
    clock: &impl Clock,
    command: TrackerCommand,
) -> Result<()> {
    match command {
        TrackerCommand::Add {
            name,
            kind,
            unit,
            color,
            pinned,
        } => {
            let draft = TrackerDraft {
                name,
                kind,
                unit,
                color,
                is_pinned: pinned,
            };
            let tracker = create_tracker(store, clock, draft).await?;
            println!("Created tracker {} ({})", tracker.name, tracker.id);
        }
        TrackerCommand::List {} => {
            let trackers = list_trackers(store).await?;
            if trackers.is_empty() {
                println!("No trackers yet. Create one with `tracker add`.");
            }
            for TrackerSummary { tracker, points } in trackers {
                println!(
                    "{}{}\t{}\t{}\t{}\t{} points",
                    if tracker.is_pinned { "* " } else { "  " },
                    tracker.id,
                    tracker.name,
                    tracker.kind,
                    tracker.unit,
                    points
                );
            }
        }
        TrackerCommand::Edit {
            id,
            name,
            kind,
            unit,
            color,
        } => {
            let edit = TrackerEdit {
                name,
                kind,
                unit,
                color,
            };
            let tracker = edit_tracker(store, &id, edit).await?;
            println!("Updated tracker {} ({})", tracker.name, tracker.id);
        }
        TrackerCommand::Pin { id } => {
            let tracker = toggle_pin(store, &id).await?;
            let state = if tracker.is_pinned { "Pinned" } else { "Unpinned" };
            println!("{state} tracker {}", tracker.name);
        }
        TrackerCommand::Delete { id } => {
            let removed = delete_tracker_cascade(store, &id).await?;
            println!("Deleted tracker {id} and {removed} data points");
        }
    }
    Ok(())
}

pub async fn create_tracker(
    store: &impl TrackerStore,
    clock: &impl Clock,
    draft: TrackerDraft,
) -> Result<Tracker> {
    let existing = store.get_all_trackers().await?;
    let taken = existing.iter().map(|v| v.id.as_str()).collect::<HashSet<_>>();

    let now = clock.time();
    let tracker = Tracker::new(unique_id(now, &taken), now, draft)?;
    store.add_tracker(tracker.clone()).await?;
    Ok(tracker)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSummary {
    pub tracker: Tracker,
    pub points: usize,
}

/// Trackers in dashboard order: pinned first, then the most recently created.
pub async fn list_trackers(store: &impl TrackerStore) -> Result<Vec<TrackerSummary>> {
    let (trackers, points) =
        futures::try_join!(store.get_all_trackers(), store.get_all_data_points())?;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for point in &points {
        *counts.entry(point.tracker_id.as_str()).or_default() += 1;
    }

    let mut summaries = trackers
        .into_iter()
        .map(|tracker| TrackerSummary {
            points: counts.get(tracker.id.as_str()).copied().unwrap_or(0),
            tracker,
        })
        .collect::<Vec<_>>();
    summaries.sort_by(|a, b| {
        b.tracker
            .is_pinned
            .cmp(&a.tracker.is_pinned)
            .then_with(|| b.tracker.created_at.cmp(&a.tracker.created_at))
    });
    Ok(summaries)
}

pub(crate) async fn require_tracker(store: &impl TrackerStore, id: &str) -> Result<Tracker> {
    store
        .get_tracker(id)
        .await?
        .with_context(|| format!("Tracker {id} doesn't exist"))
}

pub async fn edit_tracker(
    store: &impl TrackerStore,
    id: &str,
    edit: TrackerEdit,
) -> Result<Tracker> {
    let tracker = require_tracker(store, id).await?.edit(edit)?;
    store.update_tracker(tracker.clone()).await?;
    Ok(tracker)
}

pub async fn toggle_pin(store: &impl TrackerStore, id: &str) -> Result<Tracker> {
    let mut tracker = require_tracker(store, id).await?;
    tracker.is_pinned = !tracker.is_pinned;
    info!("Setting pinned state of {id} to {}", tracker.is_pinned);
    store.update_tracker(tracker.clone()).await?;
    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        storage::{
            database::{Database, TrackerStore},
            entities::{TrackerDraft, TrackerEdit, TrackerKind, ValidationError, EVENT_UNIT},
        },
        utils::{
            clock::{Clock, MockClock},
            logging::TEST_LOGGING,
        },
    };

    use super::{create_tracker, edit_tracker, list_trackers, toggle_pin};

    fn clock_at(millis: i64) -> MockClock {
        let mut clock = MockClock::new();
        clock
            .expect_time()
            .returning(move || Utc.timestamp_millis_opt(millis).unwrap());
        clock
    }

    fn draft(name: &str, kind: TrackerKind) -> TrackerDraft {
        TrackerDraft {
            name: name.into(),
            kind,
            unit: Some("km".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ids_come_from_clock() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let clock = clock_at(1_717_000_000_000);

        let first = create_tracker(&database, &clock, draft("Run", TrackerKind::Value)).await?;
        let second = create_tracker(&database, &clock, draft("Walk", TrackerKind::Value)).await?;

        assert_eq!(first.id, "1717000000000");
        assert_eq!(second.id, "1717000000001");
        assert_eq!(first.created_at, clock_at(1_717_000_000_000).time());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_tracker_not_stored() -> Result<()> {
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let mut invalid = draft("Weight", TrackerKind::Value);
        invalid.unit = None;

        let error = create_tracker(&database, &clock_at(0), invalid)
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<ValidationError>(),
            Some(&ValidationError::MissingUnit)
        );
        assert!(database.get_all_trackers().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_order_and_counts() -> Result<()> {
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut ids = vec![];
        for (i, name) in ["old", "pinned", "new"].into_iter().enumerate() {
            let clock = clock_at((base + Duration::days(i as i64)).timestamp_millis());
            ids.push(create_tracker(&database, &clock, draft(name, TrackerKind::Event)).await?.id);
        }
        toggle_pin(&database, &ids[1]).await?;

        let names = list_trackers(&database)
            .await?
            .into_iter()
            .map(|v| v.tracker.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["pinned", "new", "old"]);

        let unpinned = toggle_pin(&database, &ids[1]).await?;
        assert!(!unpinned.is_pinned);
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_to_event_drops_unit() -> Result<()> {
        let dir = tempdir()?;
        let database = Database::open(dir.path().to_owned())?;
        let tracker = create_tracker(&database, &clock_at(0), draft("Gym", TrackerKind::Value)).await?;

        let edited = edit_tracker(
            &database,
            &tracker.id,
            TrackerEdit {
                kind: Some(TrackerKind::Event),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(edited.unit, EVENT_UNIT);
        assert_eq!(edited.color, tracker.color);
        assert_eq!(database.get_tracker(&tracker.id).await?, Some(edited));

        assert!(edit_tracker(&database, "missing", TrackerEdit::default())
            .await
            .is_err());
        Ok(())
    }
}
