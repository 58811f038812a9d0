use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, info, warn};

use super::entities::{DataPoint, Tracker, ValidationError};

pub const TRACKERS_FILE: &str = "trackers.jsonl";
pub const DATA_POINTS_FILE: &str = "dataPoints.jsonl";

/// Interface for abstracting storage of trackers and their data points.
pub trait TrackerStore {
    fn get_all_trackers(&self) -> impl Future<Output = Result<Vec<Tracker>>>;

    fn get_tracker(&self, id: &str) -> impl Future<Output = Result<Option<Tracker>>>;

    /// Fails if a tracker with the same id already exists.
    fn add_tracker(&self, tracker: Tracker) -> impl Future<Output = Result<()>>;

    fn update_tracker(&self, tracker: Tracker) -> impl Future<Output = Result<()>>;

    /// Returns whether a tracker was removed. Doesn't touch data points, see
    /// [delete_tracker_cascade].
    fn delete_tracker(&self, id: &str) -> impl Future<Output = Result<bool>>;

    fn get_all_data_points(&self) -> impl Future<Output = Result<Vec<DataPoint>>>;

    /// Data points of a single tracker, with values normalized for its kind.
    fn get_data_points_for(&self, tracker: &Tracker)
        -> impl Future<Output = Result<Vec<DataPoint>>>;

    /// Fails if the referenced tracker doesn't exist or the id is taken.
    fn add_data_point(&self, data_point: DataPoint) -> impl Future<Output = Result<()>>;

    fn update_data_point(&self, data_point: DataPoint) -> impl Future<Output = Result<()>>;

    fn delete_data_point(&self, id: &str) -> impl Future<Output = Result<bool>>;

    /// Returns amount of removed data points.
    fn delete_data_points_for(&self, tracker_id: &str) -> impl Future<Output = Result<usize>>;
}

impl<T: Deref> TrackerStore for T
where
    T::Target: TrackerStore,
{
    fn get_all_trackers(&self) -> impl Future<Output = Result<Vec<Tracker>>> {
        self.deref().get_all_trackers()
    }

    fn get_tracker(&self, id: &str) -> impl Future<Output = Result<Option<Tracker>>> {
        self.deref().get_tracker(id)
    }

    fn add_tracker(&self, tracker: Tracker) -> impl Future<Output = Result<()>> {
        self.deref().add_tracker(tracker)
    }

    fn update_tracker(&self, tracker: Tracker) -> impl Future<Output = Result<()>> {
        self.deref().update_tracker(tracker)
    }

    fn delete_tracker(&self, id: &str) -> impl Future<Output = Result<bool>> {
        self.deref().delete_tracker(id)
    }

    fn get_all_data_points(&self) -> impl Future<Output = Result<Vec<DataPoint>>> {
        self.deref().get_all_data_points()
    }

    fn get_data_points_for(
        &self,
        tracker: &Tracker,
    ) -> impl Future<Output = Result<Vec<DataPoint>>> {
        self.deref().get_data_points_for(tracker)
    }

    fn add_data_point(&self, data_point: DataPoint) -> impl Future<Output = Result<()>> {
        self.deref().add_data_point(data_point)
    }

    fn update_data_point(&self, data_point: DataPoint) -> impl Future<Output = Result<()>> {
        self.deref().update_data_point(data_point)
    }

    fn delete_data_point(&self, id: &str) -> impl Future<Output = Result<bool>> {
        self.deref().delete_data_point(id)
    }

    fn delete_data_points_for(&self, tracker_id: &str) -> impl Future<Output = Result<usize>> {
        self.deref().delete_data_points_for(tracker_id)
    }
}

/// Deletes a tracker and then its data points. The two steps aren't atomic: when the second one
/// fails the tracker is already gone and the error says so. Calling this again removes the
/// stranded data points.
pub async fn delete_tracker_cascade(store: &impl TrackerStore, tracker_id: &str) -> Result<usize> {
    let existed = store
        .delete_tracker(tracker_id)
        .await
        .with_context(|| format!("Failed to delete tracker {tracker_id}"))?;

    let removed = store
        .delete_data_points_for(tracker_id)
        .await
        .with_context(|| {
            format!("Tracker {tracker_id} was deleted but its data points were left behind")
        })?;

    if !existed && removed == 0 {
        bail!("Tracker {tracker_id} doesn't exist");
    }
    info!("Deleted tracker {tracker_id} with {removed} data points");
    Ok(removed)
}

/// The main realization of [TrackerStore]. Each collection is a file with one JSON entity per
/// line. The handle is created once and passed to whoever needs storage.
pub struct Database {
    dir: PathBuf,
}

impl Database {
    pub fn open(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    fn trackers_path(&self) -> PathBuf {
        self.dir.join(TRACKERS_FILE)
    }

    fn data_points_path(&self) -> PathBuf {
        self.dir.join(DATA_POINTS_FILE)
    }
}

impl TrackerStore for Database {
    async fn get_all_trackers(&self) -> Result<Vec<Tracker>> {
        read_collection(&self.trackers_path()).await
    }

    async fn get_tracker(&self, id: &str) -> Result<Option<Tracker>> {
        let trackers: Vec<Tracker> = read_collection(&self.trackers_path()).await?;
        Ok(trackers.into_iter().find(|v| v.id == id))
    }

    async fn add_tracker(&self, tracker: Tracker) -> Result<()> {
        modify_collection(&self.trackers_path(), |trackers: &mut Vec<Tracker>| {
            if trackers.iter().any(|v| v.id == tracker.id) {
                bail!("Tracker with id {} already exists", tracker.id);
            }
            info!("Adding tracker {} ({})", tracker.id, tracker.name);
            trackers.push(tracker);
            Ok(())
        })
        .await
    }

    async fn update_tracker(&self, tracker: Tracker) -> Result<()> {
        modify_collection(&self.trackers_path(), |trackers: &mut Vec<Tracker>| {
            let Some(existing) = trackers.iter_mut().find(|v| v.id == tracker.id) else {
                bail!("Tracker {} doesn't exist", tracker.id);
            };
            info!("Updating tracker {}", tracker.id);
            *existing = tracker;
            Ok(())
        })
        .await
    }

    async fn delete_tracker(&self, id: &str) -> Result<bool> {
        modify_collection(&self.trackers_path(), |trackers: &mut Vec<Tracker>| {
            let before = trackers.len();
            trackers.retain(|v| v.id != id);
            Ok(trackers.len() != before)
        })
        .await
    }

    async fn get_all_data_points(&self) -> Result<Vec<DataPoint>> {
        read_collection(&self.data_points_path()).await
    }

    async fn get_data_points_for(&self, tracker: &Tracker) -> Result<Vec<DataPoint>> {
        let points: Vec<DataPoint> = read_collection(&self.data_points_path()).await?;
        Ok(points
            .into_iter()
            .filter(|v| v.tracker_id == tracker.id)
            .map(|v| v.normalized(tracker.kind))
            .collect())
    }

    async fn add_data_point(&self, data_point: DataPoint) -> Result<()> {
        let Some(tracker) = self.get_tracker(&data_point.tracker_id).await? else {
            bail!(
                "Can't add data point {}: tracker {} doesn't exist",
                data_point.id,
                data_point.tracker_id
            );
        };
        let data_point = data_point.normalized(tracker.kind);
        modify_collection(&self.data_points_path(), |points: &mut Vec<DataPoint>| {
            if points.iter().any(|v| v.id == data_point.id) {
                bail!("Data point with id {} already exists", data_point.id);
            }
            info!(
                "Adding data point {} to tracker {}",
                data_point.id, data_point.tracker_id
            );
            points.push(data_point);
            Ok(())
        })
        .await
    }

    async fn update_data_point(&self, data_point: DataPoint) -> Result<()> {
        modify_collection(&self.data_points_path(), |points: &mut Vec<DataPoint>| {
            let Some(existing) = points.iter_mut().find(|v| v.id == data_point.id) else {
                bail!("Data point {} doesn't exist", data_point.id);
            };
            if existing.tracker_id != data_point.tracker_id {
                return Err(ValidationError::TrackerMismatch {
                    expected: existing.tracker_id.clone(),
                    actual: data_point.tracker_id,
                }
                .into());
            }
            info!("Updating data point {}", data_point.id);
            *existing = data_point;
            Ok(())
        })
        .await
    }

    async fn delete_data_point(&self, id: &str) -> Result<bool> {
        modify_collection(&self.data_points_path(), |points: &mut Vec<DataPoint>| {
            let before = points.len();
            points.retain(|v| v.id != id);
            Ok(points.len() != before)
        })
        .await
    }

    async fn delete_data_points_for(&self, tracker_id: &str) -> Result<usize> {
        modify_collection(&self.data_points_path(), |points: &mut Vec<DataPoint>| {
            let before = points.len();
            points.retain(|v| v.tracker_id != tracker_id);
            Ok(before - points.len())
        })
        .await
    }
}

/// Reads every entity of a collection file. A missing file is an empty collection.
async fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    async fn extract(path: &Path) -> std::result::Result<String, std::io::Error> {
        debug!("Extracting {path:?}");
        let mut file = File::open(path).await?;
        file.lock_shared()?;
        let mut contents = String::new();
        let result = file.read_to_string(&mut contents).await;
        file.unlock_async().await?;
        result.map(|_| contents)
    }

    match extract(path).await {
        Ok(contents) => Ok(parse_lines(path, &contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
        Err(e) => Err(e).with_context(|| format!("Failed to read {path:?}")),
    }
}

fn parse_lines<T: DeserializeOwned>(path: &Path, contents: &str) -> Vec<T> {
    split_lines(path, contents).0
}

/// Parsed entities along with the lines that couldn't be parsed.
fn split_lines<'a, T: DeserializeOwned>(
    path: &Path,
    contents: &'a str,
) -> (Vec<T>, Vec<&'a str>) {
    let mut entities = vec![];
    let mut unparsed = vec![];
    for line in contents.lines().filter(|line| !line.trim().is_empty()) {
        match serde_json::from_str::<T>(line) {
            Ok(v) => entities.push(v),
            Err(e) => {
                // ignore illegal values. Might happen after an interrupted write
                warn!("During parsing in path {path:?} found illegal json string {line}: {e}");
                unparsed.push(line);
            }
        }
    }
    (entities, unparsed)
}

/// Loads a collection under an exclusive lock, lets `change` modify it and writes the result
/// back before releasing the lock. Nothing is written when `change` fails.
async fn modify_collection<T, R>(
    path: &Path,
    change: impl FnOnce(&mut Vec<T>) -> Result<R>,
) -> Result<R>
where
    T: Serialize + DeserializeOwned,
{
    let mut file = File::options()
        .write(true)
        .create(true)
        .read(true)
        .truncate(false)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {path:?}"))?;

    // Semi-safe acquire-release for a file
    file.lock_exclusive()?;
    let result = modify_with_file(&mut file, path, change).await;
    file.unlock_async().await?;
    result
}

async fn modify_with_file<T, R>(
    file: &mut File,
    path: &Path,
    change: impl FnOnce(&mut Vec<T>) -> Result<R>,
) -> Result<R>
where
    T: Serialize + DeserializeOwned,
{
    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;
    let (mut entities, unparsed) = split_lines::<T>(path, &contents);

    let result = change(&mut entities)?;

    let mut buffer = Vec::<u8>::new();
    for entity in &entities {
        serde_json::to_writer(&mut buffer, entity)?;
        buffer.push(b'\n');
    }
    // Lines nothing could read are written back untouched
    for line in unparsed {
        buffer.extend_from_slice(line.as_bytes());
        buffer.push(b'\n');
    }

    file.rewind().await?;
    file.set_len(0).await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    Ok(result)
}
