//! JSON-lines store: one append-only file per table.
//!
//! `sensor_samples.jsonl` holds sensor rows and `position_fixes.jsonl` holds
//! GPS halves, one JSON object per line. Inserting appends a single line and
//! rows are never held in memory. Updates and deletes rewrite the table
//! through a temporary file that replaces the original.

use super::TelemetryStore;
use crate::error::StorageError;
use crate::models::{PositionFix, SensorSample};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::info;

/// Rows addressable by an auto-increment id.
pub trait StoredRow: Clone + Serialize + DeserializeOwned {
    fn id(&self) -> Option<u64>;
    fn set_id(&mut self, id: u64);
}

impl StoredRow for SensorSample {
    fn id(&self) -> Option<u64> {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }
}

impl StoredRow for PositionFix {
    fn id(&self) -> Option<u64> {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }
}

struct TableState {
    appender: File,
    last_id: u64,
}

struct JsonLinesTable<T> {
    path: PathBuf,
    state: Mutex<TableState>,
    rows: PhantomData<fn() -> T>,
}

fn open_appender(path: &Path) -> Result<File, StorageError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Streams the rows of a table file, skipping blank lines.
fn for_each_row<T, F>(path: &Path, mut visit: F) -> Result<(), StorageError>
where
    T: StoredRow,
    F: FnMut(T) -> Result<bool, StorageError>,
{
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if !visit(serde_json::from_str(&line)?)? {
            break;
        }
    }
    Ok(())
}

impl<T: StoredRow> JsonLinesTable<T> {
    fn open(path: PathBuf) -> Result<(Self, usize), StorageError> {
        let appender = open_appender(&path)?;
        let mut last_id = 0;
        let mut count = 0;
        for_each_row::<T, _>(&path, |row| {
            last_id = last_id.max(row.id().unwrap_or(0));
            count += 1;
            Ok(true)
        })?;
        let table = Self { path, state: Mutex::new(TableState { appender, last_id }), rows: PhantomData };
        Ok((table, count))
    }

    fn insert(&self, mut row: T) -> Result<u64, StorageError> {
        let mut state = self.state.lock();
        let id = state.last_id + 1;
        row.set_id(id);
        let mut line = serde_json::to_vec(&row)?;
        line.push(b'\n');
        state.appender.write_all(&line)?;
        state.last_id = id;
        Ok(id)
    }

    fn save(&self, row: T) -> Result<u64, StorageError> {
        match row.id() {
            Some(id) => {
                self.rewrite(id, Some(row))?;
                Ok(id)
            }
            None => self.insert(row),
        }
    }

    fn delete(&self, id: u64) -> Result<(), StorageError> {
        self.rewrite(id, None)
    }

    /// Copies the table to a temporary file, replacing or dropping row `id`,
    /// then swaps it in. The table stays locked for the whole copy.
    fn rewrite(&self, id: u64, replacement: Option<T>) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let tmp_path = self.path.with_extension("jsonl.tmp");
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        let mut found = false;
        let mut replacement = replacement;

        let copied = for_each_row::<T, _>(&self.path, |row| {
            let row = if row.id() == Some(id) {
                found = true;
                match replacement.take() {
                    Some(new_row) => new_row,
                    None => return Ok(true),
                }
            } else {
                row
            };
            serde_json::to_writer(&mut out, &row)?;
            out.write_all(b"\n")?;
            Ok(true)
        })
        .and_then(|()| out.flush().map_err(StorageError::from));

        if let Err(e) = copied {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        drop(out);
        if !found {
            fs::remove_file(&tmp_path)?;
            return Err(StorageError::NotFound(id));
        }

        fs::rename(&tmp_path, &self.path)?;
        state.appender = open_appender(&self.path)?;
        Ok(())
    }

    fn get(&self, id: u64) -> Result<Option<T>, StorageError> {
        let _state = self.state.lock();
        let mut found = None;
        for_each_row::<T, _>(&self.path, |row| {
            if row.id() == Some(id) {
                found = Some(row);
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    fn all(&self) -> Result<Vec<T>, StorageError> {
        let _state = self.state.lock();
        let mut rows = Vec::new();
        for_each_row::<T, _>(&self.path, |row| {
            rows.push(row);
            Ok(true)
        })?;
        Ok(rows)
    }
}

pub struct JsonFileStore {
    samples: JsonLinesTable<SensorSample>,
    fixes: JsonLinesTable<PositionFix>,
}

impl JsonFileStore {
    pub const SAMPLES_FILE: &'static str = "sensor_samples.jsonl";
    pub const FIXES_FILE: &'static str = "position_fixes.jsonl";

    /// Opens (or creates) both tables under `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)?;
        let (samples, sample_count) = JsonLinesTable::open(dir.join(Self::SAMPLES_FILE))?;
        let (fixes, fix_count) = JsonLinesTable::open(dir.join(Self::FIXES_FILE))?;
        info!("store opened at {:?} ({} samples, {} fixes)", dir, sample_count, fix_count);
        Ok(Self { samples, fixes })
    }

    pub fn save_sample(&self, sample: SensorSample) -> Result<u64, StorageError> {
        self.samples.save(sample)
    }

    pub fn save_fix(&self, fix: PositionFix) -> Result<u64, StorageError> {
        self.fixes.save(fix)
    }

    pub fn sample(&self, id: u64) -> Result<Option<SensorSample>, StorageError> {
        self.samples.get(id)
    }

    pub fn fix(&self, id: u64) -> Result<Option<PositionFix>, StorageError> {
        self.fixes.get(id)
    }

    /// Reads the whole table from disk.
    pub fn samples(&self) -> Result<Vec<SensorSample>, StorageError> {
        self.samples.all()
    }

    pub fn fixes(&self) -> Result<Vec<PositionFix>, StorageError> {
        self.fixes.all()
    }

    pub fn delete_sample(&self, id: u64) -> Result<(), StorageError> {
        self.samples.delete(id)
    }

    pub fn delete_fix(&self, id: u64) -> Result<(), StorageError> {
        self.fixes.delete(id)
    }
}

/// The pipeline only ever inserts.
impl TelemetryStore for JsonFileStore {
    fn record_sensor_reading(&self, sample: &SensorSample) -> Result<(), StorageError> {
        let mut row = sample.clone();
        row.id = None;
        self.save_sample(row).map(|_| ())
    }

    fn record_position_fix(&self, fix: &PositionFix) -> Result<(), StorageError> {
        let mut row = fix.clone();
        row.id = None;
        self.save_fix(row).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(ts: &str, heartbeat: i32) -> SensorSample {
        SensorSample { timestamp: ts.into(), heartbeat: Some(heartbeat), ..Default::default() }
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        assert_eq!(store.save_sample(sample("2025-06-10 10:00:00", 70)).unwrap(), 1);
        assert_eq!(store.save_sample(sample("2025-06-10 10:00:01", 71)).unwrap(), 2);
        assert_eq!(store.samples().unwrap().len(), 2);
        assert_eq!(store.sample(2).unwrap().unwrap().heartbeat, Some(71));
        assert!(store.sample(3).unwrap().is_none());
    }

    #[test]
    fn test_insert_appends_one_line() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let path = dir.path().join(JsonFileStore::SAMPLES_FILE);

        store.record_sensor_reading(&sample("t0", 70)).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        store.record_sensor_reading(&sample("t1", 71)).unwrap();
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(first.lines().count(), 1);
        assert!(second.starts_with(&first), "earlier line was rewritten");
        assert_eq!(second.lines().count(), 2);
        let row: SensorSample = serde_json::from_str(second.lines().nth(1).unwrap()).unwrap();
        assert_eq!((row.id, row.heartbeat), (Some(2), Some(71)));
    }

    #[test]
    fn test_update_in_place_and_unknown_id() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let id = store.save_sample(sample("t0", 70)).unwrap();
        store.save_sample(sample("t1", 71)).unwrap();

        let mut row = store.sample(id).unwrap().unwrap();
        row.heartbeat = Some(90);
        assert_eq!(store.save_sample(row).unwrap(), id);
        let rows = store.samples().unwrap();
        assert_eq!(rows.iter().map(|r| r.heartbeat).collect::<Vec<_>>(), vec![Some(90), Some(71)]);

        let mut ghost = sample("t2", 60);
        ghost.id = Some(42);
        assert!(matches!(store.save_sample(ghost), Err(StorageError::NotFound(42))));
        assert!(!dir.path().join("sensor_samples.jsonl.tmp").exists());

        // appends keep working on the rewritten file
        assert_eq!(store.save_sample(sample("t3", 73)).unwrap(), 3);
        assert_eq!(store.samples().unwrap().len(), 3);
    }

    #[test]
    fn test_reopen_continues_ids() {
        let dir = tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).unwrap();
            store.record_sensor_reading(&sample("t0", 70)).unwrap();
            store
                .record_position_fix(&PositionFix {
                    timestamp: "t0".into(),
                    latitude: Some("51.539".into()),
                    ..Default::default()
                })
                .unwrap();
        }
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(store.samples().unwrap().len(), 1);
        assert_eq!(store.fix(1).unwrap().unwrap().latitude.as_deref(), Some("51.539"));
        assert_eq!(store.save_sample(sample("t1", 72)).unwrap(), 2);
    }

    #[test]
    fn test_record_ignores_caller_id() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let mut row = sample("t0", 70);
        row.id = Some(7);
        store.record_sensor_reading(&row).unwrap();
        assert_eq!(store.samples().unwrap()[0].id, Some(1));
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let id = store.save_sample(sample("t0", 70)).unwrap();
        store.delete_sample(id).unwrap();
        assert!(store.samples().unwrap().is_empty());
        assert!(matches!(store.delete_sample(id), Err(StorageError::NotFound(_))));
        assert!(matches!(store.delete_fix(1), Err(StorageError::NotFound(1))));
        // ids are not reused after a delete
        assert_eq!(store.save_sample(sample("t1", 71)).unwrap(), 2);
    }
}
