use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};

use crate::error::AppError;
use crate::loader::RowRecord;

/// Dataset slots between upload and download, one per session.
///
/// Each slot is a JSON file `<key>.json` under the data directory. The
/// in-memory index records when a slot was written; slots not written by
/// this process, or older than the TTL, read as empty.
pub struct DatasetStore {
    dir: PathBuf,
    ttl: Duration,
    index: RwLock<HashMap<String, SystemTime>>,
}

impl DatasetStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Dataset store at {}", dir.display());

        Ok(DatasetStore {
            dir,
            ttl,
            index: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Overwrite the slot for `key` with `rows`
    ///
    /// The JSON is written to a temporary file first and renamed into
    /// place, so a failed save leaves the previous slot untouched.
    pub fn save(&self, key: &str, rows: &[RowRecord]) -> Result<(), AppError> {
        self.purge_expired();

        let path = self.json_path(key);
        let tmp = path.with_extension("json.tmp");

        let result = write_json(&tmp, rows)
            .and_then(|_| fs::rename(&tmp, &path).map_err(AppError::from));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        self.index_mut().insert(key.to_string(), SystemTime::now());
        debug!("Saved {} rows for session slot {}", rows.len(), key);
        Ok(())
    }

    /// Read the slot for `key`
    ///
    /// # Errors
    /// * `AppError::NoDataAvailable` if nothing was saved for `key`, or it expired
    pub fn load(&self, key: &str) -> Result<Vec<RowRecord>, AppError> {
        let written_at = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .ok_or(AppError::NoDataAvailable)?;

        if self.is_expired(written_at) {
            self.remove(key);
            return Err(AppError::NoDataAvailable);
        }

        let file = match File::open(self.json_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Slot {} indexed but missing on disk", key);
                self.index_mut().remove(key);
                return Err(AppError::NoDataAvailable);
            }
            Err(e) => return Err(e.into()),
        };

        let rows: Vec<RowRecord> = serde_json::from_reader(BufReader::new(file))?;
        Ok(rows)
    }

    /// Write the CSV rendered from a slot next to it and return its path.
    pub fn save_export(&self, key: &str, csv: &[u8]) -> Result<PathBuf, AppError> {
        let path = self.dir.join(format!("{}.csv", key));
        fs::write(&path, csv)?;
        Ok(path)
    }

    /// Drop the slot and its export for `key`, if any.
    pub fn remove(&self, key: &str) {
        self.index_mut().remove(key);
        let _ = fs::remove_file(self.json_path(key));
        let _ = fs::remove_file(self.dir.join(format!("{}.csv", key)));
    }

    /// Remove every expired slot. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let expired: Vec<String> = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, written_at)| self.is_expired(**written_at))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        if !expired.is_empty() {
            debug!("Purged {} expired dataset slots", expired.len());
        }
        expired.len()
    }

    fn is_expired(&self, written_at: SystemTime) -> bool {
        written_at
            .elapsed()
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    fn json_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn index_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SystemTime>> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_json(path: &Path, rows: &[RowRecord]) -> Result<(), AppError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, rows)?;
    writer.flush()?;
    Ok(())
}
