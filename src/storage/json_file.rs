//! JSON file record backend
//!
//! The file is the source of truth. Every operation takes an exclusive
//! lock on a sibling `.lock` file, re-reads the index and, for mutations,
//! writes it back before releasing the lock, so any number of handles and
//! processes can share one path. Writes go to a sibling temp file that is
//! renamed into place. Every record's key is re-derived on load; a
//! mismatch means the file was edited or corrupted.

use super::{ClassCounts, ClassificationRecord, InsertOutcome, RecordBackend, RecordFilter};
use crate::error::DetectorError;
use crate::stats::DateRange;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// On-disk layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordIndex {
    pub records: HashMap<String, ClassificationRecord>,
    pub last_updated: DateTime<Utc>,
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

pub struct JsonFileBackend {
    path: PathBuf,
    lock_file: Mutex<fd_lock::RwLock<File>>,
}

impl JsonFileBackend {
    /// Open the file at `path`, starting empty when it does not exist yet.
    /// An existing file is validated before the backend is returned.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling(&path, ".lock"))?;

        let backend = Self {
            path,
            lock_file: Mutex::new(fd_lock::RwLock::new(lock_file)),
        };
        let held = backend.with_index(|index| Ok(index.records.len()))?;
        info!("JSON record store at {} holds {} records", backend.path.display(), held);
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a fresh read of the file while holding the file lock
    fn with_index<T, F>(&self, f: F) -> Result<T, DetectorError>
    where
        F: FnOnce(&mut RecordIndex) -> Result<T, DetectorError>,
    {
        let mut lock_file = self
            .lock_file
            .lock()
            .map_err(|_| DetectorError::StoreUnavailable("JSON backend lock poisoned".into()))?;
        let _guard = lock_file.write()?;
        let mut index = self.load_index()?;
        f(&mut index)
    }

    fn load_index(&self) -> Result<RecordIndex, DetectorError> {
        if !self.path.exists() {
            return Ok(RecordIndex::default());
        }
        let json = std::fs::read_to_string(&self.path)?;
        let index: RecordIndex = serde_json::from_str(&json)?;
        for (key, record) in &index.records {
            if key != &record.content_key || !record.is_consistent() {
                return Err(DetectorError::StoreUnavailable(format!(
                    "record {} in {} does not match its sequence",
                    key,
                    self.path.display()
                )));
            }
        }
        Ok(index)
    }

    /// Caller must hold the file lock
    fn save_index(&self, index: &mut RecordIndex) -> Result<(), DetectorError> {
        index.last_updated = Utc::now();
        let json = serde_json::to_string_pretty(index)?;
        let tmp = sibling(&self.path, ".tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Saved {} records to {}", index.records.len(), self.path.display());
        Ok(())
    }
}

/// `records.json` -> `records.json<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl RecordBackend for JsonFileBackend {
    fn find_by_key(&self, content_key: &str) -> Result<Option<ClassificationRecord>, DetectorError> {
        self.with_index(|index| Ok(index.records.remove(content_key)))
    }

    fn insert_if_absent(&self, record: ClassificationRecord) -> Result<InsertOutcome, DetectorError> {
        self.with_index(|index| {
            if let Some(existing) = index.records.get(&record.content_key) {
                return Ok(InsertOutcome::AlreadyPresent(existing.clone()));
            }
            index.records.insert(record.content_key.clone(), record.clone());
            self.save_index(index)?;
            Ok(InsertOutcome::Inserted(record))
        })
    }

    fn delete_by_key(&self, content_key: &str) -> Result<bool, DetectorError> {
        self.with_index(|index| {
            if index.records.remove(content_key).is_none() {
                return Ok(false);
            }
            self.save_index(index)?;
            Ok(true)
        })
    }

    fn count_where(&self, filter: &RecordFilter) -> Result<u64, DetectorError> {
        self.with_index(|index| Ok(index.records.values().filter(|r| filter.matches(r)).count() as u64))
    }

    fn count_by_class(&self, range: Option<DateRange>) -> Result<ClassCounts, DetectorError> {
        self.with_index(|index| Ok(ClassCounts::tally(index.records.values(), range)))
    }

    fn backend_type(&self) -> &'static str {
        "json"
    }
}
