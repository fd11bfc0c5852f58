//! In-memory record backend, used by tests and the `memory` config option

use super::{ClassCounts, ClassificationRecord, InsertOutcome, RecordBackend, RecordFilter};
use crate::error::DetectorError;
use crate::stats::DateRange;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, ClassificationRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, DetectorError> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DetectorError> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<T>(_: PoisonError<T>) -> DetectorError {
    DetectorError::StoreUnavailable("memory backend lock poisoned".into())
}

impl RecordBackend for MemoryBackend {
    fn find_by_key(&self, content_key: &str) -> Result<Option<ClassificationRecord>, DetectorError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(content_key).cloned())
    }

    fn insert_if_absent(&self, record: ClassificationRecord) -> Result<InsertOutcome, DetectorError> {
        let mut records = self.records.write().map_err(poisoned)?;
        if let Some(existing) = records.get(&record.content_key) {
            return Ok(InsertOutcome::AlreadyPresent(existing.clone()));
        }
        records.insert(record.content_key.clone(), record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    fn delete_by_key(&self, content_key: &str) -> Result<bool, DetectorError> {
        let mut records = self.records.write().map_err(poisoned)?;
        Ok(records.remove(content_key).is_some())
    }

    fn count_where(&self, filter: &RecordFilter) -> Result<u64, DetectorError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.values().filter(|r| filter.matches(r)).count() as u64)
    }

    fn count_by_class(&self, range: Option<DateRange>) -> Result<ClassCounts, DetectorError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(ClassCounts::tally(records.values(), range))
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
