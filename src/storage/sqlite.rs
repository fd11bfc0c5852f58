//! SQLite record backend
//!
//! `content_key` is the primary key, so uniqueness is enforced by the
//! database itself. Inserts use `ON CONFLICT DO NOTHING` inside an
//! immediate transaction and then read back whichever row won.
//! Timestamps are stored as Unix milliseconds so range filters compare
//! integers.

use super::{ClassCounts, ClassificationRecord, InsertOutcome, RecordBackend, RecordFilter};
use crate::error::DetectorError;
use crate::stats::DateRange;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS classification_records (
    content_key  TEXT PRIMARY KEY NOT NULL,
    raw_sequence TEXT NOT NULL,
    is_mutant    INTEGER NOT NULL,
    created_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_is_mutant
    ON classification_records (is_mutant, created_at);
";

const SELECT_BY_KEY: &str = "SELECT content_key, raw_sequence, is_mutant, created_at
     FROM classification_records WHERE content_key = ?1";

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Private database that disappears with the backend
    pub fn open_in_memory() -> Result<Self, DetectorError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DetectorError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DetectorError> {
        self.conn
            .lock()
            .map_err(|_| DetectorError::StoreUnavailable("SQLite connection lock poisoned".into()))
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(String, String, bool, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_record(
    (content_key, raw_sequence, is_mutant, created_ms): (String, String, bool, i64),
) -> Result<ClassificationRecord, DetectorError> {
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_ms).ok_or_else(|| {
        DetectorError::StoreUnavailable(format!(
            "record {} has out-of-range timestamp {}",
            content_key, created_ms
        ))
    })?;
    Ok(ClassificationRecord {
        content_key,
        raw_sequence,
        is_mutant,
        created_at,
    })
}

impl RecordBackend for SqliteBackend {
    fn find_by_key(&self, content_key: &str) -> Result<Option<ClassificationRecord>, DetectorError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(SELECT_BY_KEY, params![content_key], row_to_record)
            .optional()?;
        row.map(into_record).transpose()
    }

    fn insert_if_absent(&self, record: ClassificationRecord) -> Result<InsertOutcome, DetectorError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO classification_records (content_key, raw_sequence, is_mutant, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(content_key) DO NOTHING",
            params![
                record.content_key,
                record.raw_sequence,
                record.is_mutant,
                record.created_at.timestamp_millis()
            ],
        )?;

        let outcome = if inserted == 1 {
            InsertOutcome::Inserted(record)
        } else {
            let existing = tx.query_row(SELECT_BY_KEY, params![record.content_key], row_to_record)?;
            InsertOutcome::AlreadyPresent(into_record(existing)?)
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn delete_by_key(&self, content_key: &str) -> Result<bool, DetectorError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM classification_records WHERE content_key = ?1",
            params![content_key],
        )?;
        Ok(removed > 0)
    }

    fn count_where(&self, filter: &RecordFilter) -> Result<u64, DetectorError> {
        let conn = self.lock()?;
        let start = filter.range.and_then(|r| r.start).map(|t| t.timestamp_millis());
        let end = filter.range.and_then(|r| r.end).map(|t| t.timestamp_millis());
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM classification_records
             WHERE is_mutant = ?1
               AND (?2 IS NULL OR created_at >= ?2)
               AND (?3 IS NULL OR created_at <= ?3)",
            params![filter.is_mutant, start, end],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_by_class(&self, range: Option<DateRange>) -> Result<ClassCounts, DetectorError> {
        let conn = self.lock()?;
        let start = range.and_then(|r| r.start).map(|t| t.timestamp_millis());
        let end = range.and_then(|r| r.end).map(|t| t.timestamp_millis());
        let (mutant, human): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN is_mutant = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_mutant = 0 THEN 1 ELSE 0 END), 0)
             FROM classification_records
             WHERE (?1 IS NULL OR created_at >= ?1)
               AND (?2 IS NULL OR created_at <= ?2)",
            params![start, end],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ClassCounts {
            mutant: mutant as u64,
            human: human as u64,
        })
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::exercise_backend;
    use std::path::PathBuf;

    fn test_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mutant-sqlite-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_sqlite_backend_contract() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        exercise_backend(&backend);
    }

    #[test]
    fn test_persistence() {
        let dir = test_dir();
        let path = dir.join("records.db");
        let rec = ClassificationRecord::from_parts("ATGC,CGTA,TACG,GCAT", false, Utc::now());

        {
            let backend = SqliteBackend::open(&path).unwrap();
            assert!(backend.insert_if_absent(rec.clone()).unwrap().was_inserted());
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.find_by_key(&rec.content_key).unwrap(), Some(rec));
        assert_eq!(backend.count_where(&RecordFilter::humans(None)).unwrap(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unique_key_enforced_by_schema() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let rec = ClassificationRecord::from_parts("AAAA,TTTT,CCGG,AGTC", true, Utc::now());
        backend.insert_if_absent(rec.clone()).unwrap();

        let conn = backend.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO classification_records (content_key, raw_sequence, is_mutant, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![rec.content_key, rec.raw_sequence, rec.is_mutant, 0i64],
        );
        // a constraint violation will not succeed on retry
        let err = DetectorError::from(result.unwrap_err());
        assert!(matches!(err, DetectorError::StoreFault(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_concurrent_inserts_keep_one_record() {
        let dir = test_dir();
        let backend = SqliteBackend::open(dir.join("race.db")).unwrap();
        let rec = ClassificationRecord::from_parts("AAAA,TTTT,CCGG,AGTC", true, Utc::now());

        let outcomes: Vec<InsertOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| backend.insert_if_absent(rec.clone()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|o| o.was_inserted()).count(), 1);
        assert!(outcomes.iter().all(|o| o.record() == &rec));
        assert_eq!(backend.count_where(&RecordFilter::mutants(None)).unwrap(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
