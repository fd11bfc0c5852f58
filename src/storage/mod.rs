//! Record storage for classification results
//!
//! One `ClassificationRecord` per distinct grid content, keyed by the
//! SHA-256 of the canonical sequence. Backends only need five operations;
//! `insert_if_absent` must be atomic so racing first-time submissions of
//! the same grid converge on a single record.

mod json_file;
mod memory;
mod sqlite;

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::error::DetectorError;
use crate::grid::{content_key_of, Grid};
use crate::stats::DateRange;
use chrono::{DateTime, SubsecRound, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// A persisted classification, never mutated after insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// SHA-256 hex of `raw_sequence`
    pub content_key: String,
    /// Rows joined by ","
    pub raw_sequence: String,
    pub is_mutant: bool,
    /// First-persist time, millisecond precision
    pub created_at: DateTime<Utc>,
}

impl ClassificationRecord {
    pub fn new(grid: &Grid, is_mutant: bool) -> Self {
        Self::from_parts(grid.canonical_sequence(), is_mutant, Utc::now())
    }

    /// Build a record from an already-canonical sequence. The timestamp is
    /// truncated to milliseconds so every backend round-trips it exactly.
    pub fn from_parts(raw_sequence: impl Into<String>, is_mutant: bool, created_at: DateTime<Utc>) -> Self {
        let raw_sequence = raw_sequence.into();
        Self {
            content_key: content_key_of(&raw_sequence),
            raw_sequence,
            is_mutant,
            created_at: created_at.trunc_subsecs(3),
        }
    }

    /// The key still matches the sequence it was computed from
    pub fn is_consistent(&self) -> bool {
        self.content_key == content_key_of(&self.raw_sequence)
    }

    pub fn label(&self) -> &'static str {
        if self.is_mutant {
            "mutant"
        } else {
            "human"
        }
    }
}

/// Which records `count_where` should count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFilter {
    pub is_mutant: bool,
    pub range: Option<DateRange>,
}

impl RecordFilter {
    pub fn mutants(range: Option<DateRange>) -> Self {
        Self { is_mutant: true, range }
    }

    pub fn humans(range: Option<DateRange>) -> Self {
        Self { is_mutant: false, range }
    }

    pub fn matches(&self, record: &ClassificationRecord) -> bool {
        record.is_mutant == self.is_mutant
            && self
                .range
                .map_or(true, |range| range.contains(&record.created_at))
    }
}

/// Mutant and human record counts taken from one view of the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub mutant: u64,
    pub human: u64,
}

impl ClassCounts {
    /// Count `records` falling inside `range`
    pub fn tally<'a, I>(records: I, range: Option<DateRange>) -> Self
    where
        I: IntoIterator<Item = &'a ClassificationRecord>,
    {
        records
            .into_iter()
            .filter(|r| range.map_or(true, |range| range.contains(&r.created_at)))
            .fold(Self::default(), |mut counts, r| {
                if r.is_mutant {
                    counts.mutant += 1;
                } else {
                    counts.human += 1;
                }
                counts
            })
    }
}

/// Result of `insert_if_absent`: the record that is in the store afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(ClassificationRecord),
    /// Another writer got there first; this is the stored record
    AlreadyPresent(ClassificationRecord),
}

impl InsertOutcome {
    pub fn record(&self) -> &ClassificationRecord {
        match self {
            InsertOutcome::Inserted(r) | InsertOutcome::AlreadyPresent(r) => r,
        }
    }

    pub fn into_record(self) -> ClassificationRecord {
        match self {
            InsertOutcome::Inserted(r) | InsertOutcome::AlreadyPresent(r) => r,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Storage capability set shared by the classification store and the
/// stats aggregator
pub trait RecordBackend: Send + Sync {
    fn find_by_key(&self, content_key: &str) -> Result<Option<ClassificationRecord>, DetectorError>;

    /// Insert unless a record with the same key exists. Atomic per key.
    fn insert_if_absent(&self, record: ClassificationRecord) -> Result<InsertOutcome, DetectorError>;

    /// Returns whether a record was removed
    fn delete_by_key(&self, content_key: &str) -> Result<bool, DetectorError>;

    fn count_where(&self, filter: &RecordFilter) -> Result<u64, DetectorError>;

    /// Both counts from a single consistent read, so concurrent writes
    /// never pair a mutant count with a human count from another moment
    fn count_by_class(&self, range: Option<DateRange>) -> Result<ClassCounts, DetectorError>;

    fn backend_type(&self) -> &'static str;
}

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Json,
    Sqlite,
}

impl BackendKind {
    pub fn default_path(self) -> &'static str {
        match self {
            BackendKind::Memory => "",
            BackendKind::Json => "mutant-records.json",
            BackendKind::Sqlite => "mutant-records.db",
        }
    }
}

impl FromStr for BackendKind {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "json" => Ok(BackendKind::Json),
            "sqlite" | "db" => Ok(BackendKind::Sqlite),
            other => Err(DetectorError::Config(format!(
                "unknown backend '{}', expected memory|json|sqlite",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
        };
        write!(f, "{}", name)
    }
}

/// Open the selected backend. `path` is ignored for the memory backend.
pub fn open_backend(kind: BackendKind, path: impl AsRef<Path>) -> Result<Arc<dyn RecordBackend>, DetectorError> {
    let path = path.as_ref();
    let backend: Arc<dyn RecordBackend> = match kind {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Json => Arc::new(JsonFileBackend::open(path)?),
        BackendKind::Sqlite => Arc::new(SqliteBackend::open(path)?),
    };
    info!("Opened {} record backend ({})", backend.backend_type(), path.display());
    Ok(backend)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn record(raw: &str, is_mutant: bool, created_at: DateTime<Utc>) -> ClassificationRecord {
        ClassificationRecord::from_parts(raw, is_mutant, created_at)
    }

    /// Contract every backend must satisfy
    pub(crate) fn exercise_backend(backend: &dyn RecordBackend) {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let a = record("AAAA,TTTT,CCGG,AGTC", true, t0);
        let b = record("ATGC,CGTA,TACG,GCAT", false, t0 + chrono::Duration::days(1));

        assert_eq!(backend.find_by_key(&a.content_key).unwrap(), None);

        let out = backend.insert_if_absent(a.clone()).unwrap();
        assert!(out.was_inserted());
        assert_eq!(backend.find_by_key(&a.content_key).unwrap(), Some(a.clone()));

        // second insert for the same content keeps the first record
        let dup = record("AAAA,TTTT,CCGG,AGTC", true, t0 + chrono::Duration::hours(5));
        let out = backend.insert_if_absent(dup).unwrap();
        assert!(!out.was_inserted());
        assert_eq!(out.record().created_at, t0);

        backend.insert_if_absent(b.clone()).unwrap();
        assert_eq!(backend.count_where(&RecordFilter::mutants(None)).unwrap(), 1);
        assert_eq!(backend.count_where(&RecordFilter::humans(None)).unwrap(), 1);

        let day_two = DateRange::since(t0 + chrono::Duration::hours(1));
        assert_eq!(backend.count_where(&RecordFilter::mutants(Some(day_two))).unwrap(), 0);
        assert_eq!(backend.count_where(&RecordFilter::humans(Some(day_two))).unwrap(), 1);

        // bounds are inclusive
        let exact = DateRange::between(t0, t0);
        assert_eq!(backend.count_where(&RecordFilter::mutants(Some(exact))).unwrap(), 1);

        assert_eq!(
            backend.count_by_class(None).unwrap(),
            ClassCounts { mutant: 1, human: 1 }
        );
        assert_eq!(
            backend.count_by_class(Some(day_two)).unwrap(),
            ClassCounts { mutant: 0, human: 1 }
        );

        assert!(backend.delete_by_key(&a.content_key).unwrap());
        assert!(!backend.delete_by_key(&a.content_key).unwrap());
        assert_eq!(backend.find_by_key(&a.content_key).unwrap(), None);
        assert_eq!(backend.count_where(&RecordFilter::mutants(None)).unwrap(), 0);
        assert_eq!(
            backend.count_by_class(None).unwrap(),
            ClassCounts { mutant: 0, human: 1 }
        );
    }

    #[test]
    fn test_record_from_grid() {
        let grid = Grid::parse(&["AAAA", "TTTT", "CCGG", "AGTC"]).unwrap();
        let rec = ClassificationRecord::new(&grid, true);
        assert_eq!(rec.raw_sequence, "AAAA,TTTT,CCGG,AGTC");
        assert_eq!(rec.content_key, grid.content_key());
        assert!(rec.is_consistent());
        assert_eq!(rec.label(), "mutant");
        assert_eq!(rec.created_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_filter_matches() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let rec = record("ATGC,CGTA,TACG,GCAT", false, t0);
        assert!(RecordFilter::humans(None).matches(&rec));
        assert!(!RecordFilter::mutants(None).matches(&rec));
        assert!(RecordFilter::humans(Some(DateRange::until(t0))).matches(&rec));
        assert!(!RecordFilter::humans(Some(DateRange::since(t0 + chrono::Duration::milliseconds(1)))).matches(&rec));
    }

    #[test]
    fn test_tally_respects_range() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let records = vec![
            record("AAAA,TTTT,CCGG,AGTC", true, t0),
            record("ATGC,CGTA,TACG,GCAT", false, t0),
            record("CCCC,TTTT,CCGG,AGTC", true, t0 + chrono::Duration::days(2)),
        ];
        assert_eq!(ClassCounts::tally(&records, None), ClassCounts { mutant: 2, human: 1 });
        let later = DateRange::since(t0 + chrono::Duration::days(1));
        assert_eq!(ClassCounts::tally(&records, Some(later)), ClassCounts { mutant: 1, human: 0 });
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!(" JSON ".parse::<BackendKind>().unwrap(), BackendKind::Json);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!(matches!(
            "postgres".parse::<BackendKind>(),
            Err(DetectorError::Config(_))
        ));
        assert_eq!(BackendKind::Json.to_string(), "json");
    }

    #[test]
    fn test_open_memory_backend() {
        let backend = open_backend(BackendKind::Memory, "").unwrap();
        assert_eq!(backend.backend_type(), "memory");
        exercise_backend(backend.as_ref());
    }
}
