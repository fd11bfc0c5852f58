//! ClassificationStore — memoized mutant detection
//!
//! A grid is scanned at most once per distinct content: the content key is
//! looked up first and only a miss reaches the classifier. Racing first
//! submissions of the same grid are reconciled by the backend's
//! `insert_if_absent`, and every caller returns the stored flag.

use crate::error::DetectorError;
use crate::grid::{Grid, GridLimits, GridScanner};
use crate::storage::{ClassificationRecord, InsertOutcome, RecordBackend};
use log::{debug, info};
use std::sync::Arc;

/// Anything that can decide mutant vs human for a valid grid
pub trait Classifier: Send + Sync {
    fn is_mutant(&self, grid: &Grid) -> bool;
}

impl Classifier for GridScanner {
    fn is_mutant(&self, grid: &Grid) -> bool {
        self.scan(grid)
    }
}

pub struct ClassificationStore {
    backend: Arc<dyn RecordBackend>,
    classifier: Arc<dyn Classifier>,
    limits: GridLimits,
}

impl ClassificationStore {
    /// Store backed by `backend`, classifying with the default scanner
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self::with_classifier(backend, Arc::new(GridScanner::new()))
    }

    pub fn with_classifier(backend: Arc<dyn RecordBackend>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            backend,
            classifier,
            limits: GridLimits::default(),
        }
    }

    /// Limits applied by `classify_rows`
    pub fn with_limits(mut self, limits: GridLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn backend(&self) -> &Arc<dyn RecordBackend> {
        &self.backend
    }

    /// Cached classification of `grid`, scanning only on a miss
    pub fn classify(&self, grid: &Grid) -> Result<bool, DetectorError> {
        self.classify_record(grid).map(|record| record.is_mutant)
    }

    /// Same as `classify` but returns the stored record
    pub fn classify_record(&self, grid: &Grid) -> Result<ClassificationRecord, DetectorError> {
        let key = grid.content_key();
        if let Some(record) = self.backend.find_by_key(&key)? {
            debug!("Cache hit for {} ({})", short(&key), record.label());
            return Ok(record);
        }

        let is_mutant = self.classifier.is_mutant(grid);
        let record = ClassificationRecord::new(grid, is_mutant);
        debug_assert_eq!(record.content_key, key);

        match self.backend.insert_if_absent(record)? {
            InsertOutcome::Inserted(record) => {
                debug!("Stored new record {} ({})", short(&key), record.label());
                Ok(record)
            }
            InsertOutcome::AlreadyPresent(record) => {
                debug!("Record {} was stored concurrently, keeping existing", short(&key));
                Ok(record)
            }
        }
    }

    /// Validate raw rows with this store's limits, then classify
    pub fn classify_rows<S: AsRef<str>>(&self, rows: &[S]) -> Result<bool, DetectorError> {
        let grid = Grid::parse_with(rows, &self.limits)?;
        self.classify(&grid)
    }

    /// Stored record for a content key, if any
    pub fn record(&self, content_key: &str) -> Result<Option<ClassificationRecord>, DetectorError> {
        self.backend.find_by_key(content_key)
    }

    /// Remove the record for `content_key`; a later classify of the same
    /// grid scans again
    pub fn delete(&self, content_key: &str) -> Result<(), DetectorError> {
        if self.backend.delete_by_key(content_key)? {
            info!("Deleted classification record {}", short(content_key));
            Ok(())
        } else {
            Err(DetectorError::NotFound(content_key.to_string()))
        }
    }

    pub fn summary(&self) -> Result<String, DetectorError> {
        let counts = self.backend.count_by_class(None)?;
        Ok(format!(
            "ClassificationStore [{}] | {} records | {} mutant | {} human",
            self.backend.backend_type(),
            counts.mutant + counts.human,
            counts.mutant,
            counts.human
        ))
    }
}

fn short(key: &str) -> &str {
    &key[..8.min(key.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::RunCounting;
    use crate::storage::{JsonFileBackend, MemoryBackend, RecordFilter, SqliteBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scanner wrapper that counts invocations
    struct CountingScanner {
        inner: GridScanner,
        calls: AtomicUsize,
    }

    impl CountingScanner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: GridScanner::new(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Classifier for CountingScanner {
        fn is_mutant(&self, grid: &Grid) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.scan(grid)
        }
    }

    fn mutant_grid() -> Grid {
        Grid::parse(&["ATGCGA", "CAGTGC", "TTATGT", "AGAAGG", "CCCCTA", "TCACTG"]).unwrap()
    }

    fn human_grid() -> Grid {
        Grid::parse(&["ATGCGA", "CAGTGC", "TTATTT", "AGACGG", "GCGTCA", "TCACTG"]).unwrap()
    }

    fn counting_store(backend: Arc<dyn RecordBackend>) -> (ClassificationStore, Arc<CountingScanner>) {
        let scanner = CountingScanner::new();
        let store = ClassificationStore::with_classifier(backend, scanner.clone());
        (store, scanner)
    }

    #[test]
    fn test_second_classify_is_cache_hit() {
        let (store, scanner) = counting_store(Arc::new(MemoryBackend::new()));
        let grid = mutant_grid();

        assert!(store.classify(&grid).unwrap());
        assert!(store.classify(&grid).unwrap());
        assert_eq!(scanner.calls(), 1);

        assert!(!store.classify(&human_grid()).unwrap());
        assert!(!store.classify(&human_grid()).unwrap());
        assert_eq!(scanner.calls(), 2);
    }

    #[test]
    fn test_equal_rows_share_one_record() {
        let (store, scanner) = counting_store(Arc::new(MemoryBackend::new()));
        let rows: Vec<String> = ["AAAA", "TTTT", "CCGG", "AGTC"].iter().map(|s| s.to_string()).collect();
        assert!(store.classify_rows(&rows).unwrap());
        assert!(store.classify_rows(&["AAAA", "TTTT", "CCGG", "AGTC"]).unwrap());
        assert_eq!(scanner.calls(), 1);
        assert!(store.summary().unwrap().contains("1 records"));
    }

    #[test]
    fn test_delete_forces_rescan() {
        let (store, scanner) = counting_store(Arc::new(MemoryBackend::new()));
        let grid = mutant_grid();
        let first = store.classify_record(&grid).unwrap();

        store.delete(&first.content_key).unwrap();
        assert_eq!(store.record(&first.content_key).unwrap(), None);

        assert!(store.classify(&grid).unwrap());
        assert_eq!(scanner.calls(), 2);
        assert!(store.record(&first.content_key).unwrap().is_some());
    }

    #[test]
    fn test_delete_absent_key_is_not_found() {
        let store = ClassificationStore::new(Arc::new(MemoryBackend::new()));
        let err = store.delete("0000000000000000").unwrap_err();
        assert!(matches!(err, DetectorError::NotFound(ref k) if k == "0000000000000000"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_rows_rejects_invalid_input() {
        let (store, scanner) = counting_store(Arc::new(MemoryBackend::new()));
        let err = store.classify_rows(&["AAAA", "TTTT", "CCGG"]).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidGrid(_)));

        let small = ClassificationStore::new(Arc::new(MemoryBackend::new()))
            .with_limits(GridLimits { max_dimension: 4 });
        assert!(matches!(
            small.classify_rows(&["AAAAA", "TTTTT", "CCGGA", "AGTCA", "AGTCA"]),
            Err(DetectorError::InvalidGrid(_))
        ));
        assert_eq!(scanner.calls(), 0);
    }

    #[test]
    fn test_record_contents() {
        let store = ClassificationStore::new(Arc::new(MemoryBackend::new()));
        let grid = human_grid();
        let record = store.classify_record(&grid).unwrap();
        assert_eq!(record.raw_sequence, "ATGCGA,CAGTGC,TTATTT,AGACGG,GCGTCA,TCACTG");
        assert_eq!(record.content_key, grid.content_key());
        assert!(!record.is_mutant);
        assert_eq!(store.record(&record.content_key).unwrap(), Some(record));
    }

    #[test]
    fn test_stored_flag_wins_over_classifier() {
        // A record written under the overlapping rule keeps its flag even
        // when a later store uses the maximal rule
        let backend: Arc<dyn RecordBackend> = Arc::new(MemoryBackend::new());
        let grid = Grid::parse(&["AAAAAT", "CTGCAG", "TCATGC", "GAGCTA", "CTACGT", "TGCTAC"]).unwrap();

        let overlapping = ClassificationStore::with_classifier(
            backend.clone(),
            Arc::new(GridScanner::with_counting(RunCounting::OverlappingWindows)),
        );
        assert!(overlapping.classify(&grid).unwrap());

        let maximal = ClassificationStore::new(backend);
        assert!(maximal.classify(&grid).unwrap());
    }

    #[test]
    fn test_concurrent_same_grid() {
        let backend: Arc<dyn RecordBackend> = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let (store, scanner) = counting_store(backend.clone());
        let grid = mutant_grid();

        let results: Vec<ClassificationRecord> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| store.classify_record(&grid).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r == &results[0]));
        assert!(results[0].is_mutant);
        assert!(scanner.calls() >= 1);
        assert_eq!(backend.count_where(&RecordFilter::mutants(None)).unwrap(), 1);

        assert!(store.classify(&grid).unwrap());
        let calls = scanner.calls();
        store.classify(&grid).unwrap();
        assert_eq!(scanner.calls(), calls);
    }

    #[test]
    fn test_json_backend_end_to_end() {
        let dir = std::env::temp_dir().join(format!("mutant-classify-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("records.json");
        let key = {
            let store = ClassificationStore::new(Arc::new(JsonFileBackend::open(&path).unwrap()));
            store.classify_record(&mutant_grid()).unwrap().content_key
        };

        let (store, scanner) = counting_store(Arc::new(JsonFileBackend::open(&path).unwrap()));
        assert!(store.classify(&mutant_grid()).unwrap());
        assert_eq!(scanner.calls(), 0);
        store.delete(&key).unwrap();
        assert!(matches!(store.delete(&key), Err(DetectorError::NotFound(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
