//! mutant-core — mutant DNA detection with memoized results
//!
//! A DNA sample is an NxN grid of A/T/C/G. It is mutant when it holds more
//! than one run of four identical bases horizontally, vertically or
//! diagonally. Results are stored against a SHA-256 of the grid content so
//! a repeated sample is answered from the store instead of rescanned.

pub mod classify;
pub mod config;
pub mod error;
pub mod grid;
pub mod stats;
pub mod storage;

pub use classify::{ClassificationStore, Classifier};
pub use config::Config;
pub use error::DetectorError;
pub use grid::{Grid, GridError, GridLimits, GridScanner, RunCounting};
pub use stats::{DateRange, StatsAggregator, StatsSnapshot};
pub use storage::{
    BackendKind, ClassCounts, ClassificationRecord, JsonFileBackend, MemoryBackend, RecordBackend,
    SqliteBackend,
};
