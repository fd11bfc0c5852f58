//! Statistics over stored classifications
//!
//! Counts are read from the backend on every call, so deletions show up
//! immediately.

use crate::error::DetectorError;
use crate::storage::RecordBackend;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Inclusive time window; a missing bound is open on that side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(Some(start), Some(end))
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self::new(Some(start), None)
    }

    pub fn until(end: DateTime<Utc>) -> Self {
        Self::new(None, Some(end))
    }

    /// Whole calendar days in UTC: `start` from 00:00:00.000 through
    /// `end` at 23:59:59.999
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let start = start
            .and_then(|d| d.and_hms_milli_opt(0, 0, 0, 0))
            .map(|t| t.and_utc());
        let end = end
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|t| t.and_utc());
        Self { start, end }
    }

    /// No bound at all
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *at >= s) && self.end.map_or(true, |e| *at <= e)
    }
}

/// Mutant and human counts with their ratio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(rename = "count_mutant_dna")]
    pub mutant_count: u64,
    #[serde(rename = "count_human_dna")]
    pub human_count: u64,
    pub ratio: f64,
}

impl StatsSnapshot {
    /// `ratio` is 0.0 when there are no humans
    pub fn from_counts(mutant_count: u64, human_count: u64) -> Self {
        let ratio = if human_count > 0 {
            mutant_count as f64 / human_count as f64
        } else {
            0.0
        };
        Self {
            mutant_count,
            human_count,
            ratio,
        }
    }

    pub fn total(&self) -> u64 {
        self.mutant_count + self.human_count
    }
}

pub struct StatsAggregator {
    backend: Arc<dyn RecordBackend>,
}

impl StatsAggregator {
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self { backend }
    }

    /// Both counts come from one read of the backend
    pub fn stats(&self, range: Option<DateRange>) -> Result<StatsSnapshot, DetectorError> {
        let range = range.filter(|r| !r.is_unbounded());
        let counts = self.backend.count_by_class(range)?;
        Ok(StatsSnapshot::from_counts(counts.mutant, counts.human))
    }
}
