//! GridScanner — counts runs of four identical bases
//!
//! A grid is mutant when it holds more than one qualifying run across the
//! horizontal, vertical, diagonal and anti-diagonal directions. The scan
//! visits each cell once as a run start, checks only the directions whose
//! 4-cell window fits inside the grid, and stops at the second run.

use super::{Base, Grid, GridError, GridLimits, RUN_LENGTH};
use serde::{Deserialize, Serialize};

/// Scan direction, as a step from one cell of a run to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Left to right
    Horizontal,
    /// Top to bottom
    Vertical,
    /// Top-left to bottom-right
    Diagonal,
    /// Top-right to bottom-left
    AntiDiagonal,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Horizontal,
        Direction::Vertical,
        Direction::Diagonal,
        Direction::AntiDiagonal,
    ];

    /// (row step, column step)
    pub fn step(self) -> (isize, isize) {
        match self {
            Direction::Horizontal => (0, 1),
            Direction::Vertical => (1, 0),
            Direction::Diagonal => (1, 1),
            Direction::AntiDiagonal => (1, -1),
        }
    }

    /// Whether a full run window starting at (row, col) stays in bounds
    #[inline]
    fn window_fits(self, row: usize, col: usize, size: usize) -> bool {
        let last = RUN_LENGTH - 1;
        match self {
            Direction::Horizontal => col + last < size,
            Direction::Vertical => row + last < size,
            Direction::Diagonal => row + last < size && col + last < size,
            Direction::AntiDiagonal => row + last < size && col >= last,
        }
    }

    /// Cell `k` steps away from (row, col), or None when it falls outside
    #[inline]
    fn offset(self, row: usize, col: usize, k: isize, size: usize) -> Option<(usize, usize)> {
        let (dr, dc) = self.step();
        let r = row as isize + dr * k;
        let c = col as isize + dc * k;
        if r < 0 || c < 0 || r as usize >= size || c as usize >= size {
            return None;
        }
        Some((r as usize, c as usize))
    }
}

/// How windows inside a physical run longer than four are counted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCounting {
    /// One count per maximal run: `AAAAA` is one sequence
    #[default]
    MaximalRuns,
    /// One count per qualifying 4-window: `AAAAA` is two sequences
    OverlappingWindows,
}

/// A counted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub row: usize,
    pub col: usize,
    pub direction: Direction,
    pub base: Base,
}

/// Stateless mutant detector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridScanner {
    counting: RunCounting,
}

impl GridScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counting(counting: RunCounting) -> Self {
        Self { counting }
    }

    pub fn counting(&self) -> RunCounting {
        self.counting
    }

    /// True when the grid holds more than one qualifying run
    pub fn scan(&self, grid: &Grid) -> bool {
        let size = grid.size();
        let mut sequences = 0usize;

        for row in 0..size {
            for col in 0..size {
                for direction in Direction::ALL {
                    if self.counts_at(grid, row, col, direction) {
                        sequences += 1;
                        if sequences > 1 {
                            return true;
                        }
                    }
                }
            }
        }

        false
    }

    /// Validate raw rows, then scan them.
    ///
    /// This is the entry point for callers holding unvalidated input; a
    /// grid that breaks any invariant is rejected rather than scanned.
    pub fn scan_rows<S: AsRef<str>>(&self, rows: &[S]) -> Result<bool, GridError> {
        self.scan_rows_with(rows, &GridLimits::default())
    }

    pub fn scan_rows_with<S: AsRef<str>>(
        &self,
        rows: &[S],
        limits: &GridLimits,
    ) -> Result<bool, GridError> {
        let grid = Grid::parse_with(rows, limits)?;
        Ok(self.scan(&grid))
    }

    /// Every counted run, in scan order, without early exit
    pub fn runs(&self, grid: &Grid) -> Vec<Run> {
        let size = grid.size();
        let mut runs = Vec::new();
        for row in 0..size {
            for col in 0..size {
                for direction in Direction::ALL {
                    if self.counts_at(grid, row, col, direction) {
                        runs.push(Run {
                            row,
                            col,
                            direction,
                            base: grid.at(row, col),
                        });
                    }
                }
            }
        }
        runs
    }

    #[inline]
    fn counts_at(&self, grid: &Grid, row: usize, col: usize, direction: Direction) -> bool {
        let size = grid.size();
        if !direction.window_fits(row, col, size) || !window_matches(grid, row, col, direction) {
            return false;
        }
        match self.counting {
            RunCounting::OverlappingWindows => true,
            RunCounting::MaximalRuns => !continues_run(grid, row, col, direction),
        }
    }
}

/// The three cells after (row, col) in `direction` equal the start base.
/// Caller guarantees the window fits.
#[inline]
fn window_matches(grid: &Grid, row: usize, col: usize, direction: Direction) -> bool {
    let base = grid.at(row, col);
    let (dr, dc) = direction.step();
    let cell = |k: isize| {
        grid.at(
            (row as isize + dr * k) as usize,
            (col as isize + dc * k) as usize,
        )
    };
    cell(1) == base && cell(2) == base && cell(3) == base
}

/// (row, col) sits inside a run that already started one step earlier
#[inline]
fn continues_run(grid: &Grid, row: usize, col: usize, direction: Direction) -> bool {
    match direction.offset(row, col, -1, grid.size()) {
        Some((r, c)) => grid.at(r, c) == grid.at(row, col),
        None => false,
    }
}
