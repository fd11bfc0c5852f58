//! Grid — the NxN base matrix under analysis
//!
//! A `Grid` can only be built through validation, so every value of the
//! type is square, at least 4x4 and made of A/T/C/G.

mod scanner;

pub use scanner::{Direction, GridScanner, Run, RunCounting};

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a qualifying run, and therefore the smallest grid we accept
pub const RUN_LENGTH: usize = 4;
/// Default upper bound on the grid dimension
pub const DEFAULT_MAX_DIMENSION: usize = 1000;
/// Separator between rows in the canonical sequence
pub const ROW_DELIMITER: char = ',';

/// One nitrogenous base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Base {
    A,
    T,
    C,
    G,
}

impl Base {
    pub const ALL: [Base; 4] = [Base::A, Base::T, Base::C, Base::G];

    pub fn as_char(self) -> char {
        match self {
            Base::A => 'A',
            Base::T => 'T',
            Base::C => 'C',
            Base::G => 'G',
        }
    }
}

impl TryFrom<char> for Base {
    type Error = char;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'A' => Ok(Base::A),
            'T' => Ok(Base::T),
            'C' => Ok(Base::C),
            'G' => Ok(Base::G),
            other => Err(other),
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Why a set of rows was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("grid must be at least {min}x{min}, got {size} rows")]
    TooSmall { size: usize, min: usize },

    #[error("grid is too large: {size} rows, maximum is {max}x{max}")]
    TooLarge { size: usize, max: usize },

    #[error("grid must be NxN: row {row} has {len} bases, expected {expected}")]
    NotSquare { row: usize, len: usize, expected: usize },

    #[error("invalid base {symbol:?} at row {row}, column {col}: only A, T, C, G are allowed")]
    InvalidSymbol { row: usize, col: usize, symbol: char },
}

/// Size limits applied during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLimits {
    pub max_dimension: usize,
}

impl Default for GridLimits {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// A validated, immutable NxN grid of bases stored row-major
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    size: usize,
    cells: Vec<Base>,
}

impl Grid {
    /// Validate rows against the default limits
    pub fn parse<S: AsRef<str>>(rows: &[S]) -> Result<Self, GridError> {
        Self::parse_with(rows, &GridLimits::default())
    }

    /// Validate rows against explicit limits.
    ///
    /// Checks run in order: size bounds, then per row squareness followed
    /// by the alphabet, so the first offending row decides the error.
    pub fn parse_with<S: AsRef<str>>(rows: &[S], limits: &GridLimits) -> Result<Self, GridError> {
        let size = rows.len();
        if size > limits.max_dimension {
            return Err(GridError::TooLarge {
                size,
                max: limits.max_dimension,
            });
        }
        if size < RUN_LENGTH {
            return Err(GridError::TooSmall {
                size,
                min: RUN_LENGTH,
            });
        }

        let mut cells = Vec::with_capacity(size * size);
        for (row, line) in rows.iter().enumerate() {
            let line = line.as_ref();
            let len = line.chars().count();
            if len != size {
                return Err(GridError::NotSquare {
                    row,
                    len,
                    expected: size,
                });
            }
            for (col, symbol) in line.chars().enumerate() {
                let base = Base::try_from(symbol)
                    .map_err(|symbol| GridError::InvalidSymbol { row, col, symbol })?;
                cells.push(base);
            }
        }

        Ok(Self { size, cells })
    }

    /// Generate a uniformly random grid. Sizes below the run length are
    /// raised to it so the result is always a valid grid.
    pub fn random<R: Rng>(size: usize, rng: &mut R) -> Self {
        let size = size.max(RUN_LENGTH);
        let cells = (0..size * size)
            .map(|_| Base::ALL[rng.gen_range(0..Base::ALL.len())])
            .collect();
        Self { size, cells }
    }

    /// Dimension N of the NxN grid
    pub fn size(&self) -> usize {
        self.size
    }

    /// Base at (row, col). Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> Base {
        self.cells[row * self.size + col]
    }

    pub fn row(&self, row: usize) -> &[Base] {
        &self.cells[row * self.size..(row + 1) * self.size]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Base]> {
        self.cells.chunks(self.size)
    }

    /// Rows joined by "," in row order, e.g. `AAAA,TTTT,CCGG,AGTC`
    pub fn canonical_sequence(&self) -> String {
        let mut out = String::with_capacity(self.size * (self.size + 1));
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                out.push(ROW_DELIMITER);
            }
            out.extend(row.iter().map(|b| b.as_char()));
        }
        out
    }

    /// SHA-256 hex digest of the canonical sequence
    pub fn content_key(&self) -> String {
        content_key_of(&self.canonical_sequence())
    }
}

impl TryFrom<Vec<String>> for Grid {
    type Error = GridError;

    fn try_from(rows: Vec<String>) -> Result<Self, Self::Error> {
        Grid::parse(&rows)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for base in row {
                write!(f, "{}", base)?;
            }
        }
        Ok(())
    }
}

/// Content key for an already-canonical sequence
pub fn content_key_of(raw_sequence: &str) -> String {
    hex::encode(Sha256::digest(raw_sequence.as_bytes()))
}
