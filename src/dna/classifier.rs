//! Run-counting mutant classifier
//!
//! Every cell `(i, j)` of an `N x N` grid is tried as the start of a run in
//! three directions: horizontal, vertical and descending diagonal. A run
//! qualifies when `sequence_length` consecutive cells, all inside the grid,
//! hold the same symbol. A start cell with a qualifying run in any direction
//! adds one to a shared counter, however many of its directions qualify, and
//! the scan stops as soon as the counter reaches `required_runs`.
//!
//! Two scoring quirks are kept on purpose:
//!
//! - the ascending diagonal is never scanned, so a run along it alone never
//!   produces a `Mutant`;
//! - overlapping starts inside a longer run all count, so six identical
//!   symbols in a row yield three qualifying horizontal runs.
//!
//! `N` is the number of rows. Cells are read with bounds-checked lookups, so
//! ragged input never panics: a missing cell simply breaks the run.

use super::{DnaError, DnaGrid, DnaKind, Nucleotide};
use serde::Serialize;

/// Minimum run length that counts as a sequence
pub const SEQUENCE_LENGTH: usize = 4;

/// Minimum number of qualifying runs for a `Mutant` classification
pub const REQUIRED_RUN_COUNT: usize = 2;

/// Immutable run-threshold policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassifierPolicy {
    sequence_length: usize,
    required_runs: usize,
}

impl ClassifierPolicy {
    /// Create a policy; both values must be at least 1
    pub fn new(sequence_length: usize, required_runs: usize) -> Result<Self, DnaError> {
        if sequence_length == 0 {
            return Err(DnaError::InvalidPolicy(
                "sequence_length must be at least 1".to_string(),
            ));
        }
        if required_runs == 0 {
            return Err(DnaError::InvalidPolicy(
                "required_runs must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            sequence_length,
            required_runs,
        })
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn required_runs(&self) -> usize {
        self.required_runs
    }
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            sequence_length: SEQUENCE_LENGTH,
            required_runs: REQUIRED_RUN_COUNT,
        }
    }
}

/// Scan direction, expressed as a (row, column) step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
    DescendingDiagonal,
}

impl Direction {
    /// Directions checked at every start cell, in check order
    pub const SCANNED: [Direction; 3] = [
        Direction::Horizontal,
        Direction::Vertical,
        Direction::DescendingDiagonal,
    ];

    fn step(self) -> (usize, usize) {
        match self {
            Direction::Horizontal => (0, 1),
            Direction::Vertical => (1, 0),
            Direction::DescendingDiagonal => (1, 1),
        }
    }
}

/// Classifies grids by counting same-symbol runs
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceClassifier {
    policy: ClassifierPolicy,
}

impl SequenceClassifier {
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ClassifierPolicy {
        self.policy
    }

    /// Classify a validated grid
    pub fn classify(&self, grid: &DnaGrid) -> DnaKind {
        self.classify_rows::<Nucleotide, Vec<Nucleotide>>(grid.rows())
    }

    /// Classify raw string rows. No alphabet check is made: any repeated
    /// character forms a run.
    pub fn classify_str<S: AsRef<str>>(&self, rows: &[S]) -> DnaKind {
        let rows: Vec<&[u8]> = rows.iter().map(|row| row.as_ref().as_bytes()).collect();
        self.classify_rows::<u8, &[u8]>(&rows)
    }

    /// Classify any grid of comparable cells
    pub fn classify_rows<T, R>(&self, rows: &[R]) -> DnaKind
    where
        T: PartialEq,
        R: AsRef<[T]>,
    {
        if self.count_runs(rows, Some(self.policy.required_runs)) >= self.policy.required_runs {
            DnaKind::Mutant
        } else {
            DnaKind::Human
        }
    }

    /// Count start cells that begin at least one qualifying run, in row-major
    /// order.
    ///
    /// With `stop_at = Some(k)` the scan returns as soon as `k` runs have
    /// been seen; with `None` the whole grid is scanned.
    pub fn count_runs<T, R>(&self, rows: &[R], stop_at: Option<usize>) -> usize
    where
        T: PartialEq,
        R: AsRef<[T]>,
    {
        let n = rows.len();
        let length = self.policy.sequence_length;
        let mut runs = 0;

        if n < length {
            return 0;
        }

        for i in 0..n {
            for j in 0..n {
                let starts_run = Direction::SCANNED
                    .into_iter()
                    .any(|direction| is_run(rows, i, j, direction, length));
                if starts_run {
                    runs += 1;
                    if stop_at.is_some_and(|limit| runs >= limit) {
                        return runs;
                    }
                }
            }
        }

        runs
    }
}

/// Check one run of `length` cells starting at `(i, j)`
fn is_run<T, R>(rows: &[R], i: usize, j: usize, direction: Direction, length: usize) -> bool
where
    T: PartialEq,
    R: AsRef<[T]>,
{
    let n = rows.len();
    let (di, dj) = direction.step();

    // Bounds are taken against N (row count) for both axes.
    if (di == 1 && i + length > n) || (dj == 1 && j + length > n) {
        return false;
    }

    let cell = |k: usize| rows.get(i + k * di).and_then(|row| row.as_ref().get(j + k * dj));

    let Some(first) = cell(0) else {
        return false;
    };
    (1..length).all(|k| cell(k) == Some(first))
}
