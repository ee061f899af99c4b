//! Validated DNA grid

use super::alphabet::{parse_row, Nucleotide};
use super::DnaError;

/// Rows of nucleotides that passed alphabet validation.
///
/// The grid is expected to be square but this is not enforced; see
/// [`DnaGrid::is_square`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnaGrid {
    rows: Vec<Vec<Nucleotide>>,
}

impl DnaGrid {
    /// Validate and convert string rows into a grid
    pub fn parse<S: AsRef<str>>(rows: &[S]) -> Result<Self, DnaError> {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(index, row)| parse_row(index, row.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    /// Number of rows (N)
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Nucleotide>] {
        &self.rows
    }

    pub fn get(&self, row: usize, column: usize) -> Option<Nucleotide> {
        self.rows.get(row).and_then(|r| r.get(column)).copied()
    }

    pub fn is_square(&self) -> bool {
        let n = self.rows.len();
        self.rows.iter().all(|row| row.len() == n)
    }
}
