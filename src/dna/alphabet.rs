//! Nucleotide alphabet and row validation
//!
//! Rows are accepted only when every character is one of `A`, `C`, `G`, `T`
//! (case-sensitive). Shape is not checked here: ragged or non-square grids
//! pass validation and are handled by the classifier's bounds checks.

use super::DnaError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One of the four permitted DNA symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Nucleotide {
    A,
    C,
    G,
    T,
}

impl Nucleotide {
    pub const ALL: [Nucleotide; 4] = [Nucleotide::A, Nucleotide::C, Nucleotide::G, Nucleotide::T];

    pub fn symbol(&self) -> char {
        match self {
            Nucleotide::A => 'A',
            Nucleotide::C => 'C',
            Nucleotide::G => 'G',
            Nucleotide::T => 'T',
        }
    }
}

impl Display for Nucleotide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl TryFrom<char> for Nucleotide {
    type Error = char;

    fn try_from(symbol: char) -> Result<Self, Self::Error> {
        match symbol {
            'A' => Ok(Nucleotide::A),
            'C' => Ok(Nucleotide::C),
            'G' => Ok(Nucleotide::G),
            'T' => Ok(Nucleotide::T),
            other => Err(other),
        }
    }
}

/// Parse a single row into nucleotides.
///
/// An empty row is rejected: a row must carry at least one symbol.
pub fn parse_row(index: usize, row: &str) -> Result<Vec<Nucleotide>, DnaError> {
    if row.is_empty() {
        return Err(DnaError::InvalidAlphabet {
            row: index,
            reason: "row is empty".to_string(),
        });
    }

    row.chars()
        .enumerate()
        .map(|(column, symbol)| {
            Nucleotide::try_from(symbol).map_err(|bad| DnaError::InvalidAlphabet {
                row: index,
                reason: format!("unexpected symbol {bad:?} at column {column}"),
            })
        })
        .collect()
}

/// Check every row against the {A, C, G, T} alphabet without building a grid.
pub fn validate_dna<S: AsRef<str>>(rows: &[S]) -> Result<(), DnaError> {
    for (index, row) in rows.iter().enumerate() {
        parse_row(index, row.as_ref())?;
    }
    Ok(())
}
