//! DNA classification core
//!
//! Pure, synchronous building blocks: alphabet validation, the validated
//! grid, the run-counting classifier and the record that flows through the
//! rest of the service. Nothing in this module logs or performs I/O.

pub mod alphabet;
pub mod classifier;
pub mod grid;
pub mod kind;
pub mod record;

pub use alphabet::{validate_dna, Nucleotide};
pub use classifier::{
    ClassifierPolicy, Direction, SequenceClassifier, REQUIRED_RUN_COUNT, SEQUENCE_LENGTH,
};
pub use grid::DnaGrid;
pub use kind::DnaKind;
pub use record::DnaRecord;

use thiserror::Error;

/// Errors raised by the classification core
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DnaError {
    #[error("Invalid DNA alphabet in row {row}: {reason}")]
    InvalidAlphabet { row: usize, reason: String },

    #[error("Unsupported DNA kind: {0}")]
    UnsupportedKind(String),

    #[error("Invalid classifier policy: {0}")]
    InvalidPolicy(String),
}

/// Validate then classify in one step
pub fn detect<S: AsRef<str>>(
    classifier: &SequenceClassifier,
    rows: &[S],
) -> Result<DnaKind, DnaError> {
    let grid = DnaGrid::parse(rows)?;
    Ok(classifier.classify(&grid))
}
