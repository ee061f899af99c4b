//! Mutant/Human ratio bookkeeping
//!
//! [`Stat`] is the aggregate answered by `GET /stats`. [`RatioAggregator`]
//! is the in-process counterpart used when counts are accumulated locally;
//! persistent counts come from a [`crate::storage::DnaStore`].

use crate::dna::{DnaError, DnaKind};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate classification counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    #[serde(rename = "count_mutant_dna")]
    pub mutant: u64,
    #[serde(rename = "count_human_dna")]
    pub human: u64,
    pub ratio: f64,
}

impl Stat {
    /// Build a stat from counts and compute its ratio
    pub fn from_counts(mutant: u64, human: u64) -> Self {
        let mut stat = Self {
            mutant,
            human,
            ratio: 0.0,
        };
        stat.calculate_ratio();
        stat
    }

    /// Set the count for a stored label. Unknown labels are rejected.
    pub fn set_count(&mut self, label: &str, count: u64) -> Result<(), DnaError> {
        match label.parse::<DnaKind>()? {
            DnaKind::Mutant => self.mutant = count,
            DnaKind::Human => self.human = count,
        }
        Ok(())
    }

    /// Apply a batch of `(label, count)` rows and recompute the ratio
    pub fn set_values<'a, I>(&mut self, rows: I) -> Result<(), DnaError>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        for (label, count) in rows {
            self.set_count(label, count)?;
        }
        self.calculate_ratio();
        Ok(())
    }

    pub fn calculate_ratio(&mut self) {
        self.ratio = ratio(self.mutant, self.human);
    }

    pub fn total(&self) -> u64 {
        self.mutant + self.human
    }
}

/// Mutant/Human rounded to two decimals; the raw mutant count when there
/// are no humans.
pub fn ratio(mutant: u64, human: u64) -> f64 {
    if human == 0 {
        return mutant as f64;
    }
    let raw = mutant as f64 / human as f64;
    (raw * 100.0).round() / 100.0
}

/// Lock-free running counts
#[derive(Debug, Default)]
pub struct RatioAggregator {
    mutant: AtomicU64,
    human: AtomicU64,
}

impl RatioAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously persisted counts
    pub fn with_counts(mutant: u64, human: u64) -> Self {
        Self {
            mutant: AtomicU64::new(mutant),
            human: AtomicU64::new(human),
        }
    }

    pub fn record_classification(&self, kind: DnaKind) {
        let counter = match kind {
            DnaKind::Mutant => &self.mutant,
            DnaKind::Human => &self.human,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a classification given by label
    pub fn record_label(&self, label: &str) -> Result<(), DnaError> {
        self.record_classification(label.parse()?);
        Ok(())
    }

    pub fn current_ratio(&self) -> f64 {
        self.snapshot().ratio
    }

    pub fn snapshot(&self) -> Stat {
        Stat::from_counts(
            self.mutant.load(Ordering::Relaxed),
            self.human.load(Ordering::Relaxed),
        )
    }
}
