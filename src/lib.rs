//! Mutant DNA detector
//!
//! Classifies square DNA grids as mutant or human by counting runs of
//! identical nucleotides, and runs the service around that classifier: an
//! HTTP API, an MQTT fan-out to a persistence worker, storage backends and
//! the mutant/human ratio.
//!
//! # Quick Start
//!
//! ```rust
//! use mutant_detector::dna::{detect, DnaKind, SequenceClassifier};
//! use mutant_detector::stats::Stat;
//!
//! let classifier = SequenceClassifier::default();
//! let dna = ["ATGCGA", "CAGTGC", "TTATGT", "AGAAGG", "CCCCTA", "TCACTG"];
//! assert_eq!(detect(&classifier, &dna).unwrap(), DnaKind::Mutant);
//!
//! let stat = Stat::from_counts(40, 100);
//! assert_eq!(stat.ratio, 0.4);
//! ```

pub mod config;
pub mod dna;
pub mod error;
pub mod health;
pub mod http;
pub mod observability;
pub mod service;
pub mod stats;
pub mod storage;
pub mod testing;
pub mod transport;

pub use config::DetectorConfig;
pub use dna::{detect, DnaError, DnaKind, DnaRecord, SequenceClassifier};
pub use error::{DetectorError, DetectorResult};
pub use stats::{RatioAggregator, Stat};
pub use storage::DnaStore;
pub use transport::{MqttBus, Publisher};
