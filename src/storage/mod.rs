//! Persistence for classified samples and per-kind counters
//!
//! Every backend stores each [`DnaRecord`] under its UUID and keeps one
//! counter per [`DnaKind`]. Counter increments MUST be atomic at the backend
//! (no read-modify-write from the caller), since several requests or workers
//! may classify concurrently.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StorageBackend, StorageSection};
use crate::dna::{DnaError, DnaKind, DnaRecord};
use crate::stats::Stat;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Stored data is invalid: {0}")]
    Corrupt(String),
    #[error("Stored kind is invalid: {0}")]
    Kind(#[from] DnaError),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Backend-agnostic persistence interface
#[async_trait]
pub trait DnaStore: Send + Sync {
    /// Store a record. Returns `false` when a record with the same UUID
    /// already exists (the existing record is left untouched).
    async fn save_dna(&self, record: &DnaRecord) -> Result<bool, StoreError>;

    /// Atomically add one to the counter for `kind`
    async fn increment_stat(&self, kind: DnaKind) -> Result<(), StoreError>;

    /// Current counters with the derived ratio
    async fn load_stats(&self) -> Result<Stat, StoreError>;

    async fn get_dna(&self, uuid: Uuid) -> Result<Option<DnaRecord>, StoreError>;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &str;
}

/// Save a record and bump its counter.
///
/// A redelivered record (same UUID) is not counted twice.
pub async fn persist_record<S>(store: &S, record: &DnaRecord) -> Result<bool, StoreError>
where
    S: DnaStore + ?Sized,
{
    let inserted = store.save_dna(record).await?;
    if !inserted {
        debug!(uuid = %record.uuid, "Record already stored, skipping counter update");
        return Ok(false);
    }
    store.increment_stat(record.kind).await?;
    Ok(true)
}

/// Open the backend selected in configuration
pub fn open_store(config: &StorageSection) -> Result<Arc<dyn DnaStore>, StoreError> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Sqlite => {
            let path = config.path.as_ref().ok_or_else(|| {
                StoreError::Unavailable("sqlite backend requires storage.path".to_string())
            })?;
            info!("Using SQLite storage at {}", path.display());
            Ok(Arc::new(SqliteStore::open(path)?))
        }
    }
}
