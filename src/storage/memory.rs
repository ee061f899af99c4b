//! In-process storage backend
//!
//! Records live in a `RwLock<HashMap>`; counters are atomics, so increments
//! never lose updates under concurrent writers.

use super::{DnaStore, StoreError};
use crate::dna::{DnaKind, DnaRecord};
use crate::stats::{RatioAggregator, Stat};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, DnaRecord>>,
    counts: RatioAggregator,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DnaStore for MemoryStore {
    async fn save_dna(&self, record: &DnaRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.uuid) {
            return Ok(false);
        }
        records.insert(record.uuid, record.clone());
        Ok(true)
    }

    async fn increment_stat(&self, kind: DnaKind) -> Result<(), StoreError> {
        self.counts.record_classification(kind);
        Ok(())
    }

    async fn load_stats(&self) -> Result<Stat, StoreError> {
        Ok(self.counts.snapshot())
    }

    async fn get_dna(&self, uuid: Uuid) -> Result<Option<DnaRecord>, StoreError> {
        Ok(self.records.read().await.get(&uuid).cloned())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::persist_record;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_save_and_get() {
        let store = MemoryStore::new();
        let record = DnaRecord::new(vec!["ACGT".to_string()], DnaKind::Human);

        assert!(store.save_dna(&record).await.unwrap());
        assert_eq!(store.len().await, 1);

        let loaded = store.get_dna(record.uuid).await.unwrap();
        assert_eq!(loaded, Some(record));
        assert_eq!(store.get_dna(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_stats() {
        let store = MemoryStore::new();
        let stat = store.load_stats().await.unwrap();
        assert_eq!(stat, Stat::from_counts(0, 0));
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_persists_are_all_counted() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let kind = if i % 5 == 0 {
                    DnaKind::Mutant
                } else {
                    DnaKind::Human
                };
                let record = DnaRecord::new(vec!["ACGT".to_string()], kind);
                persist_record(store.as_ref(), &record).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stat = store.load_stats().await.unwrap();
        assert_eq!(stat.mutant, 10);
        assert_eq!(stat.human, 40);
        assert_eq!(stat.ratio, 0.25);
        assert_eq!(store.len().await, 50);
    }
}
