//! Mock implementations for testing
//!
//! Provides a mock [`Publisher`] and a mock [`DnaStore`] so the detection
//! flow, the worker and the HTTP routes can be exercised without a broker or
//! a database file.

use crate::dna::{DnaKind, DnaRecord};
use crate::stats::Stat;
use crate::storage::{DnaStore, MemoryStore, StoreError};
use crate::transport::{MqttError, Publisher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Mock publisher for testing
#[derive(Debug)]
pub struct MockPublisher {
    pub published: Arc<Mutex<Vec<DnaRecord>>>,
    pub should_fail: AtomicBool,
    pub connected: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
            should_fail: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    pub fn with_failure() -> Self {
        let publisher = Self::new();
        publisher.should_fail.store(true, Ordering::SeqCst);
        publisher.connected.store(false, Ordering::SeqCst);
        publisher
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub async fn get_published(&self) -> Vec<DnaRecord> {
        self.published.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.published.lock().await.clear();
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish_record(&self, record: &DnaRecord) -> Result<(), MqttError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(MqttError::PublishFailed(
                "Mock publish failure".to_string().into(),
            ));
        }

        self.published.lock().await.push(record.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// In-memory store that can be switched into a failing mode
#[derive(Debug, Default)]
pub struct MockStore {
    inner: MemoryStore,
    should_fail: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        let store = Self::new();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.should_fail.store(failing, Ordering::SeqCst);
    }

    pub async fn record_count(&self) -> usize {
        self.inner.len().await
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.should_fail.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("Mock store failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DnaStore for MockStore {
    async fn save_dna(&self, record: &DnaRecord) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.save_dna(record).await
    }

    async fn increment_stat(&self, kind: DnaKind) -> Result<(), StoreError> {
        self.check()?;
        self.inner.increment_stat(kind).await
    }

    async fn load_stats(&self) -> Result<Stat, StoreError> {
        self.check()?;
        self.inner.load_stats().await
    }

    async fn get_dna(&self, uuid: Uuid) -> Result<Option<DnaRecord>, StoreError> {
        self.check()?;
        self.inner.get_dna(uuid).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn backend_name(&self) -> &str {
        "mock"
    }
}
