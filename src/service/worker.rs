//! Persistence worker
//!
//! Consumes records forwarded from the bus and stores them. A failed record
//! is logged and counted; the worker keeps going. Redelivered records are
//! stored once and counted once.

use crate::dna::DnaRecord;
use crate::storage::{DnaStore, StoreError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::persist_with_metrics;

/// Outcome counts of one worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub persisted: u64,
    pub duplicates: u64,
    pub failures: u64,
}

pub struct PersistenceWorker {
    store: Arc<dyn DnaStore>,
    record_receiver: mpsc::Receiver<DnaRecord>,
    summary: WorkerSummary,
}

impl PersistenceWorker {
    pub fn new(store: Arc<dyn DnaStore>, record_receiver: mpsc::Receiver<DnaRecord>) -> Self {
        Self {
            store,
            record_receiver,
            summary: WorkerSummary::default(),
        }
    }

    pub fn summary(&self) -> WorkerSummary {
        self.summary
    }

    /// Persist records until the channel closes or `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F) -> WorkerSummary
    where
        F: Future<Output = ()>,
    {
        info!(
            backend = self.store.backend_name(),
            "Persistence worker running, waiting for records"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Persistence worker received shutdown signal");
                    break;
                }
                maybe_record = self.record_receiver.recv() => {
                    match maybe_record {
                        Some(record) => {
                            // Failures are already logged and counted
                            let _ = self.process_record(&record).await;
                        }
                        None => {
                            info!("Record channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            persisted = self.summary.persisted,
            duplicates = self.summary.duplicates,
            failures = self.summary.failures,
            "Persistence worker stopped"
        );
        self.summary
    }

    /// Persist one record, updating the run summary
    pub async fn process_record(&mut self, record: &DnaRecord) -> Result<bool, StoreError> {
        match persist_with_metrics(self.store.as_ref(), record).await {
            Ok(true) => {
                self.summary.persisted += 1;
                Ok(true)
            }
            Ok(false) => {
                self.summary.duplicates += 1;
                warn!(uuid = %record.uuid, "Duplicate record delivery ignored");
                Ok(false)
            }
            Err(e) => {
                self.summary.failures += 1;
                Err(e)
            }
        }
    }
}
