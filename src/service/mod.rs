//! Request flows on top of the classification core
//!
//! - [`detection`] - validate, classify, dispatch (`POST /mutant`)
//! - [`stats`] - counters and ratio (`GET /stats`)
//! - [`worker`] - persists records received from the bus

pub mod detection;
pub mod stats;
pub mod worker;

pub use detection::{DetectionService, Dispatcher};
pub use stats::StatsService;
pub use worker::{PersistenceWorker, WorkerSummary};

use crate::dna::DnaRecord;
use crate::observability::metrics::metrics;
use crate::storage::{persist_record, DnaStore, StoreError};
use tracing::{debug, error, Instrument};

/// Persist one record and account for the outcome in the metrics.
///
/// Returns `false` for a redelivered record that was already stored.
pub(crate) async fn persist_with_metrics<S>(
    store: &S,
    record: &DnaRecord,
) -> Result<bool, StoreError>
where
    S: DnaStore + ?Sized,
{
    let span = crate::storage_span!(
        backend = store.backend_name(),
        uuid = %record.uuid,
        kind = record.kind.as_str()
    );

    async {
        match persist_record(store, record).await {
            Ok(true) => {
                metrics().record_persisted();
                debug!("Record persisted");
                Ok(true)
            }
            Ok(false) => {
                metrics().duplicate_skipped();
                Ok(false)
            }
            Err(e) => {
                metrics().persist_failed();
                error!(error = %e, "Failed to persist record");
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}
