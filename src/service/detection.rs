//! Detection flow: validate, classify, dispatch

use crate::dna::{detect, DnaKind, DnaRecord, SequenceClassifier};
use crate::error::DetectorResult;
use crate::observability::metrics::metrics;
use crate::storage::DnaStore;
use crate::transport::Publisher;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::persist_with_metrics;

/// Where a classified record goes
#[derive(Clone)]
pub enum Dispatcher {
    /// Save and count inline before answering
    Direct(Arc<dyn DnaStore>),
    /// Publish to the bus; a `persist` worker stores it later
    Publish(Arc<dyn Publisher>),
}

impl Dispatcher {
    pub async fn dispatch(&self, record: &DnaRecord) -> DetectorResult<()> {
        match self {
            Dispatcher::Direct(store) => {
                persist_with_metrics(store.as_ref(), record).await?;
            }
            Dispatcher::Publish(publisher) => {
                publisher.publish_record(record).await?;
            }
        }
        Ok(())
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Dispatcher::Direct(_) => "direct",
            Dispatcher::Publish(_) => "mqtt",
        }
    }
}

/// Validates, classifies and dispatches submitted samples
#[derive(Clone)]
pub struct DetectionService {
    classifier: SequenceClassifier,
    dispatcher: Dispatcher,
}

impl DetectionService {
    pub fn new(classifier: SequenceClassifier, dispatcher: Dispatcher) -> Self {
        Self {
            classifier,
            dispatcher,
        }
    }

    pub fn classifier(&self) -> &SequenceClassifier {
        &self.classifier
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Classify `dna` and hand the record to the dispatcher.
    ///
    /// The classification is only returned once dispatch succeeded.
    pub async fn detect(&self, dna: Vec<String>) -> DetectorResult<DnaKind> {
        let collector = metrics();
        collector.request_received();
        let start = Instant::now();

        let kind = match detect(&self.classifier, &dna) {
            Ok(kind) => kind,
            Err(e) => {
                collector.request_rejected();
                debug!(error = %e, rows = dna.len(), "Rejected DNA sample");
                return Err(e.into());
            }
        };

        let record = DnaRecord::new(dna, kind);
        if let Err(e) = self.dispatcher.dispatch(&record).await {
            collector.request_failed();
            warn!(
                uuid = %record.uuid,
                mode = self.dispatcher.mode_name(),
                error = %e.sanitized(),
                "Failed to dispatch classified record"
            );
            return Err(e);
        }

        collector.classification_completed(kind, start.elapsed());
        info!(
            uuid = %record.uuid,
            kind = kind.as_str(),
            rows = record.dna.len(),
            mode = self.dispatcher.mode_name(),
            "DNA classified"
        );

        Ok(kind)
    }
}
