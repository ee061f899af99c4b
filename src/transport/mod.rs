//! Message bus for classified records
//!
//! [`Publisher`] is the seam the detection service depends on; [`MqttBus`]
//! is the production implementation and `testing::mocks::MockPublisher`
//! the test double.

pub mod mqtt;
pub mod topics;

pub use mqtt::{MqttBus, MqttError};
pub use topics::{canonicalize_topic, TopicBuilder};

use crate::dna::DnaRecord;

/// Fire-and-forget publication of classified records
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one record (QoS 1, not retained)
    async fn publish_record(&self, record: &DnaRecord) -> Result<(), MqttError>;

    fn is_connected(&self) -> bool;

    /// Short name for logs and health output
    fn name(&self) -> &str;
}
