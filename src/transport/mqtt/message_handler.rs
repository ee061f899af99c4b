//! Pure message routing for MQTT events
//!
//! Turns raw rumqttc events into [`EventRoute`] decisions and decodes
//! record payloads. The only I/O here is [`MessageForwarder`], which hands
//! decoded records to the persistence worker.

use crate::dna::DnaRecord;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

pub struct MessageHandler;

impl MessageHandler {
    /// Decode a classified record from a publish payload
    pub fn parse_record(payload: &[u8]) -> Result<DnaRecord, String> {
        serde_json::from_slice::<DnaRecord>(payload)
            .map_err(|e| format!("Failed to parse DnaRecord: {e}"))
    }

    /// Encode a record for publishing
    pub fn format_record_payload(record: &DnaRecord) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(record)
    }

    /// Retained messages and foreign topics are skipped
    pub fn should_process_message(topic: &str, retain: bool, expected_topic: &str) -> bool {
        if retain {
            debug!("Ignoring retained message on topic: {}", topic);
            return false;
        }
        if topic != expected_topic {
            debug!("Topic mismatch: expected {}, got {}", expected_topic, topic);
            return false;
        }
        true
    }

    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => EventRoute::ConnectionAcknowledged,
            Event::Incoming(Packet::Publish(publish)) => EventRoute::MessageReceived {
                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                payload: publish.payload.to_vec(),
                retain: publish.retain,
            },
            Event::Incoming(Packet::Disconnect(_)) => EventRoute::Disconnected,
            Event::Incoming(Packet::SubAck(suback)) => EventRoute::SubscriptionConfirmed {
                packet_id: suback.pkid,
            },
            Event::Incoming(other) => EventRoute::InfrastructureEvent(format!("{other:?}")),
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    ConnectionAcknowledged,
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Disconnected,
    SubscriptionConfirmed { packet_id: u16 },
    /// PingResp, PubAck and friends
    InfrastructureEvent(String),
    OutgoingEvent,
}

/// Hands received records to whoever persists them
#[derive(Default)]
pub struct MessageForwarder {
    record_sender: Option<mpsc::Sender<DnaRecord>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_record_sender(&mut self, sender: mpsc::Sender<DnaRecord>) {
        self.record_sender = Some(sender);
    }

    /// Hand a record to the worker without blocking the event loop.
    ///
    /// When the channel is full the send is finished on a separate task so
    /// the caller can keep polling the broker.
    pub fn forward_record(&self, record: DnaRecord) -> Result<(), String> {
        let Some(sender) = &self.record_sender else {
            warn!("Received record but no sender configured - message dropped");
            return Err("No record sender configured".to_string());
        };

        debug!(uuid = %record.uuid, "Forwarding record to persistence worker");
        match sender.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(record)) => {
                warn!(uuid = %record.uuid, "Record channel full, deferring delivery");
                let sender = sender.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(record).await {
                        warn!("Deferred record delivery failed: {}", e);
                    }
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err("Record channel closed".to_string()),
        }
    }
}
