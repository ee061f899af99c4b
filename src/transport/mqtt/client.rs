//! MQTT bus client: network I/O and the reconnection supervisor
//!
//! `connect` spawns a supervisor task that polls the rumqttc event loop,
//! tracks [`ConnectionState`] over a `watch` channel, re-creates the
//! connection with backoff after errors and re-subscribes once the broker
//! acknowledges the new session. `connect` itself only returns after the
//! first ConnAck.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageForwarder, MessageHandler};
use crate::config::MqttSection;
use crate::dna::DnaRecord;
use crate::observability::metrics::METRICS;
use crate::transport::topics::TopicBuilder;
use crate::transport::Publisher;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::PublishProperties;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of rumqttc's request channel
const REQUEST_CAPACITY: usize = 10;

pub struct MqttBus {
    service_id: String,
    config: MqttSection,
    client: Arc<Mutex<AsyncClient>>,
    event_loop: std::sync::Mutex<Option<EventLoop>>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reconnect_config: ReconnectConfig,
    subscribed_topics: Arc<Mutex<Vec<String>>>,
    message_forwarder: Arc<Mutex<MessageForwarder>>,
    connect_time: Option<Instant>,
    reconnect_count: Arc<AtomicU32>,
}

impl MqttBus {
    pub fn new(service_id: &str, config: MqttSection) -> Result<Self, MqttError> {
        let (client, event_loop) = Self::create_connection(service_id, &config)?;

        Ok(Self {
            service_id: service_id.to_string(),
            config,
            client: Arc::new(Mutex::new(client)),
            event_loop: std::sync::Mutex::new(Some(event_loop)),
            event_loop_handle: Mutex::new(None),
            state_rx: None,
            shutdown_tx: None,
            reconnect_config: ReconnectConfig::default(),
            subscribed_topics: Arc::new(Mutex::new(Vec::new())),
            message_forwarder: Arc::new(Mutex::new(MessageForwarder::new())),
            connect_time: None,
            reconnect_count: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Topic this bus publishes to and subscribes on
    pub fn classified_topic(&self) -> String {
        TopicBuilder::classified_topic(&self.service_id)
    }

    fn create_connection(
        service_id: &str,
        config: &MqttSection,
    ) -> Result<(AsyncClient, EventLoop), MqttError> {
        let mqtt_options = configure_mqtt_options(service_id, config)?;
        Ok(AsyncClient::new(mqtt_options, REQUEST_CAPACITY))
    }

    /// Wait for the supervisor to report Connected, or fail
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let wait = async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match &*state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::PermanentlyDisconnected(reason) => {
                        return Err(MqttError::ConnectionFailedStr(format!(
                            "Permanently disconnected: {reason}"
                        )));
                    }
                    ConnectionState::Connecting | ConnectionState::Reconnecting(_) => {}
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )
        })?
    }

    /// Start the supervisor and wait for the broker's ConnAck
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self
            .event_loop
            .get_mut()
            .map_err(|_| MqttError::ConnectionFailedStr("Event loop lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| {
                MqttError::ConnectionFailedStr("Event loop already started".to_string())
            })?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let supervisor = Supervisor {
            service_id: self.service_id.clone(),
            config: self.config.clone(),
            client: self.client.clone(),
            state_tx,
            shutdown_rx,
            reconnect_config: self.reconnect_config.clone(),
            reconnect_attempts: 0,
            reconnect_count: self.reconnect_count.clone(),
            subscribed_topics: self.subscribed_topics.clone(),
            message_forwarder: self.message_forwarder.clone(),
            expected_topic: self.classified_topic(),
        };

        METRICS.mqtt_connection_attempt();
        let span = crate::mqtt_span!(service_id = %self.service_id);
        let handle = tokio::spawn(supervisor.run(event_loop).instrument(span));
        *self.event_loop_handle.lock().await = Some(handle);

        let timeout = HealthMonitor::calculate_connection_timeout(&self.reconnect_config);
        if let Err(e) = Self::wait_for_connection_confirmation(state_rx, timeout).await {
            METRICS.mqtt_connection_failed();
            return Err(e);
        }

        self.connect_time = Some(Instant::now());
        Ok(())
    }

    /// Route received records to `sender`
    pub async fn set_record_sender(&self, sender: mpsc::Sender<DnaRecord>) {
        self.message_forwarder
            .lock()
            .await
            .set_record_sender(sender);
    }

    /// Subscribe to classified records. The subscription is replayed after
    /// every reconnect.
    pub async fn subscribe_records(&self) -> Result<(), MqttError> {
        self.check_connection_state()?;

        let topic = self.classified_topic();
        info!("Subscribing to record topic: {}", topic);

        self.client
            .lock()
            .await
            .subscribe(&topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| {
                MqttError::SubscriptionFailed(format!("Failed to subscribe to {topic}: {e}").into())
            })?;

        let mut topics = self.subscribed_topics.lock().await;
        if !topics.contains(&topic) {
            topics.push(topic);
        }
        Ok(())
    }

    /// Stop the supervisor and disconnect from the broker
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        let Some(handle) = self.event_loop_handle.lock().await.take() else {
            debug!("MQTT bus was never connected, nothing to disconnect");
            return Ok(());
        };

        let disconnect_result = self.client.lock().await.disconnect().await;

        match tokio::time::timeout(Duration::from_secs(2), handle).await {
            Ok(Ok(())) => debug!("MQTT supervisor stopped"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("MQTT supervisor ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => warn!("MQTT supervisor did not stop in time"),
        }

        METRICS.mqtt_connection_lost();
        info!("MQTT bus disconnected");
        disconnect_result.map_err(|e| MqttError::ConnectionFailed(Box::new(e)))
    }

    /// Current connection state, None before `connect`
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }

    pub fn get_health_metrics(&self) -> HealthMetrics {
        HealthMonitor::calculate_health_metrics(
            self.connect_time,
            None,
            self.reconnect_count.load(Ordering::Relaxed),
        )
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected".to_string())
        })?;

        let current_state = state_rx.borrow().clone();
        if !HealthMonitor::can_publish(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }
        Ok(())
    }

    async fn publish_record_inner(&self, record: &DnaRecord) -> Result<(), MqttError> {
        self.check_connection_state()?;

        let topic = self.classified_topic();
        let payload =
            MessageHandler::format_record_payload(record).map_err(MqttError::SerializationError)?;

        self.client
            .lock()
            .await
            .publish_with_properties(
                &topic,
                QoS::AtLeastOnce,
                false,
                payload,
                PublishProperties::default(),
            )
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(uuid = %record.uuid, topic = %topic, "Published classified record");
        Ok(())
    }
}

#[async_trait]
impl Publisher for MqttBus {
    async fn publish_record(&self, record: &DnaRecord) -> Result<(), MqttError> {
        let result = self.publish_record_inner(record).await;
        match &result {
            Ok(()) => METRICS.mqtt_message_published(),
            Err(_) => METRICS.mqtt_publish_failed(),
        }
        result
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Ok(mut handle) = self.event_loop_handle.try_lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

/// Owns the event loop once `connect` has started it
struct Supervisor {
    service_id: String,
    config: MqttSection,
    client: Arc<Mutex<AsyncClient>>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    reconnect_attempts: u32,
    reconnect_count: Arc<AtomicU32>,
    subscribed_topics: Arc<Mutex<Vec<String>>>,
    message_forwarder: Arc<Mutex<MessageForwarder>>,
    expected_topic: String,
}

impl Supervisor {
    async fn run(mut self, mut event_loop: EventLoop) {
        info!(
            "Starting MQTT event loop for service: {}",
            self.service_id
        );

        loop {
            let mut shutdown_rx = self.shutdown_rx.clone();
            let keep_running = tokio::select! {
                changed = shutdown_rx.changed() => {
                    changed.is_ok() && !*shutdown_rx.borrow()
                }
                event = event_loop.poll() => match event {
                    Ok(event) => {
                        let route = MessageHandler::route_mqtt_event(&event);
                        self.process_event_route(route, &mut event_loop).await
                    }
                    Err(e) => {
                        error!("MQTT event loop error for service {}: {}", self.service_id, e);
                        self.transition(ConnectionEvent::NetworkError(e.to_string()));
                        METRICS.mqtt_connection_lost();
                        self.reconnect(&mut event_loop).await
                    }
                },
            };

            if !keep_running {
                break;
            }
        }

        info!("MQTT event loop stopped for service: {}", self.service_id);
    }

    fn transition(&self, event: ConnectionEvent) {
        let next = HealthMonitor::determine_next_state(event);
        let previous = self.state_tx.borrow().clone();
        HealthMonitor::log_state_transition(&previous, &next);
        let _ = self.state_tx.send(next);
    }

    /// Returns false when the supervisor should stop
    async fn process_event_route(&mut self, route: EventRoute, event_loop: &mut EventLoop) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                self.transition(ConnectionEvent::ConnAckReceived);
                METRICS.mqtt_connection_established();
                self.reconnect_attempts = 0;
                self.resubscribe().await;
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                self.handle_message(&topic, &payload, retain).await;
                true
            }
            EventRoute::Disconnected => {
                self.transition(ConnectionEvent::DisconnectedByBroker);
                METRICS.mqtt_connection_lost();
                self.reconnect(event_loop).await
            }
            EventRoute::SubscriptionConfirmed { packet_id } => {
                debug!(target: "mqtt_transport", "Subscription confirmed: pkid {}", packet_id);
                true
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    async fn handle_message(&self, topic: &str, payload: &[u8], retain: bool) {
        if !MessageHandler::should_process_message(topic, retain, &self.expected_topic) {
            return;
        }
        METRICS.mqtt_message_received();

        match MessageHandler::parse_record(payload) {
            Ok(record) => {
                let forwarded = self.message_forwarder.lock().await.forward_record(record);
                if let Err(e) = forwarded {
                    error!("Failed to forward record: {}", e);
                }
            }
            Err(e) => error!("Dropping malformed record on {}: {}", topic, e),
        }
    }

    async fn resubscribe(&self) {
        let topics = self.subscribed_topics.lock().await.clone();
        let client = self.client.lock().await;
        for topic in topics {
            match client.subscribe(&topic, QoS::AtLeastOnce).await {
                Ok(()) => debug!(target: "mqtt_transport", "Re-subscribed to: {}", topic),
                Err(e) => error!("Failed to re-subscribe to {}: {}", topic, e),
            }
        }
    }

    /// Sleep, then swap in a fresh client and event loop.
    /// Returns false when the supervisor should stop.
    async fn reconnect(&mut self, event_loop: &mut EventLoop) -> bool {
        let decision = HealthMonitor::should_attempt_reconnection(
            self.reconnect_attempts,
            &self.reconnect_config,
            *self.shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.reconnect_attempts = attempt;
                self.reconnect_count.fetch_add(1, Ordering::Relaxed);
                self.transition(ConnectionEvent::ReconnectionStarted(attempt));
                METRICS.mqtt_connection_attempt();

                if !interruptible_sleep(self.shutdown_rx.clone(), delay_ms).await {
                    return false;
                }

                match MqttBus::create_connection(&self.service_id, &self.config) {
                    Ok((new_client, new_event_loop)) => {
                        *event_loop = new_event_loop;
                        *self.client.lock().await = new_client;
                        debug!("Replaced MQTT client for reconnection attempt {}", attempt);
                    }
                    Err(e) => error!("Failed to create new connection: {}", e),
                }
                true
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown requested, stopping reconnection");
                false
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                let reason = format!(
                    "Max reconnection attempts ({}) exceeded",
                    self.reconnect_attempts
                );
                self.transition(ConnectionEvent::PermanentFailure(reason));
                METRICS.mqtt_connection_failed();
                false
            }
        }
    }
}

/// Returns true if the sleep completed, false if shutdown was requested
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dna::DnaKind;

    fn test_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
        }
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Connected);
        });

        let result =
            MqttBus::wait_for_connection_confirmation(state_rx, Duration::from_millis(500)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_timeout() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let result =
            MqttBus::wait_for_connection_confirmation(state_rx, Duration::from_millis(10)).await;
        drop(state_tx);

        let err = result.unwrap_err().to_string();
        assert!(err.contains("ConnAck"), "got: {err}");
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_disconnected() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Disconnected("refused".to_string()));
        });

        let result =
            MqttBus::wait_for_connection_confirmation(state_rx, Duration::from_millis(500)).await;
        assert!(result.unwrap_err().to_string().contains("refused"));
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        assert!(interruptible_sleep(shutdown_rx, 10).await);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_interrupted() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = shutdown_tx.send(true);
        });
        assert!(!interruptible_sleep(shutdown_rx, 5_000).await);
    }

    #[tokio::test]
    async fn test_state_before_connect() {
        let bus = MqttBus::new("test-detector", test_config()).unwrap();
        assert!(bus.connection_state().is_none());
        assert!(!bus.is_connected());
        assert!(!bus.is_permanently_disconnected());
        assert_eq!(bus.classified_topic(), "/dna/test-detector/classified");
        assert_eq!(bus.get_health_metrics().reconnect_count, 0);
    }

    #[tokio::test]
    async fn test_publish_fails_without_connection() {
        let bus = MqttBus::new("test-detector", test_config()).unwrap();
        let record = DnaRecord::new(vec!["ACGT".to_string()], DnaKind::Human);
        assert!(bus.publish_record(&record).await.is_err());
        assert!(bus.subscribe_records().await.is_err());
    }

    fn test_supervisor(message_forwarder: Arc<Mutex<MessageForwarder>>) -> Supervisor {
        let (client, _event_loop) =
            MqttBus::create_connection("test-detector", &test_config()).unwrap();
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Connecting);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        Supervisor {
            service_id: "test-detector".to_string(),
            config: test_config(),
            client: Arc::new(Mutex::new(client)),
            state_tx,
            shutdown_rx,
            reconnect_config: ReconnectConfig::default(),
            reconnect_attempts: 0,
            reconnect_count: Arc::new(AtomicU32::new(0)),
            subscribed_topics: Arc::new(Mutex::new(Vec::new())),
            message_forwarder,
            expected_topic: TopicBuilder::classified_topic("test-detector"),
        }
    }

    #[test]
    fn test_bus_is_shareable_publisher() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MqttBus>();

        let bus = MqttBus::new("test-detector", test_config()).unwrap();
        let publisher: Arc<dyn Publisher> = Arc::new(bus);
        assert_eq!(publisher.name(), "mqtt");
    }

    #[tokio::test]
    async fn test_publish_from_spawned_task() {
        let bus = Arc::new(MqttBus::new("test-detector", test_config()).unwrap());
        let publisher: Arc<dyn Publisher> = bus.clone();
        let record = DnaRecord::new(vec!["ACGT".to_string()], DnaKind::Mutant);

        let result = tokio::spawn(async move { publisher.publish_record(&record).await })
            .await
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_full_record_channel_does_not_stall_supervisor() {
        let (tx, mut rx) = mpsc::channel(1);
        let forwarder = Arc::new(Mutex::new(MessageForwarder::new()));
        forwarder.lock().await.set_record_sender(tx);
        let supervisor = test_supervisor(forwarder.clone());
        let topic = supervisor.expected_topic.clone();

        let first = DnaRecord::new(vec!["ACGT".to_string()], DnaKind::Human);
        let second = DnaRecord::new(vec!["TTTT".to_string()], DnaKind::Mutant);
        for record in [&first, &second] {
            let payload = MessageHandler::format_record_payload(record).unwrap();
            tokio::time::timeout(
                Duration::from_millis(200),
                supervisor.handle_message(&topic, &payload, false),
            )
            .await
            .expect("handle_message blocked on a full channel");
        }

        // The forwarder lock is free while delivery is pending
        assert!(forwarder.try_lock().is_ok());
        assert_eq!(rx.recv().await, Some(first));
        assert_eq!(rx.recv().await, Some(second));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let bus = MqttBus::new("test-detector", test_config()).unwrap();
        assert!(bus.disconnect().await.is_ok());
    }
}
