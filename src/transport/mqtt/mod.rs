//! MQTT bus for classified records
//!
//! - [`connection`] - options, backoff settings and errors (pure)
//! - [`message_handler`] - event routing and payload decoding (pure)
//! - [`health_monitor`] - reconnection decisions and health (pure)
//! - [`client`] - the bus itself and its reconnection supervisor (I/O)
//!
//! ```rust,no_run
//! use mutant_detector::config::MqttSection;
//! use mutant_detector::transport::mqtt::MqttBus;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     username_env: None,
//!     password_env: None,
//! };
//!
//! let mut bus = MqttBus::new("mutant-detector", config)?;
//! bus.connect().await?;
//! bus.subscribe_records().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::MqttBus;
pub use connection::{ConnectionState, MqttError, ReconnectConfig};
pub use health_monitor::{HealthMetrics, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
