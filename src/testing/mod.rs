//! Testing utilities and mock implementations
//!
//! Mocks for the message bus and the store, so the service can be tested
//! without an MQTT broker or a database file.

pub mod mocks;

pub use mocks::*;
