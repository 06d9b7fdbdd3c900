//! MQTT-backed messaging service
//!
//! Split into a pure layer and an impure layer:
//!
//! - [`connection`] - connection state, retry policy, endpoint rotation,
//!   and option building; all plain functions and data
//! - [`client`] - the rumqttc event loop supervisor and the actual I/O

pub mod client;
pub mod connection;

pub use client::MqttMessaging;
pub use connection::{BrokerError, ConnectionState, RetryPolicy};
