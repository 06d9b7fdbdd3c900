//! Messaging service abstraction
//!
//! The publish loop only sees this trait. The concrete MQTT client owns
//! transport, authentication, and retry timing; tests inject mocks.

use crate::listener::{PublishFailureListener, ReconnectionListener, ServiceInterruptionListener};
use crate::message::{OutboundMessage, Topic};
use std::sync::Arc;

pub mod mqtt;

/// Connection and publish operations offered by a messaging client
///
/// Listener registration must happen before `connect`; the registered
/// handlers are invoked from the client's own tasks and only observe.
#[async_trait::async_trait]
pub trait MessagingService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish a live connection, or fail after exhausting the retry policy
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Close the connection; the final step of shutdown
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Activate the outbound channel; must succeed before any publish
    async fn start_publisher(&mut self) -> Result<(), Self::Error>;

    /// Stop the outbound channel and release its resources; later
    /// publishes are rejected
    async fn terminate_publisher(&mut self) -> Result<(), Self::Error>;

    /// Publish one direct message; failures are also reported through the
    /// publish-failure listener
    async fn publish(&self, topic: &Topic, message: &OutboundMessage) -> Result<(), Self::Error>;

    /// Whether the session is currently connected
    fn is_connected(&self) -> bool;

    /// Whether the publisher has been started and the session is up
    fn is_ready(&self) -> bool;

    /// Current connection state, if a connection was ever attempted
    fn connection_state(&self) -> Option<mqtt::ConnectionState>;

    fn add_reconnection_listener(&mut self, listener: Arc<dyn ReconnectionListener>);

    fn add_service_interruption_listener(&mut self, listener: Arc<dyn ServiceInterruptionListener>);

    fn set_publish_failure_listener(&mut self, listener: Arc<dyn PublishFailureListener>);
}

/// Type alias for the MQTT-backed service
pub type MqttMessaging = mqtt::MqttMessaging;
