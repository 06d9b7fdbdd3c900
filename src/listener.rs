//! Notification listener seams for session and publish events
//!
//! The messaging service invokes these callbacks from its own tasks. They
//! must be non-blocking, they only observe, and nothing in the publish
//! loop waits on them or assumes ordering relative to them.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Opaque session-level event delivered to reconnection and interruption
/// listeners
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    /// Underlying cause reported by the client library
    pub cause: String,
    /// Human-readable description
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ServiceEvent {
    pub fn new<C: Into<String>, M: Into<String>>(cause: C, message: M) -> Self {
        Self {
            cause: cause.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Event delivered when an individual publish is rejected or undeliverable
#[derive(Debug, Clone)]
pub struct FailedPublishEvent {
    pub topic: String,
    pub message_id: String,
    pub reason: String,
}

/// Notified when a dropped session is automatically re-established, and
/// when a re-establishment attempt starts
pub trait ReconnectionListener: Send + Sync {
    fn on_reconnected(&self, event: &ServiceEvent);
    fn on_reconnecting(&self, event: &ServiceEvent);
}

/// Notified when the session is disrupted without guaranteed recovery
pub trait ServiceInterruptionListener: Send + Sync {
    fn on_service_interrupted(&self, event: &ServiceEvent);
}

/// Notified when a single publish fails; fire-and-forget, the send loop
/// neither blocks nor retries on this signal
pub trait PublishFailureListener: Send + Sync {
    fn on_failed_publish(&self, event: &FailedPublishEvent);
}

/// Stateless handler that logs session events.
///
/// Reconnected and reconnecting get distinct messages on purpose: the
/// two events mean different things even when they carry the same cause.
#[derive(Debug, Default)]
pub struct LoggingServiceEventHandler;

impl ReconnectionListener for LoggingServiceEventHandler {
    fn on_reconnected(&self, event: &ServiceEvent) {
        info!(
            cause = %event.cause,
            message = %event.message,
            "Reconnected to broker"
        );
    }

    fn on_reconnecting(&self, event: &ServiceEvent) {
        warn!(
            cause = %event.cause,
            message = %event.message,
            "Reconnecting to broker"
        );
    }
}

impl ServiceInterruptionListener for LoggingServiceEventHandler {
    fn on_service_interrupted(&self, event: &ServiceEvent) {
        warn!(
            cause = %event.cause,
            message = %event.message,
            "Service interrupted"
        );
    }
}

/// Stateless handler that logs failed publishes
#[derive(Debug, Default)]
pub struct LoggingPublishFailureHandler;

impl PublishFailureListener for LoggingPublishFailureHandler {
    fn on_failed_publish(&self, event: &FailedPublishEvent) {
        warn!(
            topic = %event.topic,
            message_id = %event.message_id,
            reason = %event.reason,
            "Failed to publish message"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_event_carries_cause_and_message() {
        let event = ServiceEvent::new("connection reset", "session dropped");
        assert_eq!(event.cause, "connection reset");
        assert_eq!(event.message, "session dropped");
    }

    #[test]
    fn test_logging_handlers_do_not_panic() {
        // Handlers are log-only; invoking them outside a subscriber must be safe
        let handler = LoggingServiceEventHandler;
        let event = ServiceEvent::new("cause", "message");
        handler.on_reconnecting(&event);
        handler.on_reconnected(&event);
        handler.on_service_interrupted(&event);

        let publish_handler = LoggingPublishFailureHandler;
        publish_handler.on_failed_publish(&FailedPublishEvent {
            topic: "x/direct/pub/1".to_string(),
            message_id: "msg-1".to_string(),
            reason: "enqueue failed".to_string(),
        });
    }
}
