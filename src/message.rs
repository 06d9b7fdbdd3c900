//! Outbound message model and topic construction
//!
//! Messages are rebuilt fresh per send: the builder carries the stable
//! properties while the id and payload are overridden with the running
//! counter each iteration.

use std::collections::HashMap;
use std::fmt;

/// A direct (best-effort, non-persistent) outbound message
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Application-assigned message id, updated per send
    pub application_message_id: String,
    /// Small set of string key/value properties carried as headers
    pub properties: HashMap<String, String>,
    /// String payload
    pub payload: String,
}

/// Reusable builder for outbound messages
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    application_message_id: String,
    properties: HashMap<String, String>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application message id; the last call wins
    pub fn with_application_message_id<S: Into<String>>(mut self, id: S) -> Self {
        self.application_message_id = id.into();
        self
    }

    /// Attach a string property
    pub fn with_property<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Produce a message with the given payload; the builder stays usable
    pub fn build<S: Into<String>>(&self, payload: S) -> OutboundMessage {
        OutboundMessage {
            application_message_id: self.application_message_id.clone(),
            properties: self.properties.clone(),
            payload: payload.into(),
        }
    }
}

/// Hierarchical topic path used for publish routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic(String);

impl Topic {
    /// Wrap an already-formed topic path
    pub fn of<S: Into<String>>(path: S) -> Self {
        Self(path.into())
    }

    /// Build the per-message direct publish topic: `{prefix}/direct/pub/{count}`
    pub fn direct(prefix: &str, count: u32) -> Self {
        Self(format!("{prefix}/direct/pub/{count}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
