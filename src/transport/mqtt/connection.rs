//! Pure connection state, retry policy, and option building
//!
//! Everything here is plain data and functions so the retry math and the
//! endpoint handling can be tested without a broker.

use crate::config::BrokerConfig;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state for the messaging session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Attempting the initial connection
    Connecting,
    /// Connected and ready for operations
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Re-establishing a dropped session (attempt count)
    Reconnecting(u32),
    /// Retry policy exhausted; no further attempts
    PermanentlyDisconnected(String),
}

impl ConnectionState {
    /// States in which publishing is allowed
    pub fn can_publish(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Bounded fixed-interval retry policy, passed once at build time
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum connection attempts before giving up
    pub max_attempts: u32,
    /// Fixed spacing between attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 20 attempts spaced 3 seconds apart
        Self::parametrized(20, Duration::from_secs(3))
    }
}

impl RetryPolicy {
    /// Build a policy with an explicit attempt count and spacing
    pub fn parametrized(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Total window the initial connection may take before it is declared
    /// failed: every attempt plus one interval of slack
    pub fn connect_window(&self) -> Duration {
        self.interval * (self.max_attempts + 1)
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Supervisor reaction to a dropped or failed session; pure decision so
/// the retry accounting can be tested without a broker
#[derive(Debug, Clone, PartialEq)]
pub enum DropAction {
    /// Wait the retry interval, then dial again as `next_attempt`
    Retry {
        next_attempt: u32,
        notify_reconnecting: bool,
    },
    /// Retry policy exhausted; the supervisor stops
    GiveUp { notify_interrupted: bool },
}

/// Classify a session drop after `failed_attempts` prior failures.
///
/// Listeners only hear about drops once the session was established at
/// least once: startup failures stay silent until the policy gives up and
/// `connect` reports the exhaustion to its caller.
pub fn classify_drop(
    policy: &RetryPolicy,
    failed_attempts: u32,
    was_connected: bool,
) -> DropAction {
    if policy.allows_attempt(failed_attempts) {
        DropAction::Retry {
            next_attempt: failed_attempts + 1,
            notify_reconnecting: was_connected,
        }
    } else {
        DropAction::GiveUp {
            notify_interrupted: was_connected,
        }
    }
}

/// Whether a ConnAck closes out a reconnection rather than the initial
/// connect, so the reconnection listeners should hear about it
pub fn is_reconnect(was_connected: bool, failed_attempts: u32) -> bool {
    was_connected && failed_attempts > 0
}

/// Endpoint used for a given attempt: retries walk the host list in order
/// and wrap around, so a two-endpoint config alternates between them.
pub fn endpoint_for_attempt(hosts: &[String], attempt: u32) -> Option<&str> {
    if hosts.is_empty() {
        return None;
    }
    let index = (attempt.saturating_sub(1) as usize) % hosts.len();
    Some(hosts[index].as_str())
}

/// MQTT messaging errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Publisher not started")]
    PublisherNotStarted,
    #[error("Publishing failed: {0}")]
    PublishFailed(String),
}

/// Build rumqttc options for one endpoint of the configured host list
pub fn configure_mqtt_options(
    config: &BrokerConfig,
    endpoint: &str,
) -> Result<MqttOptions, BrokerError> {
    let url =
        Url::parse(endpoint).map_err(|_| BrokerError::InvalidBrokerUrl(endpoint.to_string()))?;

    let host = url
        .host_str()
        .ok_or_else(|| BrokerError::InvalidBrokerUrl(endpoint.to_string()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    // Unique client id per connection attempt to avoid broker-side
    // session conflicts between runs
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let client_id = format!("{}-pub-{timestamp}", config.vpn);
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        if !config.tls_cert_validation {
            // Verification stays with the client library; we only record
            // the dev posture
            tracing::warn!(
                endpoint = %endpoint,
                "TLS certificate validation disabled in config; using platform trust store"
            );
        }
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    mqtt_options.set_credentials(&config.username, &config.password);
    mqtt_options.set_keep_alive(Duration::from_secs(60));

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_broker_config() -> BrokerConfig {
        BrokerConfig::from_lookup(|_| None)
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.interval, Duration::from_secs(3));
    }

    #[test]
    fn test_retry_policy_allows_attempt() {
        let policy = RetryPolicy::parametrized(3, Duration::from_millis(10));
        assert!(policy.allows_attempt(0));
        assert!(policy.allows_attempt(2));
        assert!(!policy.allows_attempt(3));
        assert!(!policy.allows_attempt(100));
    }

    #[test]
    fn test_connect_window_covers_all_attempts() {
        let policy = RetryPolicy::parametrized(20, Duration::from_secs(3));
        assert_eq!(policy.connect_window(), Duration::from_secs(63));
    }

    #[test]
    fn test_endpoint_rotation() {
        let hosts = vec![
            "mqtt://a:1883".to_string(),
            "mqtt://b:1884".to_string(),
        ];
        assert_eq!(endpoint_for_attempt(&hosts, 1), Some("mqtt://a:1883"));
        assert_eq!(endpoint_for_attempt(&hosts, 2), Some("mqtt://b:1884"));
        assert_eq!(endpoint_for_attempt(&hosts, 3), Some("mqtt://a:1883"));
        assert_eq!(endpoint_for_attempt(&[], 1), None);
    }

    #[test]
    fn test_classify_drop_counts_attempts_up_to_the_policy_bound() {
        let policy = RetryPolicy::parametrized(3, Duration::from_millis(10));
        assert_eq!(
            classify_drop(&policy, 0, true),
            DropAction::Retry {
                next_attempt: 1,
                notify_reconnecting: true
            }
        );
        assert_eq!(
            classify_drop(&policy, 2, true),
            DropAction::Retry {
                next_attempt: 3,
                notify_reconnecting: true
            }
        );
        // The bound itself is the first failure that gives up
        assert_eq!(
            classify_drop(&policy, 3, true),
            DropAction::GiveUp {
                notify_interrupted: true
            }
        );
    }

    #[test]
    fn test_classify_drop_is_silent_before_the_first_session() {
        let policy = RetryPolicy::parametrized(2, Duration::from_millis(10));
        assert_eq!(
            classify_drop(&policy, 0, false),
            DropAction::Retry {
                next_attempt: 1,
                notify_reconnecting: false
            }
        );
        assert_eq!(
            classify_drop(&policy, 2, false),
            DropAction::GiveUp {
                notify_interrupted: false
            }
        );
    }

    #[test]
    fn test_reconnect_announcement_requires_prior_session_and_failures() {
        assert!(is_reconnect(true, 1));
        assert!(is_reconnect(true, 19));
        // The very first ConnAck is a connect, not a reconnect
        assert!(!is_reconnect(true, 0));
        assert!(!is_reconnect(false, 3));
    }

    #[test]
    fn test_connection_state_can_publish() {
        assert!(ConnectionState::Connected.can_publish());
        assert!(!ConnectionState::Connecting.can_publish());
        assert!(!ConnectionState::Reconnecting(2).can_publish());
        assert!(!ConnectionState::Disconnected("gone".to_string()).can_publish());
    }

    #[test]
    fn test_configure_mqtt_options() {
        let config = test_broker_config();
        let options = configure_mqtt_options(&config, "mqtt://localhost:1883");
        assert!(options.is_ok());
    }

    #[test]
    fn test_invalid_broker_url() {
        let config = test_broker_config();
        let result = configure_mqtt_options(&config, "not a url");
        assert!(matches!(result, Err(BrokerError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_broker_error_display() {
        let errors = vec![
            BrokerError::RetriesExhausted { attempts: 20 },
            BrokerError::InvalidBrokerUrl("x".to_string()),
            BrokerError::NotConnected {
                state: ConnectionState::Connecting,
            },
            BrokerError::PublisherNotStarted,
            BrokerError::PublishFailed("queue full".to_string()),
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
