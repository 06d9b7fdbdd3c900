//! Environment-driven configuration for the publisher
//!
//! Broker connection settings come from environment variables with
//! documented fallback defaults. Loading goes through a pure lookup
//! function so tests never have to touch real process environment.

use serde::{Serialize, Serializer};
use std::time::Duration;

/// Environment variable naming the broker endpoint list (comma-separated URLs)
pub const ENV_BROKER_HOSTS: &str = "BROKER_HOSTS";
/// Environment variable naming the logical broker partition
pub const ENV_BROKER_VPN: &str = "BROKER_VPN";
/// Environment variable naming the authentication identity
pub const ENV_BROKER_USERNAME: &str = "BROKER_USERNAME";
/// Environment variable naming the authentication credential
pub const ENV_BROKER_PASSWORD: &str = "BROKER_PASSWORD";

/// Default dual localhost endpoints, tried in order during connection retries
pub const DEFAULT_HOSTS: &str = "mqtt://localhost:1883,mqtt://localhost:1884";
pub const DEFAULT_VPN: &str = "default";
pub const DEFAULT_USERNAME: &str = "default";
pub const DEFAULT_PASSWORD: &str = "default";

/// Broker connection configuration, immutable once built
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BrokerConfig {
    /// Broker endpoint URLs; retries rotate through the list
    pub hosts: Vec<String>,
    /// Logical broker partition (vpn / namespace)
    pub vpn: String,
    /// Authentication identity
    pub username: String,
    /// Authentication credential
    #[serde(serialize_with = "redact")]
    pub password: String,
    /// TLS certificate validation. Disabled by default: development-only
    /// posture carried over from the demo environment this targets.
    pub tls_cert_validation: bool,
}

fn redact<S: Serializer>(_password: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("***")
}

impl BrokerConfig {
    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Deterministic: given the same lookup results, the same config comes
    /// out. Unset variables fall back to the documented defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let hosts_raw = lookup(ENV_BROKER_HOSTS).unwrap_or_else(|| DEFAULT_HOSTS.to_string());

        Self {
            hosts: split_host_list(&hosts_raw),
            vpn: lookup(ENV_BROKER_VPN).unwrap_or_else(|| DEFAULT_VPN.to_string()),
            username: lookup(ENV_BROKER_USERNAME).unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: lookup(ENV_BROKER_PASSWORD).unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            tls_cert_validation: false,
        }
    }

    /// Build a configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// Split a comma-separated endpoint list, dropping empty entries
fn split_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fixed topic prefix for published messages
pub const TOPIC_PREFIX: &str = "guatemaltek/training/pubcycle";
/// Messages per cycle before the counter resets
pub const MESSAGE_COUNT: u32 = 3;
/// Body shared by every published message; the counter is appended per send
pub const MESSAGE_BODY: &str = "Hello from pubcycle";

/// Fixed (non-environment) parameters of the publish loop
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublishSettings {
    /// Batch size N; topics are suffixed 1..=N
    pub message_count: u32,
    /// Prefix every per-message topic is built from
    pub topic_prefix: String,
    /// Payload body; the running counter is appended per message
    pub message_body: String,
    /// Pause between individual sends
    pub per_message_delay: Duration,
    /// Additional pause after a full batch, before the counter restarts
    pub cycle_delay: Duration,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            message_count: MESSAGE_COUNT,
            topic_prefix: TOPIC_PREFIX.to_string(),
            message_body: MESSAGE_BODY.to_string(),
            per_message_delay: Duration::from_secs(1),
            cycle_delay: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_environment_empty() {
        let config = BrokerConfig::from_lookup(|_| None);

        assert_eq!(
            config.hosts,
            vec![
                "mqtt://localhost:1883".to_string(),
                "mqtt://localhost:1884".to_string()
            ]
        );
        assert_eq!(config.vpn, "default");
        assert_eq!(config.username, "default");
        assert_eq!(config.password, "default");
        assert!(!config.tls_cert_validation);
    }

    #[test]
    fn test_lookup_values_take_precedence() {
        let config = BrokerConfig::from_lookup(|name| match name {
            ENV_BROKER_HOSTS => Some("mqtt://broker.example:1883".to_string()),
            ENV_BROKER_VPN => Some("training".to_string()),
            ENV_BROKER_USERNAME => Some("alice".to_string()),
            ENV_BROKER_PASSWORD => Some("hunter2".to_string()),
            _ => None,
        });

        assert_eq!(config.hosts, vec!["mqtt://broker.example:1883".to_string()]);
        assert_eq!(config.vpn, "training");
        assert_eq!(config.username, "alice");
        assert_eq!(config.password, "hunter2");
    }

    #[test]
    fn test_host_list_splitting() {
        assert_eq!(
            split_host_list("mqtt://a:1883, mqtt://b:1884 ,,"),
            vec!["mqtt://a:1883".to_string(), "mqtt://b:1884".to_string()]
        );
        assert!(split_host_list("").is_empty());
    }

    #[test]
    fn test_password_redacted_in_rendered_config() {
        let config = BrokerConfig::from_lookup(|name| match name {
            ENV_BROKER_PASSWORD => Some("supersecret".to_string()),
            _ => None,
        });

        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_publish_settings_defaults() {
        let settings = PublishSettings::default();
        assert_eq!(settings.message_count, 3);
        assert_eq!(settings.per_message_delay, Duration::from_secs(1));
        assert_eq!(settings.cycle_delay, Duration::from_secs(10));
        assert_eq!(settings.topic_prefix, TOPIC_PREFIX);
    }
}
