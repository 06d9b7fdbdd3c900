//! Configuration loading determinism
//!
//! The broker config must be a pure function of the variable lookup:
//! set variables are reflected verbatim, unset ones fall back to the
//! documented defaults.

use pubcycle::config::{
    BrokerConfig, PublishSettings, ENV_BROKER_HOSTS, ENV_BROKER_PASSWORD, ENV_BROKER_USERNAME,
    ENV_BROKER_VPN,
};
use std::collections::HashMap;
use std::time::Duration;

fn lookup_from<'a>(map: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + 'a {
    move |name| map.get(name).map(|v| v.to_string())
}

#[test]
fn test_full_environment_reflected_verbatim() {
    let env = HashMap::from([
        (ENV_BROKER_HOSTS, "mqtts://broker-a:8883,mqtts://broker-b:8883"),
        (ENV_BROKER_VPN, "production"),
        (ENV_BROKER_USERNAME, "svc-publisher"),
        (ENV_BROKER_PASSWORD, "s3cret"),
    ]);

    let config = BrokerConfig::from_lookup(lookup_from(&env));

    assert_eq!(
        config.hosts,
        vec![
            "mqtts://broker-a:8883".to_string(),
            "mqtts://broker-b:8883".to_string()
        ]
    );
    assert_eq!(config.vpn, "production");
    assert_eq!(config.username, "svc-publisher");
    assert_eq!(config.password, "s3cret");
}

#[test]
fn test_empty_environment_yields_documented_defaults() {
    let config = BrokerConfig::from_lookup(|_| None);

    // Localhost dual endpoints, everything else "default"
    assert_eq!(config.hosts.len(), 2);
    assert!(config.hosts.iter().all(|h| h.contains("localhost")));
    assert_eq!(config.vpn, "default");
    assert_eq!(config.username, "default");
    assert_eq!(config.password, "default");
    assert!(!config.tls_cert_validation);
}

#[test]
fn test_partial_environment_mixes_values_and_defaults() {
    let env = HashMap::from([(ENV_BROKER_VPN, "training")]);

    let config = BrokerConfig::from_lookup(lookup_from(&env));

    assert_eq!(config.vpn, "training");
    assert_eq!(config.username, "default");
    assert_eq!(config.hosts.len(), 2);
}

#[test]
fn test_loading_is_deterministic() {
    let env = HashMap::from([(ENV_BROKER_HOSTS, "mqtt://one:1883")]);

    let first = BrokerConfig::from_lookup(lookup_from(&env));
    let second = BrokerConfig::from_lookup(lookup_from(&env));

    assert_eq!(first, second);
}

#[test]
fn test_fixed_loop_parameters() {
    // Non-environment parameters are constants of the build
    let settings = PublishSettings::default();
    assert_eq!(settings.message_count, 3);
    assert_eq!(settings.per_message_delay, Duration::from_secs(1));
    assert_eq!(settings.cycle_delay, Duration::from_secs(10));
    assert!(!settings.topic_prefix.is_empty());
}
