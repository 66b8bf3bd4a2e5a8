//! Tests for the full validation pipeline.

use super::*;
use crate::schema::*;

#[test]
fn default_config_validates() {
    let config = HuddleConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_missing_ice_servers() {
    let mut config = HuddleConfig::default();
    config.ice.servers.clear();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("ice.servers"));
}

#[test]
fn catches_turn_only_servers() {
    let mut config = HuddleConfig::default();
    config.ice.servers = vec![IceServer {
        urls: vec!["turn:turn.example.org:3478".into()],
    }];
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("stun:"));
}

#[test]
fn catches_empty_url_list() {
    let mut config = HuddleConfig::default();
    config.ice.servers.push(IceServer { urls: vec![] });
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("ice.servers[1].urls"));
}

#[test]
fn zero_negotiation_timeout_is_allowed() {
    let mut config = HuddleConfig::default();
    config.negotiation.timeout_secs = 0;
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_negotiation_timeout_too_large() {
    let mut config = HuddleConfig::default();
    config.negotiation.timeout_secs = 3600;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("negotiation.timeout_secs"));
}

#[test]
fn catches_http_signaling_url() {
    let mut config = HuddleConfig::default();
    config.signaling.url = "http://127.0.0.1:8000".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.url"));
}

#[test]
fn catches_inverted_reconnect_delays() {
    let mut config = HuddleConfig::default();
    config.signaling.reconnect_delay_secs = 10;
    config.signaling.max_reconnect_delay_secs = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("max_reconnect_delay_secs"));
}

#[test]
fn catches_privileged_relay_port() {
    let mut config = HuddleConfig::default();
    config.relay.port = 80;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.port"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = HuddleConfig::default();
    config.relay.port = 70000;
    config.relay.join_timeout_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.port"));
    assert!(err.contains("relay.join_timeout_secs"));
}
