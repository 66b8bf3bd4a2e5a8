//! Validation for the signaling client and relay sections.

use crate::schema::HuddleConfig;

use super::helpers::check_range;

pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &HuddleConfig) {
    let signaling = &config.signaling;
    if !(signaling.url.starts_with("ws://") || signaling.url.starts_with("wss://")) {
        errors.push(format!(
            "signaling.url = {:?} must start with ws:// or wss://",
            signaling.url
        ));
    }
    check_range(errors, "signaling.connect_timeout_secs", signaling.connect_timeout_secs, 1..=120);
    check_range(errors, "signaling.reconnect_delay_secs", signaling.reconnect_delay_secs, 1..=60);
    if signaling.max_reconnect_delay_secs < signaling.reconnect_delay_secs {
        errors.push(format!(
            "signaling.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            signaling.max_reconnect_delay_secs, signaling.reconnect_delay_secs
        ));
    }
}

pub(crate) fn validate_relay(errors: &mut Vec<String>, config: &HuddleConfig) {
    check_range(errors, "relay.port", config.relay.port, 1024..=65535);
    check_range(errors, "relay.join_timeout_secs", config.relay.join_timeout_secs, 1..=60);
}
