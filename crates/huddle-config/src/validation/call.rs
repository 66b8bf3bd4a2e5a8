//! Validation for ICE and negotiation settings.

use crate::schema::HuddleConfig;

use super::helpers::check_range;

/// At least one STUN server, and no empty URL lists.
pub(crate) fn validate_ice(errors: &mut Vec<String>, config: &HuddleConfig) {
    let servers = &config.ice.servers;
    if servers.is_empty() {
        errors.push("ice.servers must contain at least one server".into());
        return;
    }

    for (i, server) in servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("ice.servers[{i}].urls is empty"));
        }
    }

    let has_stun = servers
        .iter()
        .flat_map(|s| s.urls.iter())
        .any(|url| url.starts_with("stun:") || url.starts_with("stuns:"));
    if !has_stun {
        errors.push("ice.servers must include a stun: or stuns: url".into());
    }
}

pub(crate) fn validate_negotiation(errors: &mut Vec<String>, config: &HuddleConfig) {
    check_range(errors, "negotiation.timeout_secs", config.negotiation.timeout_secs, 0..=600);
}
