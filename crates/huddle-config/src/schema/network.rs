//! Signaling client and relay server configuration.

use serde::{Deserialize, Serialize};

/// Where and how the call side reaches the signaling relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay.
    pub url: String,
    pub connect_timeout_secs: u64,
    /// Base reconnect delay; doubles per failed attempt.
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".into(),
            connect_timeout_secs: 15,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

/// Settings for the `huddle-relay` server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u32,
    /// Seconds a new socket has to send its `join`.
    pub join_timeout_secs: u64,
    /// Refuse a second concurrent screen sharer per room.
    pub exclusive_screen_share: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
            join_timeout_secs: 10,
            exclusive_screen_share: false,
        }
    }
}
