//! Configuration schema types for huddle.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults documented on each section.

mod call;
mod network;
mod system;

pub use call::*;
pub use network::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration shared by the call coordinator and the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    pub ice: IceConfig,
    pub negotiation: NegotiationConfig,
    pub media: MediaConfig,
    pub screen_share: ScreenShareConfig,
    pub signaling: SignalingConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ice_is_single_public_stun() {
        let config = HuddleConfig::default();
        assert_eq!(config.ice.servers.len(), 1);
        assert_eq!(
            config.ice.servers[0].urls,
            vec!["stun:stun.l.google.com:19302".to_string()]
        );
        assert_eq!(config.ice.candidate_pool_size, 10);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: HuddleConfig = toml::from_str(
            r#"
[negotiation]
timeout_secs = 5
"#,
        )
        .unwrap();
        assert_eq!(config.negotiation.timeout_secs, 5);
        assert_eq!(config.relay.port, 8000);
        assert!(config.media.video);
    }

    #[test]
    fn share_quality_parses_lowercase() {
        let config: HuddleConfig = toml::from_str(
            r#"
[screen_share]
quality = "ultra"
"#,
        )
        .unwrap();
        assert_eq!(config.screen_share.quality, ShareQuality::Ultra);
        assert_eq!(config.screen_share.quality.max_width(), 3840);
    }
}
