//! huddle configuration system.
//!
//! TOML-based configuration for the call coordinator and the signaling
//! relay. All config sections use defaults so partial configs work out of
//! the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use huddle_config::load_config;
//!
//! let config = load_config().expect("failed to load config");
//! println!("relay listens on {}:{}", config.relay.bind, config.relay.port);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{HuddleConfig, CONFIG_SCHEMA_VERSION};
pub use toml_loader::{load_default, load_from_path};

use huddle_common::ConfigError;

/// Load config from the platform default path and validate it strictly.
pub fn load_config() -> Result<HuddleConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes_every_section() {
        let text = toml::to_string(&HuddleConfig::default()).unwrap();
        for section in [
            "[ice]",
            "[negotiation]",
            "[media]",
            "[screen_share]",
            "[signaling]",
            "[relay]",
            "[logging]",
        ] {
            assert!(text.contains(section), "missing {section}");
        }
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string(&HuddleConfig::default()).unwrap();
        let parsed: HuddleConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.relay.port, 8000);
        assert_eq!(parsed.ice.candidate_pool_size, 10);
        assert_eq!(parsed.logging.level, schema::LogLevel::Info);
    }
}
