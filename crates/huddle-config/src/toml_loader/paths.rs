//! Where the config file lives, and seeding it on first run.

use std::path::{Path, PathBuf};

use huddle_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

const APP_DIR: &str = "huddle";
const FILE_NAME: &str = "config.toml";

/// `<platform config dir>/huddle/config.toml`.
pub(super) fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(FILE_NAME))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Write the commented template to `path`, creating parent directories.
pub(super) fn write_template(path: &Path) -> Result<(), ConfigError> {
    let seed_failed =
        |e: std::io::Error| ConfigError::ParseError(format!("cannot seed {}: {e}", path.display()));

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(seed_failed)?;
    }
    std::fs::write(path, default_config_toml()).map_err(seed_failed)?;

    info!(path = %path.display(), "Wrote default config");
    Ok(())
}
