//! Config file discovery and loading.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::LinkError;

/// Load configuration from the given path, or the default location.
///
/// A missing file at the default location yields the defaults; a missing
/// file that was named explicitly is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, LinkError> {
    let (config_path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| LinkError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| LinkError::Config(format!("failed to parse config: {e}")))?;
        config.link_policy()?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else if explicit {
        Err(LinkError::Config(format!(
            "config file not found: {}",
            config_path.display()
        )))
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("rc-link")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
