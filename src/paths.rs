//! Path resolution for catdiff
//!
//! # Environment Variables
//!
//! - `CATDIFF_CONFIG_DIR` - Override config directory
//!
//! # Resolution Priority
//!
//! For config_dir():
//! 1. `CATDIFF_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/catdiff` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\catdiff`
//!    - macOS/Linux: `~/.config/catdiff`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "CATDIFF_CONFIG_DIR";

/// Name of the settings file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the catdiff config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        let path = PathBuf::from(xdg_config).join("catdiff");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("catdiff"));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("catdiff"))
}

/// Default settings file location
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand `~` and environment variables in a path
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
