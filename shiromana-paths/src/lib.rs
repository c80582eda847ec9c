//! XDG Base Directory paths for shiromana.
//!
//! Plugin binaries and host configuration live under the config directory,
//! mirroring how CLI tools like gh or docker lay out their state.

use std::path::PathBuf;

/// Get the shiromana config directory.
///
/// Returns `$XDG_CONFIG_HOME/shiromana` if set, otherwise `~/.config/shiromana`.
///
/// # Examples
///
/// ```
/// use shiromana_paths::config_dir;
///
/// let config = config_dir();
/// let plugin_dir = config.join("plugins");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("shiromana")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/shiromana")
    } else {
        PathBuf::from(".config/shiromana")
    }
}

/// Directory scanned for plugin binaries by default.
pub fn plugin_dir() -> PathBuf {
    config_dir().join("plugins")
}

/// Default location of the plugin host configuration file.
pub fn plugin_config_file() -> PathBuf {
    config_dir().join("plugins.toml")
}
