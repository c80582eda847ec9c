//! Plugin host configuration
//!
//! Stored as TOML, by default in `~/.config/shiromana/plugins.toml`:
//!
//! ```toml
//! plugin_dirs = ["/home/me/.config/shiromana/plugins", "/opt/shiromana/plugins"]
//! skip = ["libexperimental"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::error::PluginHostError;

/// Configuration for [`PluginHost`](super::PluginHost)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginHostConfig {
    /// Directories scanned by `load_all`, in order
    #[serde(default = "default_plugin_dirs")]
    pub plugin_dirs: Vec<PathBuf>,

    /// File stems `load_all` leaves alone
    #[serde(default)]
    pub skip: BTreeSet<String>,
}

fn default_plugin_dirs() -> Vec<PathBuf> {
    vec![shiromana_paths::plugin_dir()]
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: default_plugin_dirs(),
            skip: BTreeSet::new(),
        }
    }
}

impl PluginHostConfig {
    /// Config that scans exactly one directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dirs: vec![dir.into()],
            skip: BTreeSet::new(),
        }
    }

    /// Load config from a TOML file
    ///
    /// Returns the default config if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, PluginHostError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `~/.config/shiromana/plugins.toml`
    pub fn load_default() -> Result<Self, PluginHostError> {
        Self::load(&shiromana_paths::plugin_config_file())
    }

    pub fn from_toml(content: &str) -> Result<Self, PluginHostError> {
        toml::from_str(content).map_err(|e| PluginHostError::Config(e.to_string()))
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), PluginHostError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PluginHostError::Config(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Whether `load_all` should pass over this binary.
    pub fn is_skipped(&self, path: &Path) -> bool {
        path.file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| self.skip.contains(stem))
    }
}
