//! Plugin discovery - finding candidate binaries on disk

use std::path::{Path, PathBuf};

use super::error::PluginHostError;

/// Finds candidate plugin binaries in a directory.
pub trait Discovery: Send + Sync {
    /// Paths to try loading, in the order they should be loaded.
    fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, PluginHostError>;
}

/// Shared-library file extensions for the current platform.
pub fn library_extensions() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else if cfg!(target_os = "windows") {
        &["dll"]
    } else {
        &["so"]
    }
}

/// Scans one directory level for shared libraries.
///
/// Results are sorted by file name so load order, and with it dispatch
/// order, is stable across runs.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    extensions: Vec<String>,
}

impl DirectoryScanner {
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::with_extensions(library_extensions().iter().copied())
    }
}

impl Discovery for DirectoryScanner {
    fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, PluginHostError> {
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.matches(&path) {
                found.push(path);
            }
        }
        found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(found)
    }
}
