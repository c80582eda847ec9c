//! Plugin host error types

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use shiromana_plugin_api::{LibraryHandle, MediaHandle};

use super::module::ModuleId;

/// Abnormal failure raised inside plugin code and caught at the call
/// boundary. Distinct from a non-zero status, which is ordinary data.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Plugin '{plugin}' faulted in {entry_point}: {message}")]
pub struct PluginFault {
    /// Plugin name, or the binary location if the name is not known yet
    pub plugin: String,
    /// Entry point that was executing
    pub entry_point: &'static str,
    /// Panic payload, when it was a string
    pub message: String,
}

/// Reasons a single plugin binary fails to load. Never fatal to the host.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The binary could not be opened as a dynamic library
    #[error("Failed to open plugin binary {path}: {source}")]
    BinaryOpenFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// A required entry point is not exported
    #[error("Plugin binary {path} does not export '{symbol}'")]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    /// `name()` or `trigger()` returned null, empty or non UTF-8 text
    #[error("Plugin binary {path}: '{symbol}' returned {reason}")]
    InvalidString {
        path: PathBuf,
        symbol: &'static str,
        reason: &'static str,
    },

    /// `shiromana_abi_version()` returned a generation this host does not know
    #[error("Plugin binary {path} declares unsupported ABI version {found}")]
    UnsupportedAbi { path: PathBuf, found: u32 },

    /// The trigger declaration is empty; the plugin loads but never fires
    #[error("Plugin '{plugin}' declares no triggers")]
    NoTriggers { plugin: String },

    /// `on_load` returned a non-zero status
    #[error("Plugin '{plugin}' on_load returned status {code}")]
    InitFailed { plugin: String, code: u32 },

    /// Plugin code panicked while loading
    #[error(transparent)]
    Fault(#[from] PluginFault),
}

/// Errors that can occur in the plugin host
#[derive(Error, Debug)]
pub enum PluginHostError {
    /// A plugin failed to load
    #[error("Plugin load failed: {0}")]
    Load(#[from] LoadError),

    /// No module with this id was ever loaded by this host
    #[error("Plugin module {id} not found")]
    NotFound { id: ModuleId },

    /// The event names a library other than the one this host serves
    #[error("Event targets {found}, but this host serves {expected}")]
    ForeignLibrary {
        expected: LibraryHandle,
        found: LibraryHandle,
    },

    /// A media-scoped trigger was raised without a media handle
    #[error("Trigger '{kind}' requires a media handle")]
    MissingMedia { kind: String },

    /// The media handle no longer resolves in the catalog
    #[error("{media} is no longer in the catalog")]
    StaleMedia { media: MediaHandle },

    /// Host configuration could not be parsed or written
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
