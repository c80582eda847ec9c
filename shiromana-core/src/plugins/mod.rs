//! Plugin host runtime for shiromana
//!
//! This module loads native plugin binaries and routes catalog events to them:
//!
//! - [`PluginHost`]: Loads, unloads and dispatches events to plugin modules
//! - [`PluginModule`]: One loaded binary, its ABI generation and lifecycle state
//! - [`TriggerRegistry`]: Which modules listen to which trigger token
//! - [`PluginHostError`] / [`LoadError`]: Error types for plugin operations
//!
//! # Plugin Discovery
//!
//! `load_all` scans each directory in [`PluginHostConfig::plugin_dirs`]
//! (default `~/.config/shiromana/plugins/`) for shared libraries (`.so`,
//! `.dylib` or `.dll`) and loads them in file-name order. A binary that fails
//! to load is logged and skipped.
//!
//! # ABI generations
//!
//! Every plugin exports `name`, `trigger`, `on_load`, `on_unload` and
//! `on_trigger`. A plugin that also exports `shiromana_abi_version`
//! returning 2 uses the V2 signatures, where `on_trigger` receives the
//! library, the media and the trigger token. Without that export the plugin
//! is treated as V1.
//!
//! # Fault isolation
//!
//! A plugin binary links its own copy of std, so a panic raised in it cannot
//! unwind through the host: the host's runtime treats it as foreign and
//! aborts. Plugins built with `export_media_plugin!` stop every panic at the
//! export boundary and return `STATUS_PANICKED` instead. Calls made from the
//! host are additionally wrapped in `catch_unwind`, which covers in-process
//! modules such as [`StaticModule`].
//!
//! Either way the result is [`InvokeStatus::Fault`]: the module goes
//! `Failed`, loses its subscriptions and has its binary released without
//! `on_unload`. A plugin that lets a panic escape anyway, aborts, or
//! segfaults still takes the process down.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shiromana_core::catalog::MemoryCatalog;
//! use shiromana_core::plugins::{DomainEvent, PluginHost, PluginHostConfig};
//! use shiromana_plugin_api::{LibraryHandle, MediaHandle, TriggerKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let library = LibraryHandle::new(1).ok_or("zero handle")?;
//! let catalog = Arc::new(MemoryCatalog::new(library));
//! let host = PluginHost::new(PluginHostConfig::default(), catalog.clone());
//!
//! let summary = host.load_all();
//! println!("{} plugins loaded", summary.loaded.len());
//!
//! let media = MediaHandle::new(42).ok_or("zero handle")?;
//! catalog.insert(media);
//! for record in host.dispatch(&DomainEvent::of(TriggerKind::MediaAdd, library, Some(media)))? {
//!     println!("{}: {:?}", record.plugin, record.status);
//! }
//!
//! host.shutdown();
//! # Ok(())
//! # }
//! ```

mod binary;
mod config;
mod discovery;
mod dispatch;
mod error;
mod host;
mod invoke;
mod module;
mod registry;
#[cfg(test)]
mod testing;

pub use binary::{ModuleBinary, SharedLibrary, StaticModule};
pub use config::PluginHostConfig;
pub use discovery::{DirectoryScanner, Discovery, library_extensions};
pub use dispatch::{DispatchRecord, DispatchSink, DomainEvent, JsonLinesSink, TracingSink};
pub use error::{LoadError, PluginFault, PluginHostError};
pub use host::{LoadSummary, ModuleInfo, PluginHost};
pub use invoke::InvokeStatus;
pub use module::{ModuleId, ModuleState, PluginModule};
pub use registry::TriggerRegistry;
