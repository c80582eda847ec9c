//! shiromana-core: Plugin host runtime for the shiromana media library
//!
//! This crate lets a media library extend itself with native plugins:
//!
//! - **Plugin host** - [`PluginHost`] discovers, loads and unloads plugin binaries
//! - **Dispatch** - [`DomainEvent`]s are routed to every module subscribed to their trigger
//! - **Catalog** - [`catalog::Catalog`] is the library the host serves, and vets media handles
//!
//! The plugin-author side of the ABI lives in `shiromana-plugin-api`.

pub mod catalog;
pub mod plugins;

pub use catalog::{Catalog, FixedCatalog, MemoryCatalog};
pub use plugins::{
    DispatchRecord, DomainEvent, InvokeStatus, LoadError, ModuleId, ModuleState, PluginHost,
    PluginHostConfig, PluginHostError,
};
