//! Sources of plugin entry points.
//!
//! A [`ModuleBinary`] owns whatever keeps a plugin's code mapped and resolves
//! exported symbols by name. Entry points resolved from it stay valid only
//! while the binary is alive; [`PluginModule`](super::module::PluginModule)
//! enforces that by owning the binary exclusively and dropping it last.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use shiromana_plugin_api::abi::{
    AbiVersionFn, NameFn, OnLoadFn, OnTriggerV1Fn, OnTriggerV2Fn, OnUnloadV1Fn, OnUnloadV2Fn,
    RawEntryPoint, TriggerFn, symbols,
};
use shiromana_plugin_api::{AbiGeneration, erase_entry_point};

use super::error::LoadError;

/// A loaded plugin binary.
pub trait ModuleBinary: Send + Sync {
    /// Where the binary came from, for diagnostics.
    fn location(&self) -> &Path;

    /// Look up an exported symbol. The signature is not known at this point.
    fn resolve(&self, symbol: &str) -> Option<RawEntryPoint>;
}

/// A plugin loaded from a shared library on disk.
pub struct SharedLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl SharedLibrary {
    /// Map the shared library at `path`.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        // SAFETY: opening a library runs its initialisers. Plugins are
        // binaries the operator placed in a plugin directory and are trusted
        // to follow the ABI.
        let library =
            unsafe { libloading::Library::new(path) }.map_err(|source| {
                LoadError::BinaryOpenFailed {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }
}

impl ModuleBinary for SharedLibrary {
    fn location(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, symbol: &str) -> Option<RawEntryPoint> {
        // SAFETY: the symbol is copied out as an opaque function pointer and
        // only called after its signature has been restored.
        let sym: libloading::Symbol<RawEntryPoint> =
            unsafe { self.library.get(symbol.as_bytes()) }.ok()?;
        Some(*sym)
    }
}

impl std::fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLibrary")
            .field("path", &self.path)
            .finish()
    }
}

extern "C-unwind" fn declare_v1() -> u32 {
    AbiGeneration::V1.version()
}

extern "C-unwind" fn declare_v2() -> u32 {
    AbiGeneration::V2.version()
}

/// A plugin linked into the host process, described by a symbol table.
///
/// Goes through the same validation, generation detection and fault
/// isolation as a shared library.
///
/// ```ignore
/// let module = StaticModule::new("builtin://tagger")
///     .generation(AbiGeneration::V2)
///     .name(tagger_name)
///     .trigger(tagger_trigger)
///     .on_load(tagger_load)
///     .on_unload_v2(tagger_unload)
///     .on_trigger_v2(tagger_fire);
/// host.load_binary(Box::new(module))?;
/// ```
#[derive(Debug, Clone)]
pub struct StaticModule {
    location: PathBuf,
    symbols: HashMap<&'static str, RawEntryPoint>,
}

impl StaticModule {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            symbols: HashMap::new(),
        }
    }

    fn export(mut self, symbol: &'static str, entry: RawEntryPoint) -> Self {
        self.symbols.insert(symbol, entry);
        self
    }

    /// Export `shiromana_abi_version` reporting `generation`.
    pub fn generation(self, generation: AbiGeneration) -> Self {
        let f: AbiVersionFn = match generation {
            AbiGeneration::V1 => declare_v1,
            AbiGeneration::V2 => declare_v2,
        };
        self.abi_version(f)
    }

    pub fn abi_version(self, f: AbiVersionFn) -> Self {
        self.export(symbols::ABI_VERSION, erase_entry_point!(f, AbiVersionFn))
    }

    pub fn name(self, f: NameFn) -> Self {
        self.export(symbols::NAME, erase_entry_point!(f, NameFn))
    }

    pub fn trigger(self, f: TriggerFn) -> Self {
        self.export(symbols::TRIGGER, erase_entry_point!(f, TriggerFn))
    }

    pub fn on_load(self, f: OnLoadFn) -> Self {
        self.export(symbols::ON_LOAD, erase_entry_point!(f, OnLoadFn))
    }

    pub fn on_unload_v1(self, f: OnUnloadV1Fn) -> Self {
        self.export(symbols::ON_UNLOAD, erase_entry_point!(f, OnUnloadV1Fn))
    }

    pub fn on_unload_v2(self, f: OnUnloadV2Fn) -> Self {
        self.export(symbols::ON_UNLOAD, erase_entry_point!(f, OnUnloadV2Fn))
    }

    pub fn on_trigger_v1(self, f: OnTriggerV1Fn) -> Self {
        self.export(symbols::ON_TRIGGER, erase_entry_point!(f, OnTriggerV1Fn))
    }

    pub fn on_trigger_v2(self, f: OnTriggerV2Fn) -> Self {
        self.export(symbols::ON_TRIGGER, erase_entry_point!(f, OnTriggerV2Fn))
    }

    /// Drop an exported symbol again.
    pub fn without(mut self, symbol: &str) -> Self {
        self.symbols.remove(symbol);
        self
    }
}

impl ModuleBinary for StaticModule {
    fn location(&self) -> &Path {
        &self.location
    }

    fn resolve(&self, symbol: &str) -> Option<RawEntryPoint> {
        self.symbols.get(symbol).copied()
    }
}
