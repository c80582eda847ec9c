//! PluginModule - one loaded plugin binary and its lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::{CStr, c_char};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use shiromana_plugin_api::abi::{
    AbiVersionFn, NameFn, OnLoadFn, OnTriggerV1Fn, OnTriggerV2Fn, OnUnloadV1Fn, OnUnloadV2Fn,
    RawEntryPoint, TriggerFn, restore, symbols,
};
use shiromana_plugin_api::handle::media_token;
use shiromana_plugin_api::{AbiGeneration, LibraryHandle, MediaHandle, TriggerSpec};

use super::binary::ModuleBinary;
use super::error::{LoadError, PluginFault};
use super::invoke::{InvokeStatus, guarded, invoke};

/// Host-assigned identity of a loaded module. Increases in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(u64);

impl ModuleId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Lifecycle of a plugin module.
///
/// `Discovered → Loaded → Active → Unloading → Unloaded`, with `Failed`
/// reachable from `Discovered`/`Loaded` on a load error and from `Active`
/// when plugin code faults. `Unloaded` and `Failed` are terminal.
///
/// `Discovered` and `Loaded` only exist inside [`PluginModule::load`] and
/// show up in trace logs. A module the host hands out is `Active` or later;
/// a load that fails never produces a module at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Binary opened, symbols not yet validated
    Discovered,
    /// Symbols and declarations validated, `on_load` not yet successful
    Loaded,
    /// Subscribed and receiving triggers
    Active,
    /// Unsubscribed, `on_unload` in progress
    Unloading,
    /// Binary released after a regular unload
    Unloaded,
    /// Binary released after an error or fault
    Failed,
}

impl ModuleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unloaded | Self::Failed)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discovered => "discovered",
            Self::Loaded => "loaded",
            Self::Active => "active",
            Self::Unloading => "unloading",
            Self::Unloaded => "unloaded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// `on_trigger`, resolved once for the module's generation.
#[derive(Clone, Copy)]
enum TriggerEntry {
    NoArgs(OnTriggerV1Fn),
    WithPayload(OnTriggerV2Fn),
}

/// `on_unload`, resolved once for the module's generation.
#[derive(Clone, Copy)]
enum UnloadEntry {
    NoArgs(OnUnloadV1Fn),
    WithLibrary(OnUnloadV2Fn),
}

#[derive(Clone, Copy)]
struct EntryPoints {
    on_load: OnLoadFn,
    on_unload: UnloadEntry,
    on_trigger: TriggerEntry,
}

/// Typed symbol table, resolved but not yet called.
struct ResolvedSymbols {
    name: NameFn,
    trigger: TriggerFn,
    abi_version: Option<AbiVersionFn>,
    on_load: RawEntryPoint,
    on_unload: RawEntryPoint,
    on_trigger: RawEntryPoint,
}

struct ModuleInner {
    state: ModuleState,
    /// Present until the module reaches a terminal state
    binary: Option<Box<dyn ModuleBinary>>,
}

/// A loaded plugin binary.
///
/// The module exclusively owns its binary. Every call into plugin code runs
/// with the module's lock held, so calls into one module never overlap and
/// never race with the binary being released.
pub struct PluginModule {
    id: ModuleId,
    name: String,
    path: PathBuf,
    generation: AbiGeneration,
    trigger_spec: TriggerSpec,
    loaded_at: DateTime<Utc>,
    notices: Vec<String>,
    entries: EntryPoints,
    inner: Mutex<ModuleInner>,
}

impl PluginModule {
    /// Validate `binary` against the ABI and run `on_load`.
    ///
    /// On success the module is `Active`; subscribing it is up to the
    /// caller. On failure the binary has already been released.
    pub(crate) fn load(
        id: ModuleId,
        binary: Box<dyn ModuleBinary>,
        library: LibraryHandle,
    ) -> Result<Self, LoadError> {
        let path = binary.location().to_path_buf();
        let label = path.display().to_string();
        let mut state = ModuleState::Discovered;

        let resolved = resolve_symbols(binary.as_ref())?;
        let generation = detect_generation(&resolved, &path, &label)?;

        // SAFETY: `binary` stays alive for as long as these pointers are
        // reachable: it moves into the module below and is only dropped
        // after the module leaves `Active`.
        let name = unsafe { read_declaration(resolved.name, symbols::NAME, &path, &label)? };
        if name.is_empty() {
            return Err(LoadError::InvalidString {
                path,
                symbol: symbols::NAME,
                reason: "an empty string",
            });
        }
        let raw_spec =
            unsafe { read_declaration(resolved.trigger, symbols::TRIGGER, &path, &name)? };
        let trigger_spec = TriggerSpec::parse(&raw_spec);

        // SAFETY: the generation decides which signature the symbols carry.
        let entries = unsafe { typed_entries(&resolved, generation) };

        let mut notices = Vec::new();
        if trigger_spec.is_empty() {
            let notice = LoadError::NoTriggers {
                plugin: name.clone(),
            };
            tracing::warn!(plugin = %name, path = %path.display(), "{notice}");
            notices.push(notice.to_string());
        }

        state = advance(&name, state, ModuleState::Loaded);

        let on_load = entries.on_load;
        // SAFETY: signature restored from the ABI table.
        let status = invoke(&name, symbols::ON_LOAD, || unsafe {
            on_load(library.as_raw())
        });
        match status {
            InvokeStatus::Success => {}
            InvokeStatus::Reported { code } => {
                advance(&name, state, ModuleState::Failed);
                drop(binary);
                return Err(LoadError::InitFailed { plugin: name, code });
            }
            InvokeStatus::Fault(fault) => {
                advance(&name, state, ModuleState::Failed);
                drop(binary);
                return Err(LoadError::Fault(fault));
            }
        }

        let state = advance(&name, state, ModuleState::Active);

        Ok(Self {
            id,
            name,
            path,
            generation,
            trigger_spec,
            loaded_at: Utc::now(),
            notices,
            entries,
            inner: Mutex::new(ModuleInner {
                state,
                binary: Some(binary),
            }),
        })
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Value of the plugin's `name()`. Not necessarily unique.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> AbiGeneration {
        self.generation
    }

    pub fn trigger_spec(&self) -> &TriggerSpec {
        &self.trigger_spec
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Non-fatal diagnostics collected while loading.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn state(&self) -> ModuleState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, ModuleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke `on_trigger` for `token`.
    ///
    /// Returns `None` when the module is not `Active`. A fault moves the
    /// module to `Failed`; the caller must unsubscribe it and then
    /// [`release`](Self::release) it.
    pub(crate) fn fire(
        &self,
        library: LibraryHandle,
        media: Option<MediaHandle>,
        token: &CStr,
    ) -> Option<InvokeStatus> {
        let mut inner = self.lock();
        if inner.state != ModuleState::Active || inner.binary.is_none() {
            return None;
        }

        let status = match self.entries.on_trigger {
            // SAFETY: the binary is held by `inner` for the whole call.
            TriggerEntry::NoArgs(on_trigger) => {
                invoke(&self.name, symbols::ON_TRIGGER, || unsafe { on_trigger() })
            }
            TriggerEntry::WithPayload(on_trigger) => {
                invoke(&self.name, symbols::ON_TRIGGER, || unsafe {
                    on_trigger(library.as_raw(), media_token(media), token.as_ptr())
                })
            }
        };

        if status.is_fault() {
            inner.state = advance(&self.name, inner.state, ModuleState::Failed);
        }
        Some(status)
    }

    /// `Active → Unloading`. Returns false, changing nothing, in any other
    /// state.
    pub(crate) fn begin_unload(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != ModuleState::Active {
            return false;
        }
        inner.state = advance(&self.name, inner.state, ModuleState::Unloading);
        true
    }

    /// Call `on_unload` and release the binary. Only meaningful after
    /// [`begin_unload`](Self::begin_unload) returned true.
    pub(crate) fn finish_unload(&self, library: LibraryHandle) -> InvokeStatus {
        let mut inner = self.lock();
        if inner.state != ModuleState::Unloading || inner.binary.is_none() {
            return InvokeStatus::Success;
        }

        let status = match self.entries.on_unload {
            // SAFETY: the binary is held by `inner` for the whole call.
            UnloadEntry::NoArgs(on_unload) => {
                invoke(&self.name, symbols::ON_UNLOAD, || unsafe { on_unload() })
            }
            UnloadEntry::WithLibrary(on_unload) => {
                invoke(&self.name, symbols::ON_UNLOAD, || unsafe {
                    on_unload(library.as_raw())
                })
            }
        };

        let next = match &status {
            InvokeStatus::Success => ModuleState::Unloaded,
            InvokeStatus::Reported { code } => {
                tracing::warn!(plugin = %self.name, code, "Plugin on_unload returned error");
                ModuleState::Unloaded
            }
            InvokeStatus::Fault(fault) => {
                tracing::error!(plugin = %self.name, error = %fault, "Plugin panicked in on_unload");
                ModuleState::Failed
            }
        };
        inner.state = advance(&self.name, inner.state, next);
        inner.binary = None;
        status
    }

    /// Release the binary of a faulted module without calling `on_unload`.
    pub(crate) fn release(&self) {
        let mut inner = self.lock();
        if inner.state == ModuleState::Active {
            inner.state = advance(&self.name, inner.state, ModuleState::Failed);
        }
        inner.binary = None;
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("triggers", &self.trigger_spec.tokens())
            .field("state", &self.state())
            .finish()
    }
}

fn advance(plugin: &str, from: ModuleState, to: ModuleState) -> ModuleState {
    tracing::trace!(plugin, %from, %to, "Plugin state transition");
    to
}

fn resolve_symbols(binary: &dyn ModuleBinary) -> Result<ResolvedSymbols, LoadError> {
    let require = |symbol: &'static str| {
        binary.resolve(symbol).ok_or_else(|| LoadError::MissingSymbol {
            path: binary.location().to_path_buf(),
            symbol,
        })
    };

    let name = require(symbols::NAME)?;
    let trigger = require(symbols::TRIGGER)?;
    let on_load = require(symbols::ON_LOAD)?;
    let on_unload = require(symbols::ON_UNLOAD)?;
    let on_trigger = require(symbols::ON_TRIGGER)?;

    // SAFETY: these three signatures are the same in every generation.
    unsafe {
        Ok(ResolvedSymbols {
            name: restore(name),
            trigger: restore(trigger),
            abi_version: binary
                .resolve(symbols::ABI_VERSION)
                .map(|raw| restore::<AbiVersionFn>(raw)),
            on_load,
            on_unload,
            on_trigger,
        })
    }
}

fn detect_generation(
    resolved: &ResolvedSymbols,
    path: &Path,
    label: &str,
) -> Result<AbiGeneration, LoadError> {
    let Some(abi_version) = resolved.abi_version else {
        return Ok(AbiGeneration::V1);
    };

    // SAFETY: `shiromana_abi_version` has a fixed signature.
    let found = guarded(label, symbols::ABI_VERSION, || unsafe { abi_version() })?;
    AbiGeneration::from_version(found).ok_or_else(|| LoadError::UnsupportedAbi {
        path: path.to_path_buf(),
        found,
    })
}

/// Call `name()` or `trigger()` and copy the result out.
///
/// # Safety
///
/// `f` must come from a binary that is still loaded.
unsafe fn read_declaration(
    f: NameFn,
    symbol: &'static str,
    path: &Path,
    label: &str,
) -> Result<String, LoadError> {
    let ptr: *const c_char = guarded(label, symbol, || unsafe { f() })?;
    let invalid = |reason| LoadError::InvalidString {
        path: path.to_path_buf(),
        symbol,
        reason,
    };

    if ptr.is_null() {
        return Err(invalid("a null pointer"));
    }
    // SAFETY: the ABI requires a NUL-terminated string that stays valid
    // while the binary is loaded.
    let text = unsafe { CStr::from_ptr(ptr) };
    text.to_str()
        .map(str::to_string)
        .map_err(|_| invalid("text that is not UTF-8"))
}

/// # Safety
///
/// `generation` must match the signatures the binary actually exports.
unsafe fn typed_entries(resolved: &ResolvedSymbols, generation: AbiGeneration) -> EntryPoints {
    unsafe {
        let on_load = restore::<OnLoadFn>(resolved.on_load);
        match generation {
            AbiGeneration::V1 => EntryPoints {
                on_load,
                on_unload: UnloadEntry::NoArgs(restore(resolved.on_unload)),
                on_trigger: TriggerEntry::NoArgs(restore(resolved.on_trigger)),
            },
            AbiGeneration::V2 => EntryPoints {
                on_load,
                on_unload: UnloadEntry::WithLibrary(restore(resolved.on_unload)),
                on_trigger: TriggerEntry::WithPayload(restore(resolved.on_trigger)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::binary::StaticModule;
    use crate::plugins::testing::{self, LIBRARY};
    use std::sync::atomic::{AtomicU32, Ordering};

    static V2_FIRED: AtomicU32 = AtomicU32::new(0);
    static V2_LAST_MEDIA: AtomicU32 = AtomicU32::new(0);

    extern "C-unwind" fn v2_name() -> *const c_char {
        c"tagger".as_ptr()
    }

    extern "C-unwind" fn v2_trigger() -> *const c_char {
        c" media_add , media_remove ".as_ptr()
    }

    extern "C-unwind" fn v2_fire(
        _library: *mut shiromana_plugin_api::abi::Library,
        media: *mut shiromana_plugin_api::abi::Media,
        _trigger: *const c_char,
    ) -> u32 {
        V2_FIRED.fetch_add(1, Ordering::SeqCst);
        V2_LAST_MEDIA.store(media.addr() as u32, Ordering::SeqCst);
        0
    }

    extern "C-unwind" fn contained_panic_v2(
        _library: *mut shiromana_plugin_api::abi::Library,
        _media: *mut shiromana_plugin_api::abi::Media,
        _trigger: *const c_char,
    ) -> u32 {
        shiromana_plugin_api::contain_panic(|| panic!("tag store corrupted"))
    }

    extern "C-unwind" fn contained_panic_load(
        _library: *mut shiromana_plugin_api::abi::Library,
    ) -> u32 {
        shiromana_plugin_api::contain_panic(|| panic!("config missing"))
    }

    extern "C-unwind" fn contained_panic_unload(
        _library: *mut shiromana_plugin_api::abi::Library,
    ) -> u32 {
        shiromana_plugin_api::STATUS_PANICKED
    }

    extern "C-unwind" fn null_name() -> *const c_char {
        std::ptr::null()
    }

    extern "C-unwind" fn empty_name() -> *const c_char {
        c"".as_ptr()
    }

    extern "C-unwind" fn version_nine() -> u32 {
        9
    }

    extern "C-unwind" fn panicking_name() -> *const c_char {
        panic!("name exploded")
    }

    fn tagger() -> StaticModule {
        StaticModule::new("builtin://tagger")
            .generation(AbiGeneration::V2)
            .name(v2_name)
            .trigger(v2_trigger)
            .on_load(testing::load_ok)
            .on_unload_v2(testing::unload_v2_ok)
            .on_trigger_v2(v2_fire)
    }

    #[test]
    fn test_load_v2_module() {
        let module = PluginModule::load(ModuleId::new(1), Box::new(tagger()), LIBRARY).unwrap();
        assert_eq!(module.name(), "tagger");
        assert_eq!(module.generation(), AbiGeneration::V2);
        assert_eq!(module.trigger_spec().tokens(), ["media_add", "media_remove"]);
        assert_eq!(module.state(), ModuleState::Active);
        assert!(module.notices().is_empty());
    }

    #[test]
    fn test_fire_v2_passes_media() {
        let module = PluginModule::load(ModuleId::new(1), Box::new(tagger()), LIBRARY).unwrap();
        let media = MediaHandle::new(41);
        let status = module.fire(LIBRARY, media, c"media_add").unwrap();
        assert_eq!(status, InvokeStatus::Success);
        assert!(V2_FIRED.load(Ordering::SeqCst) >= 1);
        assert_eq!(V2_LAST_MEDIA.load(Ordering::SeqCst), 41);
    }

    #[test]
    fn test_without_version_symbol_is_v1() {
        let module =
            PluginModule::load(ModuleId::new(1), Box::new(testing::v1_module("legacy")), LIBRARY)
                .unwrap();
        assert_eq!(module.generation(), AbiGeneration::V1);
    }

    #[test]
    fn test_missing_on_trigger() {
        let binary = tagger().without(symbols::ON_TRIGGER);
        let err = PluginModule::load(ModuleId::new(1), Box::new(binary), LIBRARY).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingSymbol {
                symbol: "on_trigger",
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_abi_version() {
        let binary = tagger().abi_version(version_nine);
        let err = PluginModule::load(ModuleId::new(1), Box::new(binary), LIBRARY).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedAbi { found: 9, .. }));
    }

    #[test]
    fn test_null_and_empty_names_are_rejected() {
        for name in [null_name as NameFn, empty_name as NameFn] {
            let binary = tagger().name(name);
            let err = PluginModule::load(ModuleId::new(1), Box::new(binary), LIBRARY).unwrap_err();
            assert!(matches!(err, LoadError::InvalidString { symbol: "name", .. }));
        }
    }

    #[test]
    fn test_panicking_name_is_a_fault() {
        let binary = tagger().name(panicking_name);
        let err = PluginModule::load(ModuleId::new(1), Box::new(binary), LIBRARY).unwrap_err();
        match err {
            LoadError::Fault(fault) => {
                assert_eq!(fault.entry_point, "name");
                assert_eq!(fault.plugin, "builtin://tagger");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_on_load_failure() {
        let binary = tagger().on_load(testing::load_fails);
        let err = PluginModule::load(ModuleId::new(1), Box::new(binary), LIBRARY).unwrap_err();
        assert!(matches!(err, LoadError::InitFailed { code: 13, .. }));
    }

    #[test]
    fn test_unload_transitions() {
        let module = PluginModule::load(ModuleId::new(1), Box::new(tagger()), LIBRARY).unwrap();
        assert!(module.begin_unload());
        assert_eq!(module.state(), ModuleState::Unloading);
        assert!(module.fire(LIBRARY, None, c"media_add").is_none());

        assert_eq!(module.finish_unload(LIBRARY), InvokeStatus::Success);
        assert_eq!(module.state(), ModuleState::Unloaded);
        assert!(!module.begin_unload());
    }

    #[test]
    fn test_release_marks_failed() {
        let module = PluginModule::load(ModuleId::new(1), Box::new(tagger()), LIBRARY).unwrap();
        module.release();
        assert_eq!(module.state(), ModuleState::Failed);
        assert!(module.fire(LIBRARY, None, c"media_add").is_none());
    }

    #[test]
    fn test_contained_trigger_panic_fails_module() {
        let binary = tagger().on_trigger_v2(contained_panic_v2);
        let module = PluginModule::load(ModuleId::new(1), Box::new(binary), LIBRARY).unwrap();

        let status = module.fire(LIBRARY, None, c"media_add").unwrap();
        assert!(status.is_fault());
        assert_eq!(module.state(), ModuleState::Failed);
        assert!(module.fire(LIBRARY, None, c"media_add").is_none());
    }

    #[test]
    fn test_contained_on_load_panic_is_a_fault() {
        let binary = tagger().on_load(contained_panic_load);
        let err = PluginModule::load(ModuleId::new(1), Box::new(binary), LIBRARY).unwrap_err();
        match err {
            LoadError::Fault(fault) => assert_eq!(fault.entry_point, "on_load"),
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_contained_on_unload_panic_fails_module() {
        let binary = tagger().on_unload_v2(contained_panic_unload);
        let module = PluginModule::load(ModuleId::new(1), Box::new(binary), LIBRARY).unwrap();
        assert!(module.begin_unload());
        assert!(module.finish_unload(LIBRARY).is_fault());
        assert_eq!(module.state(), ModuleState::Failed);
    }

    #[test]
    fn test_state_terminal() {
        assert!(ModuleState::Unloaded.is_terminal());
        assert!(ModuleState::Failed.is_terminal());
        assert!(!ModuleState::Active.is_terminal());
        assert_eq!(ModuleState::Unloading.to_string(), "unloading");
    }
}
