//! PluginHost - manages plugin lifecycle and event dispatch

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shiromana_plugin_api::{AbiGeneration, LibraryHandle, ON_LOAD, TriggerKind};

use super::binary::{ModuleBinary, SharedLibrary};
use super::config::PluginHostConfig;
use super::discovery::{DirectoryScanner, Discovery};
use super::dispatch::{
    DispatchRecord, DispatchSink, DomainEvent, TracingSink, deliver, dispatch_event,
};
use super::error::{LoadError, PluginHostError};
use super::invoke::InvokeStatus;
use super::module::{ModuleId, ModuleState, PluginModule};
use super::registry::TriggerRegistry;
use crate::catalog::Catalog;

const ON_LOAD_TOKEN: &CStr = c"on_load";

/// Snapshot of one module, for listing and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub id: ModuleId,
    /// Declared plugin name
    pub name: String,
    pub path: PathBuf,
    pub generation: AbiGeneration,
    /// Parsed trigger tokens, in declaration order
    pub triggers: Vec<String>,
    pub state: ModuleState,
    pub loaded_at: DateTime<Utc>,
    /// Non-fatal load diagnostics
    pub notices: Vec<String>,
}

impl ModuleInfo {
    fn of(module: &PluginModule) -> Self {
        Self {
            id: module.id(),
            name: module.name().to_string(),
            path: module.path().to_path_buf(),
            generation: module.generation(),
            triggers: module.trigger_spec().tokens().to_vec(),
            state: module.state(),
            loaded_at: module.loaded_at(),
            notices: module.notices().to_vec(),
        }
    }
}

/// Outcome of [`PluginHost::load_all`]
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Modules that reached `Active`, in load order
    pub loaded: Vec<ModuleId>,
    /// Binaries that failed to load, with the reason
    pub failed: Vec<(PathBuf, LoadError)>,
    /// Binaries passed over because of the `skip` list
    pub skipped: Vec<PathBuf>,
}

struct HostState {
    /// Every module ever activated, in load order. Owns the only strong
    /// references.
    modules: Vec<Arc<PluginModule>>,
    registry: TriggerRegistry,
    next_id: u64,
}

/// The plugin host manages loading, unloading, and dispatching events to plugins
///
/// `load`, `unload` and `dispatch` are serialized by one host lock. Plugin
/// code must not call back into the host from an entry point: the call
/// would wait on that lock forever.
pub struct PluginHost {
    config: PluginHostConfig,
    catalog: Arc<dyn Catalog>,
    discovery: Box<dyn Discovery>,
    sink: Arc<dyn DispatchSink>,
    state: Mutex<HostState>,
}

impl PluginHost {
    /// Create a new plugin host bound to `catalog`'s library
    pub fn new(config: PluginHostConfig, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            config,
            catalog,
            discovery: Box::new(DirectoryScanner::default()),
            sink: Arc::new(TracingSink),
            state: Mutex::new(HostState {
                modules: Vec::new(),
                registry: TriggerRegistry::new(),
                next_id: 1,
            }),
        }
    }

    /// Replace the directory scanner used by `load_all`
    pub fn with_discovery(mut self, discovery: impl Discovery + 'static) -> Self {
        self.discovery = Box::new(discovery);
        self
    }

    /// Replace where dispatch results are reported
    pub fn with_sink(mut self, sink: Arc<dyn DispatchSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &PluginHostConfig {
        &self.config
    }

    /// The library handle passed to plugins.
    pub fn library(&self) -> LibraryHandle {
        self.catalog.library()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discover and load every plugin binary in the configured directories
    ///
    /// A binary that fails to load is recorded and skipped; it never stops
    /// the rest from loading.
    pub fn load_all(&self) -> LoadSummary {
        let mut summary = LoadSummary::default();

        for dir in &self.config.plugin_dirs {
            let paths = match self.discovery.discover(dir) {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::error!(dir = %dir.display(), error = %e, "Failed to scan plugin directory");
                    continue;
                }
            };

            for path in paths {
                if self.config.is_skipped(&path) {
                    tracing::debug!(path = %path.display(), "Plugin skipped by config");
                    summary.skipped.push(path);
                    continue;
                }

                match self.load_path(&path) {
                    Ok(id) => summary.loaded.push(id),
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "Failed to load plugin");
                        summary.failed.push((path, e));
                    }
                }
            }
        }

        tracing::info!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "Plugin discovery finished"
        );
        summary
    }

    /// Load the shared library at `path`
    ///
    /// Load failures come back as [`PluginHostError::Load`].
    pub fn load(&self, path: &Path) -> Result<ModuleId, PluginHostError> {
        Ok(self.load_path(path)?)
    }

    /// Load an already opened binary and subscribe it to its triggers
    pub fn load_binary(&self, binary: Box<dyn ModuleBinary>) -> Result<ModuleId, PluginHostError> {
        Ok(self.activate(binary)?)
    }

    fn load_path(&self, path: &Path) -> Result<ModuleId, LoadError> {
        let binary = SharedLibrary::open(path)?;
        self.activate(Box::new(binary))
    }

    fn activate(&self, binary: Box<dyn ModuleBinary>) -> Result<ModuleId, LoadError> {
        let library = self.library();
        let mut state = self.lock();

        let id = ModuleId::new(state.next_id);
        let module = Arc::new(PluginModule::load(id, binary, library)?);
        state.next_id += 1;
        state.modules.push(Arc::clone(&module));

        let state = &mut *state;
        for token in module.trigger_spec().tokens() {
            state.registry.subscribe(&module, token);
        }

        tracing::info!(
            plugin = %module.name(),
            module = %id,
            generation = %module.generation(),
            triggers = %module.trigger_spec(),
            "Plugin loaded"
        );

        if module.trigger_spec().contains(ON_LOAD) {
            let event = DomainEvent::of(TriggerKind::OnLoad, library, None);
            let record = deliver(&mut state.registry, &module, &event, ON_LOAD_TOKEN);
            if let Some(record) = record {
                self.sink.record(&event, std::slice::from_ref(&record));
            }
        }

        Ok(id)
    }

    /// Unsubscribe a module, call its `on_unload` and release its binary
    ///
    /// Returns `None` when the module was not active, in which case nothing
    /// happens.
    pub fn unload(&self, id: ModuleId) -> Result<Option<InvokeStatus>, PluginHostError> {
        let library = self.library();
        let mut state = self.lock();

        let module = state
            .modules
            .iter()
            .find(|m| m.id() == id)
            .cloned()
            .ok_or(PluginHostError::NotFound { id })?;

        Ok(unload_module(&mut state.registry, &module, library))
    }

    /// Deliver `event` to every subscribed module, in load order
    ///
    /// Validation failures invoke nobody. Otherwise every subscriber runs,
    /// whatever the earlier ones returned.
    ///
    /// The media check runs under the host lock, so no load or unload slips
    /// in between validation and delivery. The catalog is not covered by
    /// that lock: media removed concurrently can go stale while plugins are
    /// still running, and plugins must treat the handle as possibly dead.
    pub fn dispatch(&self, event: &DomainEvent) -> Result<Vec<DispatchRecord>, PluginHostError> {
        let records = {
            let mut state = self.lock();
            self.validate(event)?;
            dispatch_event(&mut state.registry, event)
        };

        if !records.is_empty() {
            self.sink.record(event, &records);
        }
        Ok(records)
    }

    fn validate(&self, event: &DomainEvent) -> Result<(), PluginHostError> {
        let expected = self.library();
        if event.library() != expected {
            return Err(PluginHostError::ForeignLibrary {
                expected,
                found: event.library(),
            });
        }

        match event.media() {
            Some(media) if !self.catalog.contains_media(media) => {
                Err(PluginHostError::StaleMedia { media })
            }
            None if event.known_kind().is_some_and(TriggerKind::requires_media) => {
                Err(PluginHostError::MissingMedia {
                    kind: event.kind().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Unload every active module, most recently loaded first
    pub fn shutdown(&self) -> Vec<(ModuleId, InvokeStatus)> {
        let library = self.library();
        let mut state = self.lock();
        let state = &mut *state;

        let mut results = Vec::new();
        for module in state.modules.iter().rev() {
            if let Some(status) = unload_module(&mut state.registry, module, library) {
                results.push((module.id(), status));
            }
        }

        if !results.is_empty() {
            tracing::info!(count = results.len(), "Plugins shut down");
        }
        results
    }

    /// Every module this host loaded, in load order
    pub fn list_modules(&self) -> Vec<ModuleInfo> {
        self.lock()
            .modules
            .iter()
            .map(|m| ModuleInfo::of(m))
            .collect()
    }

    pub fn module_info(&self, id: ModuleId) -> Option<ModuleInfo> {
        self.lock()
            .modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| ModuleInfo::of(m))
    }

    /// Number of modules currently receiving triggers
    pub fn active_count(&self) -> usize {
        self.lock()
            .modules
            .iter()
            .filter(|m| m.state() == ModuleState::Active)
            .count()
    }

    /// Names of the modules subscribed to `token`, in dispatch order
    pub fn lookup(&self, token: &str) -> Vec<String> {
        self.lock()
            .registry
            .lookup(token)
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unload_module(
    registry: &mut TriggerRegistry,
    module: &PluginModule,
    library: LibraryHandle,
) -> Option<InvokeStatus> {
    if !module.begin_unload() {
        tracing::debug!(plugin = %module.name(), state = %module.state(), "Plugin not active, nothing to unload");
        return None;
    }

    registry.unsubscribe_all(module.id());
    let status = module.finish_unload(library);
    tracing::info!(plugin = %module.name(), module = %module.id(), "Plugin unloaded");
    Some(status)
}
