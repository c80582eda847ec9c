//! Event dispatch - routing domain events to subscribed modules

use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use shiromana_plugin_api::{LibraryHandle, MediaHandle, TriggerKind};

use super::invoke::InvokeStatus;
use super::module::{ModuleId, PluginModule};
use super::registry::TriggerRegistry;

/// Something that happened in the catalog and may interest plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    kind: String,
    library: LibraryHandle,
    media: Option<MediaHandle>,
}

impl DomainEvent {
    /// Event for an arbitrary trigger token.
    pub fn new(kind: impl Into<String>, library: LibraryHandle) -> Self {
        Self {
            kind: kind.into(),
            library,
            media: None,
        }
    }

    /// Event for one of the library's own trigger kinds.
    pub fn of(kind: TriggerKind, library: LibraryHandle, media: Option<MediaHandle>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            library,
            media,
        }
    }

    pub fn with_media(mut self, media: MediaHandle) -> Self {
        self.media = Some(media);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The token as a known kind, if it is one.
    pub fn known_kind(&self) -> Option<TriggerKind> {
        self.kind.parse().ok()
    }

    pub fn library(&self) -> LibraryHandle {
        self.library
    }

    pub fn media(&self) -> Option<MediaHandle> {
        self.media
    }
}

/// Result of invoking one module for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub module: ModuleId,
    /// The module's declared name
    pub plugin: String,
    #[serde(flatten)]
    pub status: InvokeStatus,
}

/// Receives the per-module results of every dispatch.
pub trait DispatchSink: Send + Sync {
    fn record(&self, event: &DomainEvent, records: &[DispatchRecord]);
}

/// Logs dispatch results through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DispatchSink for TracingSink {
    fn record(&self, event: &DomainEvent, records: &[DispatchRecord]) {
        for record in records {
            match &record.status {
                InvokeStatus::Success => {
                    tracing::debug!(
                        plugin = %record.plugin,
                        module = %record.module,
                        trigger = %event.kind(),
                        "Plugin handled trigger"
                    );
                }
                InvokeStatus::Reported { code } => {
                    tracing::warn!(
                        plugin = %record.plugin,
                        module = %record.module,
                        trigger = %event.kind(),
                        code,
                        "Plugin reported failure"
                    );
                }
                InvokeStatus::Fault(fault) => {
                    tracing::error!(
                        plugin = %record.plugin,
                        module = %record.module,
                        trigger = %event.kind(),
                        error = %fault,
                        "Plugin faulted"
                    );
                }
            }
        }
    }
}

/// Writes one JSON object per dispatch record.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    trigger: &'a str,
    library: LibraryHandle,
    media: Option<MediaHandle>,
    #[serde(flatten)]
    record: &'a DispatchRecord,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> DispatchSink for JsonLinesSink<W> {
    fn record(&self, event: &DomainEvent, records: &[DispatchRecord]) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            let line = JsonLine {
                trigger: event.kind(),
                library: event.library(),
                media: event.media(),
                record,
            };
            let result = serde_json::to_writer(&mut *writer, &line)
                .map_err(std::io::Error::from)
                .and_then(|()| writer.write_all(b"\n"));
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to write dispatch record");
                return;
            }
        }
        if let Err(e) = writer.flush() {
            tracing::warn!(error = %e, "Failed to flush dispatch records");
        }
    }
}

/// Invoke every module subscribed to `event.kind()`, in subscription order.
///
/// Never stops early: a reported failure or a fault in one module does not
/// keep later subscribers from running. A faulting module is unsubscribed
/// and its binary released before the next subscriber is called.
pub(crate) fn dispatch_event(
    registry: &mut TriggerRegistry,
    event: &DomainEvent,
) -> Vec<DispatchRecord> {
    let subscribers = registry.lookup(event.kind());
    if subscribers.is_empty() {
        return Vec::new();
    }
    let Ok(token) = CString::new(event.kind()) else {
        return Vec::new();
    };

    subscribers
        .iter()
        .filter_map(|module| deliver(registry, module, event, &token))
        .collect()
}

/// Invoke a single module. `None` if it was not `Active`.
pub(crate) fn deliver(
    registry: &mut TriggerRegistry,
    module: &Arc<PluginModule>,
    event: &DomainEvent,
    token: &std::ffi::CStr,
) -> Option<DispatchRecord> {
    let status = module.fire(event.library(), event.media(), token)?;

    if let InvokeStatus::Fault(fault) = &status {
        tracing::error!(plugin = %module.name(), error = %fault, "Plugin panicked, disabling");
        registry.unsubscribe_all(module.id());
        module.release();
    }

    Some(DispatchRecord {
        module: module.id(),
        plugin: module.name().to_string(),
        status,
    })
}
