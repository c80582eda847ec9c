//! Fault-isolated calls into plugin code

use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use shiromana_plugin_api::{STATUS_OK, STATUS_PANICKED};

use super::error::PluginFault;

/// Outcome of one entry-point call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvokeStatus {
    /// Returned 0
    Success,
    /// Returned a non-zero, plugin-defined code
    Reported { code: u32 },
    /// Panicked, in the host's frame or contained inside the plugin;
    /// the module is no longer trusted
    Fault(PluginFault),
}

impl InvokeStatus {
    pub fn from_code(code: u32) -> Self {
        if code == STATUS_OK {
            Self::Success
        } else {
            Self::Reported { code }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Raw status code, if the call returned at all.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Success => Some(STATUS_OK),
            Self::Reported { code } => Some(*code),
            Self::Fault(_) => None,
        }
    }
}

impl From<Result<u32, PluginFault>> for InvokeStatus {
    fn from(result: Result<u32, PluginFault>) -> Self {
        match result {
            Ok(code) => Self::from_code(code),
            Err(fault) => Self::Fault(fault),
        }
    }
}

/// Run `call` and turn an unwinding panic into a [`PluginFault`].
pub(crate) fn guarded<R>(
    plugin: &str,
    entry_point: &'static str,
    call: impl FnOnce() -> R,
) -> Result<R, PluginFault> {
    std::panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| PluginFault {
        plugin: plugin.to_string(),
        entry_point,
        message: panic_message(payload.as_ref()),
    })
}

/// Call a status-returning entry point.
///
/// A panic caught here and a panic the plugin contained itself, reported as
/// [`STATUS_PANICKED`], both come back as [`InvokeStatus::Fault`].
pub(crate) fn invoke(
    plugin: &str,
    entry_point: &'static str,
    call: impl FnOnce() -> u32,
) -> InvokeStatus {
    match guarded(plugin, entry_point, call) {
        Ok(STATUS_PANICKED) => InvokeStatus::Fault(PluginFault {
            plugin: plugin.to_string(),
            entry_point,
            message: "panicked inside the plugin binary".to_string(),
        }),
        result => result.into(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
