//! Fake in-process plugins for host integration tests
//!
//! Each `v2_plugin!` / `v1_plugin!` invocation expands to a module with its
//! own counters, so tests running in parallel never share plugin state.

#![allow(dead_code, unused_macros)]

use std::sync::Arc;

use shiromana_core::catalog::MemoryCatalog;
use shiromana_core::plugins::{PluginHost, PluginHostConfig};
use shiromana_plugin_api::LibraryHandle;

pub const LIBRARY: LibraryHandle = match LibraryHandle::new(1) {
    Some(handle) => handle,
    None => panic!("library handle must be non-zero"),
};

/// One `on_trigger` call as a fake plugin saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub library: u64,
    pub media: Option<u64>,
    pub trigger: String,
}

/// Host bound to an empty in-memory catalog, scanning nothing on disk.
pub fn host() -> (PluginHost, Arc<MemoryCatalog>) {
    let catalog = Arc::new(MemoryCatalog::new(LIBRARY));
    let host = PluginHost::new(
        PluginHostConfig::with_dir("/nonexistent/shiromana/plugins"),
        catalog.clone(),
    );
    (host, catalog)
}

/// Define a V2 fake plugin module.
///
/// `on_trigger` records every call and returns whatever `STATUS` holds, or
/// panics while `PANIC` is set.
macro_rules! v2_plugin {
    ($module:ident, $name:literal, $trigger:literal) => {
        #[allow(dead_code)]
        mod $module {
            use std::ffi::{CStr, c_char};
            use std::sync::Mutex;
            use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

            use shiromana_core::plugins::StaticModule;
            use shiromana_plugin_api::AbiGeneration;
            use shiromana_plugin_api::abi::{Library, Media};

            use crate::common::Call;

            pub static LOADS: AtomicU32 = AtomicU32::new(0);
            pub static UNLOADS: AtomicU32 = AtomicU32::new(0);
            pub static LOAD_STATUS: AtomicU32 = AtomicU32::new(0);
            pub static STATUS: AtomicU32 = AtomicU32::new(0);
            pub static PANIC: AtomicBool = AtomicBool::new(false);
            static CALLS: Mutex<Vec<Call>> = Mutex::new(Vec::new());

            extern "C-unwind" fn name() -> *const c_char {
                $name.as_ptr()
            }

            extern "C-unwind" fn trigger() -> *const c_char {
                $trigger.as_ptr()
            }

            extern "C-unwind" fn on_load(_library: *mut Library) -> u32 {
                LOADS.fetch_add(1, Ordering::SeqCst);
                LOAD_STATUS.load(Ordering::SeqCst)
            }

            extern "C-unwind" fn on_unload(_library: *mut Library) -> u32 {
                UNLOADS.fetch_add(1, Ordering::SeqCst);
                0
            }

            extern "C-unwind" fn on_trigger(
                library: *mut Library,
                media: *mut Media,
                trigger: *const c_char,
            ) -> u32 {
                if PANIC.load(Ordering::SeqCst) {
                    panic!("{} blew up", stringify!($module));
                }
                let trigger = unsafe { CStr::from_ptr(trigger) };
                CALLS.lock().unwrap().push(Call {
                    library: library.addr() as u64,
                    media: (!media.is_null()).then(|| media.addr() as u64),
                    trigger: trigger.to_string_lossy().into_owned(),
                });
                STATUS.load(Ordering::SeqCst)
            }

            pub fn calls() -> Vec<Call> {
                CALLS.lock().unwrap().clone()
            }

            pub fn binary() -> StaticModule {
                StaticModule::new(concat!("builtin://", stringify!($module)))
                    .generation(AbiGeneration::V2)
                    .name(name)
                    .trigger(trigger)
                    .on_load(on_load)
                    .on_unload_v2(on_unload)
                    .on_trigger_v2(on_trigger)
            }
        }
    };
}

/// Define a V1 fake plugin module: no version export, zero-argument
/// `on_unload` and `on_trigger`.
macro_rules! v1_plugin {
    ($module:ident, $name:literal, $trigger:literal) => {
        #[allow(dead_code)]
        mod $module {
            use std::ffi::c_char;
            use std::sync::atomic::{AtomicU32, Ordering};

            use shiromana_core::plugins::StaticModule;
            use shiromana_plugin_api::abi::Library;

            pub static LOADS: AtomicU32 = AtomicU32::new(0);
            pub static UNLOADS: AtomicU32 = AtomicU32::new(0);
            pub static FIRED: AtomicU32 = AtomicU32::new(0);

            extern "C-unwind" fn name() -> *const c_char {
                $name.as_ptr()
            }

            extern "C-unwind" fn trigger() -> *const c_char {
                $trigger.as_ptr()
            }

            extern "C-unwind" fn on_load(_library: *mut Library) -> u32 {
                LOADS.fetch_add(1, Ordering::SeqCst);
                0
            }

            extern "C-unwind" fn on_unload() -> u32 {
                UNLOADS.fetch_add(1, Ordering::SeqCst);
                0
            }

            extern "C-unwind" fn on_trigger() -> u32 {
                FIRED.fetch_add(1, Ordering::SeqCst);
                0
            }

            pub fn binary() -> StaticModule {
                StaticModule::new(concat!("builtin://", stringify!($module)))
                    .name(name)
                    .trigger(trigger)
                    .on_load(on_load)
                    .on_unload_v1(on_unload)
                    .on_trigger_v1(on_trigger)
            }
        }
    };
}
