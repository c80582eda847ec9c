//! In-process fixture plugins for unit tests

use std::ffi::c_char;

use shiromana_plugin_api::abi::{Library, Media};
use shiromana_plugin_api::{AbiGeneration, LibraryHandle};

use super::binary::StaticModule;

pub(crate) const LIBRARY: LibraryHandle = match LibraryHandle::new(1) {
    Some(handle) => handle,
    None => panic!("library handle must be non-zero"),
};

extern "C-unwind" fn fixture_name() -> *const c_char {
    c"fixture".as_ptr()
}

extern "C-unwind" fn fixture_media_trigger() -> *const c_char {
    c"media_add".as_ptr()
}

extern "C-unwind" fn fixture_v1_name() -> *const c_char {
    c"fixture_v1".as_ptr()
}

extern "C-unwind" fn fixture_v1_trigger() -> *const c_char {
    c"on_load".as_ptr()
}

pub(crate) extern "C-unwind" fn load_ok(_library: *mut Library) -> u32 {
    0
}

pub(crate) extern "C-unwind" fn load_fails(_library: *mut Library) -> u32 {
    13
}

pub(crate) extern "C-unwind" fn unload_v1_ok() -> u32 {
    0
}

pub(crate) extern "C-unwind" fn unload_v2_ok(_library: *mut Library) -> u32 {
    0
}

pub(crate) extern "C-unwind" fn fire_v1_ok() -> u32 {
    0
}

pub(crate) extern "C-unwind" fn fire_v2_ok(
    _library: *mut Library,
    _media: *mut Media,
    _trigger: *const c_char,
) -> u32 {
    0
}

pub(crate) extern "C-unwind" fn fire_v2_panics(
    _library: *mut Library,
    _media: *mut Media,
    _trigger: *const c_char,
) -> u32 {
    panic!("fixture fault")
}

/// V1 module named `fixture_v1`, subscribed to `on_load`.
pub(crate) fn v1_module(location: &str) -> StaticModule {
    StaticModule::new(location)
        .name(fixture_v1_name)
        .trigger(fixture_v1_trigger)
        .on_load(load_ok)
        .on_unload_v1(unload_v1_ok)
        .on_trigger_v1(fire_v1_ok)
}

/// V2 module named `fixture`, subscribed to `media_add`.
pub(crate) fn v2_module(location: &str) -> StaticModule {
    StaticModule::new(location)
        .generation(AbiGeneration::V2)
        .name(fixture_name)
        .trigger(fixture_media_trigger)
        .on_load(load_ok)
        .on_unload_v2(unload_v2_ok)
        .on_trigger_v2(fire_v2_ok)
}
