//! Plugin binary for host integration tests
//!
//! Subscribes to `media_add` and `explode`. `media_add` without a media
//! handle reports [`MISSING_MEDIA`]; `explode` panics inside the plugin.

use std::ffi::CStr;

use shiromana_plugin_api::{
    LibraryHandle, MediaPlugin, STATUS_OK, TriggerEvent, TriggerKind, export_media_plugin,
};

pub const MISSING_MEDIA: u32 = 7;
pub const NO_LIBRARY: u32 = 8;

#[derive(Default)]
pub struct TestPlugin {
    added: u64,
}

impl MediaPlugin for TestPlugin {
    const NAME: &'static CStr = c"test_plugin";
    const TRIGGER: &'static CStr = c"media_add,explode";

    fn on_load(&mut self, library: Option<LibraryHandle>) -> u32 {
        if library.is_some() {
            STATUS_OK
        } else {
            NO_LIBRARY
        }
    }

    fn on_trigger(&mut self, event: TriggerEvent<'_>) -> u32 {
        match event.kind() {
            Some(TriggerKind::MediaAdd) if event.media.is_some() => {
                self.added += 1;
                STATUS_OK
            }
            Some(TriggerKind::MediaAdd) => MISSING_MEDIA,
            _ if event.trigger == "explode" => {
                panic!("test_plugin exploded after {} additions", self.added)
            }
            _ => STATUS_OK,
        }
    }
}

export_media_plugin!(TestPlugin);
