//! Media Logger - A simple example plugin for shiromana
//!
//! This plugin demonstrates:
//! - Basic plugin structure with the `export_media_plugin!` macro
//! - Implementing the `MediaPlugin` trait
//! - Subscribing to several trigger tokens and telling them apart
//! - Keeping state between triggers
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! mkdir -p ~/.config/shiromana/plugins
//! cp target/release/libmedia_logger.so ~/.config/shiromana/plugins/
//! ```

use std::ffi::CStr;

use shiromana_plugin_api::{
    LibraryHandle, MediaPlugin, STATUS_OK, TriggerEvent, TriggerKind, export_media_plugin,
};

/// Status returned when a media trigger arrives without a media handle.
const MISSING_MEDIA: u32 = 1;

/// Logs every media change and counts them per kind.
#[derive(Default)]
pub struct MediaLogger {
    library: Option<LibraryHandle>,
    added: u64,
    removed: u64,
    modified: u64,
}

impl MediaPlugin for MediaLogger {
    const NAME: &'static CStr = c"media_logger";
    const TRIGGER: &'static CStr = c"media_add,media_remove,media_modify";

    fn on_load(&mut self, library: Option<LibraryHandle>) -> u32 {
        self.library = library;
        eprintln!("[media_logger] loaded for {library:?}");
        STATUS_OK
    }

    fn on_unload(&mut self, _library: Option<LibraryHandle>) -> u32 {
        eprintln!(
            "[media_logger] unloading: {} added, {} removed, {} modified",
            self.added, self.removed, self.modified
        );
        STATUS_OK
    }

    fn on_trigger(&mut self, event: TriggerEvent<'_>) -> u32 {
        let Some(media) = event.media else {
            return MISSING_MEDIA;
        };

        match event.kind() {
            Some(TriggerKind::MediaAdd) => self.added += 1,
            Some(TriggerKind::MediaRemove) => self.removed += 1,
            Some(TriggerKind::MediaModify) => self.modified += 1,
            _ => {}
        }
        eprintln!("[media_logger] {} {media}", event.trigger);
        STATUS_OK
    }
}

export_media_plugin!(MediaLogger);
