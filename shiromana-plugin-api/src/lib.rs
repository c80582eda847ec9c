//! shiromana-plugin-api - ABI contract for shiromana media library plugins
//!
//! This crate describes the symbols a plugin binary exports and the types
//! that cross the boundary. Plugins may be written in C against the headers
//! in `include/`, or in Rust by implementing [`MediaPlugin`] and invoking
//! [`export_media_plugin!`].
//!
//! # Example
//!
//! ```ignore
//! use std::ffi::CStr;
//! use shiromana_plugin_api::{export_media_plugin, LibraryHandle, MediaPlugin, TriggerEvent, STATUS_OK};
//!
//! #[derive(Default)]
//! pub struct Thumbnailer {
//!     seen: u64,
//! }
//!
//! impl MediaPlugin for Thumbnailer {
//!     const NAME: &'static CStr = c"thumbnailer";
//!     const TRIGGER: &'static CStr = c"media_add,media_modify";
//!
//!     fn on_load(&mut self, _library: Option<LibraryHandle>) -> u32 {
//!         STATUS_OK
//!     }
//!
//!     fn on_trigger(&mut self, event: TriggerEvent<'_>) -> u32 {
//!         self.seen += 1;
//!         STATUS_OK
//!     }
//! }
//!
//! export_media_plugin!(Thumbnailer);
//! ```

pub mod abi;
pub mod handle;
pub mod trigger;

use std::ffi::CStr;

pub use abi::{AbiGeneration, STATUS_OK, STATUS_PANICKED};
pub use handle::{LibraryHandle, MediaHandle};
pub use trigger::{ON_LOAD, TriggerKind, TriggerSpec, UnknownTrigger};

/// What a V2 plugin sees when one of its triggers fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent<'a> {
    pub library: Option<LibraryHandle>,
    /// `None` for events that are not about a single media entity.
    pub media: Option<MediaHandle>,
    /// The exact token that fired; useful when subscribed to several.
    pub trigger: &'a str,
}

impl TriggerEvent<'_> {
    /// The token as a known kind, if it is one.
    pub fn kind(&self) -> Option<TriggerKind> {
        self.trigger.parse().ok()
    }
}

/// Rust-side plugin definition. Implement this and pass the type to
/// [`export_media_plugin!`] to get a V2 plugin binary.
///
/// One instance lives per process; it is created on first use and dropped
/// after `on_unload`, so a reload starts from `Default` again.
pub trait MediaPlugin: Default + Send + 'static {
    /// Value returned from the exported `name()`.
    const NAME: &'static CStr;

    /// Value returned from the exported `trigger()`: comma-separated tokens.
    const TRIGGER: &'static CStr;

    /// Called once after the host resolved every symbol.
    fn on_load(&mut self, library: Option<LibraryHandle>) -> u32;

    /// Called before the host releases the binary. The return value is
    /// advisory.
    fn on_unload(&mut self, _library: Option<LibraryHandle>) -> u32 {
        STATUS_OK
    }

    /// Called for every subscribed token that fires.
    fn on_trigger(&mut self, event: TriggerEvent<'_>) -> u32;
}

/// Decode the `trigger_type` argument of a V2 `on_trigger` call.
///
/// # Safety
///
/// `raw` must be null or point to a NUL-terminated string that outlives the
/// returned reference.
pub unsafe fn trigger_str<'a>(raw: *const std::ffi::c_char) -> &'a str {
    if raw.is_null() {
        return "";
    }
    // SAFETY: upheld by the caller.
    unsafe { CStr::from_ptr(raw) }.to_str().unwrap_or("")
}

/// Run an entry-point body, turning a panic into [`STATUS_PANICKED`].
///
/// Used by [`export_media_plugin!`]. Hand-written Rust exports should wrap
/// their bodies the same way: a panic that unwinds into the host aborts it.
pub fn contain_panic(body: impl FnOnce() -> u32) -> u32 {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(body)).unwrap_or(STATUS_PANICKED)
}

/// Export a [`MediaPlugin`] type as a V2 plugin binary.
///
/// # Generated Functions
///
/// - `name()`, `trigger()`: the plugin's constants
/// - `on_load(Library*)`, `on_unload(Library*)`
/// - `on_trigger(Library*, Media*, const char*)`
/// - `shiromana_abi_version()`: returns 2
///
/// A panic in `on_load`, `on_unload` or `on_trigger` is stopped inside the
/// plugin and reported as [`STATUS_PANICKED`].
#[macro_export]
macro_rules! export_media_plugin {
    ($plugin_type:ty) => {
        static __SHIROMANA_INSTANCE: ::std::sync::Mutex<::std::option::Option<$plugin_type>> =
            ::std::sync::Mutex::new(::std::option::Option::None);

        fn __shiromana_with<R>(f: impl FnOnce(&mut $plugin_type) -> R) -> R {
            let mut guard = __SHIROMANA_INSTANCE
                .lock()
                .unwrap_or_else(::std::sync::PoisonError::into_inner);
            f(guard.get_or_insert_with(<$plugin_type as ::std::default::Default>::default))
        }

        #[unsafe(no_mangle)]
        pub extern "C-unwind" fn name() -> *const ::std::ffi::c_char {
            <$plugin_type as $crate::MediaPlugin>::NAME.as_ptr()
        }

        #[unsafe(no_mangle)]
        pub extern "C-unwind" fn trigger() -> *const ::std::ffi::c_char {
            <$plugin_type as $crate::MediaPlugin>::TRIGGER.as_ptr()
        }

        #[unsafe(no_mangle)]
        pub extern "C-unwind" fn shiromana_abi_version() -> u32 {
            $crate::AbiGeneration::CURRENT.version()
        }

        #[unsafe(no_mangle)]
        pub extern "C-unwind" fn on_load(library: *mut $crate::abi::Library) -> u32 {
            let library = $crate::LibraryHandle::from_raw(library);
            $crate::contain_panic(|| {
                __shiromana_with(|plugin| $crate::MediaPlugin::on_load(plugin, library))
            })
        }

        #[unsafe(no_mangle)]
        pub extern "C-unwind" fn on_unload(library: *mut $crate::abi::Library) -> u32 {
            let library = $crate::LibraryHandle::from_raw(library);
            $crate::contain_panic(|| {
                let taken = __SHIROMANA_INSTANCE
                    .lock()
                    .unwrap_or_else(::std::sync::PoisonError::into_inner)
                    .take();
                match taken {
                    ::std::option::Option::Some(mut plugin) => {
                        $crate::MediaPlugin::on_unload(&mut plugin, library)
                    }
                    ::std::option::Option::None => $crate::STATUS_OK,
                }
            })
        }

        #[unsafe(no_mangle)]
        pub extern "C-unwind" fn on_trigger(
            library: *mut $crate::abi::Library,
            media: *mut $crate::abi::Media,
            trigger_type: *const ::std::ffi::c_char,
        ) -> u32 {
            // SAFETY: the host passes a NUL-terminated token valid for the call.
            let trigger = unsafe { $crate::trigger_str(trigger_type) };
            let event = $crate::TriggerEvent {
                library: $crate::LibraryHandle::from_raw(library),
                media: $crate::MediaHandle::from_raw(media),
                trigger,
            };
            $crate::contain_panic(|| {
                __shiromana_with(|plugin| $crate::MediaPlugin::on_trigger(plugin, event))
            })
        }
    };
}
