//! The C ABI every plugin binary exports.
//!
//! Two generations exist and both are supported by the host:
//!
//! | Symbol | V1 | V2 |
//! |---|---|---|
//! | `name` | `() -> const char*` | same |
//! | `trigger` | `() -> const char*` | same |
//! | `on_load` | `(Library*) -> uint` | same |
//! | `on_unload` | `() -> uint` | `(Library*) -> uint` |
//! | `on_trigger` | `() -> uint` | `(Library*, Media*, const char*) -> uint` |
//! | `shiromana_abi_version` | absent | `() -> uint`, returns 2 |
//!
//! A binary without `shiromana_abi_version` is treated as V1, since the
//! legacy header never declared it.

use serde::{Deserialize, Serialize};
use std::ffi::c_char;
use std::fmt;
use std::marker::{PhantomData, PhantomPinned};

/// Status returned by an entry point on success. Anything else is an opaque
/// plugin-defined failure code.
pub const STATUS_OK: u32 = 0;

/// Reserved status: the entry point panicked and the panic was stopped
/// inside the plugin. The host treats it as a fault, not as a plugin code.
///
/// A panic must never unwind out of a plugin binary. Each binary links its
/// own copy of std, and the host's runtime aborts on a panic it did not
/// raise.
pub const STATUS_PANICKED: u32 = u32::MAX;

/// Symbol names, without the trailing NUL.
pub mod symbols {
    pub const NAME: &str = "name";
    pub const TRIGGER: &str = "trigger";
    pub const ON_LOAD: &str = "on_load";
    pub const ON_UNLOAD: &str = "on_unload";
    pub const ON_TRIGGER: &str = "on_trigger";
    pub const ABI_VERSION: &str = "shiromana_abi_version";

    /// Symbols every generation must export.
    pub const REQUIRED: [&str; 5] = [NAME, TRIGGER, ON_LOAD, ON_UNLOAD, ON_TRIGGER];
}

/// Opaque catalog instance. Plugins only ever see `*mut Library`.
#[repr(C)]
pub struct Library {
    _opaque: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Opaque catalog entity. Only V2 plugins receive `*mut Media`.
#[repr(C)]
pub struct Media {
    _opaque: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Type-erased entry point as resolved from a binary, before the host has
/// decided which signature it carries.
pub type RawEntryPoint = unsafe extern "C-unwind" fn();

pub type NameFn = unsafe extern "C-unwind" fn() -> *const c_char;
pub type TriggerFn = unsafe extern "C-unwind" fn() -> *const c_char;
pub type AbiVersionFn = unsafe extern "C-unwind" fn() -> u32;
pub type OnLoadFn = unsafe extern "C-unwind" fn(*mut Library) -> u32;
pub type OnUnloadV1Fn = unsafe extern "C-unwind" fn() -> u32;
pub type OnUnloadV2Fn = unsafe extern "C-unwind" fn(*mut Library) -> u32;
pub type OnTriggerV1Fn = unsafe extern "C-unwind" fn() -> u32;
pub type OnTriggerV2Fn =
    unsafe extern "C-unwind" fn(*mut Library, *mut Media, *const c_char) -> u32;

/// ABI generation a plugin was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiGeneration {
    /// Lifecycle only: `on_trigger()` and `on_unload()` take no arguments.
    V1,
    /// Lifecycle plus typed event payload.
    V2,
}

impl AbiGeneration {
    /// Newest generation, the one `export_media_plugin!` emits.
    pub const CURRENT: AbiGeneration = AbiGeneration::V2;

    /// Map the value returned by `shiromana_abi_version`.
    pub fn from_version(version: u32) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    pub fn version(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }
}

impl fmt::Display for AbiGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version())
    }
}

/// Erase an entry point's signature so it can sit in a symbol table.
///
/// The inverse is [`restore`]; the caller of `restore` is responsible for
/// naming the same signature that was erased.
#[macro_export]
macro_rules! erase_entry_point {
    ($f:expr, $ty:ty) => {{
        let typed: $ty = $f;
        // SAFETY: function pointers share one representation; the signature
        // is recovered by `restore` before the pointer is ever called.
        unsafe { ::std::mem::transmute::<$ty, $crate::abi::RawEntryPoint>(typed) }
    }};
}

/// Recover a typed entry point from a [`RawEntryPoint`].
///
/// # Safety
///
/// `F` must be an `extern "C-unwind"` function pointer type matching the
/// signature the symbol was exported with. Calling through a mismatched
/// signature is undefined behaviour.
pub unsafe fn restore<F: Copy>(raw: RawEntryPoint) -> F {
    debug_assert_eq!(
        std::mem::size_of::<F>(),
        std::mem::size_of::<RawEntryPoint>()
    );
    // SAFETY: upheld by the caller; sizes are equal for fn pointer types.
    unsafe { std::mem::transmute_copy::<RawEntryPoint, F>(&raw) }
}
