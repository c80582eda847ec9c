//! Typed handles for catalog objects handed to plugins.
//!
//! Handles are identifiers issued by the catalog, not addresses. At the ABI
//! boundary they travel as pointer-sized tokens without provenance, so a
//! plugin can hand them back but can never dereference them meaningfully.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

use crate::abi::{Library, Media};

/// Identifies one catalog (library) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryHandle(NonZeroU64);

/// Identifies one media entity inside a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaHandle(NonZeroU64);

macro_rules! impl_handle {
    ($handle:ident, $opaque:ident, $label:literal) => {
        impl $handle {
            /// Wrap a catalog identifier. Zero is reserved for "no handle".
            pub const fn new(id: u64) -> Option<Self> {
                match NonZeroU64::new(id) {
                    Some(id) => Some(Self(id)),
                    None => None,
                }
            }

            pub const fn get(self) -> u64 {
                self.0.get()
            }

            /// Token passed across the ABI.
            pub fn as_raw(self) -> *mut $opaque {
                std::ptr::without_provenance_mut(self.0.get() as usize)
            }

            /// Recover a handle from a token received over the ABI; null
            /// maps to `None`.
            pub fn from_raw(raw: *mut $opaque) -> Option<Self> {
                Self::new(raw.addr() as u64)
            }
        }

        impl From<NonZeroU64> for $handle {
            fn from(id: NonZeroU64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $handle {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

impl_handle!(LibraryHandle, Library, "library");
impl_handle!(MediaHandle, Media, "media");

/// Token for an optional media handle; `None` crosses the ABI as null.
pub fn media_token(media: Option<MediaHandle>) -> *mut Media {
    media.map_or(std::ptr::null_mut(), MediaHandle::as_raw)
}
