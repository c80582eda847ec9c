//! Catalog - the media library the plugin host serves
//!
//! The host never stores media itself. It asks the catalog which library it
//! is bound to and whether a media handle is still live before passing that
//! handle to plugin code.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use shiromana_plugin_api::{LibraryHandle, MediaHandle};

/// The library a plugin host is bound to.
pub trait Catalog: Send + Sync {
    /// Handle passed to every plugin entry point that takes a library.
    fn library(&self) -> LibraryHandle;

    /// Whether `media` still resolves to an entry in this library.
    fn contains_media(&self, media: MediaHandle) -> bool;
}

/// Catalog that accepts every media handle.
///
/// For hosts whose events are produced by code that already guarantees
/// liveness.
#[derive(Debug, Clone, Copy)]
pub struct FixedCatalog {
    library: LibraryHandle,
}

impl FixedCatalog {
    pub fn new(library: LibraryHandle) -> Self {
        Self { library }
    }
}

impl Catalog for FixedCatalog {
    fn library(&self) -> LibraryHandle {
        self.library
    }

    fn contains_media(&self, _media: MediaHandle) -> bool {
        true
    }
}

/// In-memory set of live media handles.
#[derive(Debug)]
pub struct MemoryCatalog {
    library: LibraryHandle,
    media: RwLock<HashSet<MediaHandle>>,
}

impl MemoryCatalog {
    pub fn new(library: LibraryHandle) -> Self {
        Self {
            library,
            media: RwLock::new(HashSet::new()),
        }
    }

    /// Returns false if the handle was already present.
    pub fn insert(&self, media: MediaHandle) -> bool {
        self.media
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(media)
    }

    /// Returns false if the handle was not present.
    pub fn remove(&self, media: MediaHandle) -> bool {
        self.media
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&media)
    }

    pub fn len(&self) -> usize {
        self.media.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Catalog for MemoryCatalog {
    fn library(&self) -> LibraryHandle {
        self.library
    }

    fn contains_media(&self, media: MediaHandle) -> bool {
        self.media
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&media)
    }
}
