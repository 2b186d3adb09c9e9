//! Persistence for the catalog documents.
//!
//! Every persisted structure (folder registry, imported catalogs, the
//! primary metadata db) is a single serde document that is loaded whole and
//! saved whole. Callers only see the [`DocumentStore`] trait, so the backing
//! medium can change without touching the library code.
//!
//! # Storage Layout
//!
//! ```text
//! ~/.vidshelf/
//! ├── folders.json     # Folder registry (fs + json sections)
//! ├── imported.json    # Imported catalog rows keyed by folder id
//! └── db.json          # {videos: {hash: record}, tagCategories: {...}}
//! ```

pub mod json_file;

use std::marker::PhantomData;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::library::LibraryError;

pub use json_file::JsonFileStore;

/// Trait for whole-document persistence backends
#[async_trait]
pub trait DocumentStore<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    /// Human-readable backend description (used in logs)
    fn describe(&self) -> String;

    /// Load the document. Missing or corrupt data yields `T::default()`.
    async fn load(&self) -> Result<T, LibraryError>;

    /// Replace the stored document
    async fn save(&self, doc: &T) -> Result<(), LibraryError>;

    /// Apply `mutate` to the freshest stored copy and persist the result as
    /// one exclusive step. Other writers sharing the backing medium (another
    /// process on the same file) are never overwritten with a stale copy.
    /// An error from `mutate` leaves the stored document untouched.
    async fn update<'m>(&self, mutate: Mutation<'m, T>) -> Result<T, LibraryError>;
}

/// In-place edit of a document, run by [`DocumentStore::update`]
pub type Mutation<'m, T> = Box<dyn FnOnce(&mut T) -> Result<(), LibraryError> + Send + 'm>;

/// In-memory backend, used by tests and ephemeral sessions.
///
/// Keeps the serialized JSON rather than the value so a load always yields
/// a fresh copy, exactly like re-reading a file.
pub struct MemoryStore<T> {
    raw: Mutex<Option<String>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            raw: Mutex::new(None),
            _marker: PhantomData,
        }
    }

    /// Raw JSON of the last save, if any
    pub fn raw(&self) -> Option<String> {
        self.raw.lock().clone()
    }
}

#[async_trait]
impl<T> DocumentStore<T> for MemoryStore<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<T, LibraryError> {
        let raw = self.raw.lock().clone();
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(T::default()),
        }
    }

    async fn save(&self, doc: &T) -> Result<(), LibraryError> {
        let raw = serde_json::to_string_pretty(doc)?;
        *self.raw.lock() = Some(raw);
        Ok(())
    }

    async fn update<'m>(&self, mutate: Mutation<'m, T>) -> Result<T, LibraryError> {
        let mut raw = self.raw.lock();
        let mut doc = match raw.as_deref() {
            Some(current) => serde_json::from_str(current)?,
            None => T::default(),
        };
        mutate(&mut doc)?;
        *raw = Some(serde_json::to_string_pretty(&doc)?);
        Ok(doc)
    }
}
