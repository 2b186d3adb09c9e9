//! JSON file backend for [`DocumentStore`](super::DocumentStore).
//!
//! Writes go to a sibling temp file which is fsynced and renamed over the
//! target, under an exclusive lock on `<file>.lock`. [`DocumentStore::update`]
//! re-reads the file while holding that lock, so a CLI invocation and a
//! running server each apply their edit on top of the other's.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use super::{DocumentStore, Mutation};
use crate::library::LibraryError;

/// Whole-file JSON document store
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Take the exclusive sidecar lock. It is released when the returned
    /// handle is unlocked or closed.
    async fn acquire_lock(&self) -> Result<File, LibraryError> {
        let lock_path = self.lock_path();
        let parent = self.path.parent().map(Path::to_path_buf);

        let lock_file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = parent {
                std::fs::create_dir_all(parent)?;
            }
            let lock_file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            lock_file.lock_exclusive()?;
            Ok(lock_file)
        })
        .await
        .map_err(join_error)??;

        Ok(lock_file)
    }

    /// Temp file, fsync, rename; then drop the lock
    async fn write_locked(&self, lock_file: File, content: String) -> Result<(), LibraryError> {
        let path = self.path.clone();
        let tmp_path = self.tmp_path();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let result = (|| {
                let mut tmp = File::create(&tmp_path)?;
                tmp.write_all(content.as_bytes())?;
                tmp.sync_all()?;
                std::fs::rename(&tmp_path, &path)
            })();

            let _ = fs2::FileExt::unlock(&lock_file);
            result
        })
        .await
        .map_err(join_error)??;

        Ok(())
    }
}

fn join_error(e: tokio::task::JoinError) -> LibraryError {
    LibraryError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

#[async_trait]
impl<T> DocumentStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<T, LibraryError> {
        if !fs::try_exists(&self.path).await? {
            debug!("{} does not exist yet, starting empty", self.path.display());
            return Ok(T::default());
        }

        let content = fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(T::default());
        }

        match serde_json::from_str(&content) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                // Corrupt store: recover to an empty document, keep serving
                warn!(
                    "Malformed JSON in {} ({}), recovering with empty document",
                    self.path.display(),
                    e
                );
                Ok(T::default())
            }
        }
    }

    async fn save(&self, doc: &T) -> Result<(), LibraryError> {
        let content = serde_json::to_string_pretty(doc)?;
        let lock_file = self.acquire_lock().await?;
        self.write_locked(lock_file, content).await
    }

    async fn update<'m>(&self, mutate: Mutation<'m, T>) -> Result<T, LibraryError> {
        let lock_file = self.acquire_lock().await?;

        // Re-read under the lock so writes from other processes are kept
        let mut doc = self.load().await?;
        mutate(&mut doc)?;

        let content = serde_json::to_string_pretty(&doc)?;
        self.write_locked(lock_file, content).await?;
        Ok(doc)
    }
}
