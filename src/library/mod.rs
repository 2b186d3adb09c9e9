//! Video library: folder registry, content-hash metadata and the merged
//! catalog.
//!
//! [`Library`] wires the three services to one shared shuffle cache; the
//! document files it opens are described in [`crate::store`].

pub mod address;
pub mod catalog;
pub mod error;
pub mod hash_store;
pub mod registry;
pub mod scan;
pub mod shuffle;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use address::{decode, encode, resolve, resolve_str, ResolvedVideo, VideoAddress, DELIMITER};
pub use catalog::{
    compare_file_names, paginate, CatalogAggregator, CatalogEntry, LibraryFile, LibraryPage, Page, SortBy, SortOrder,
    VideoManifest,
};
pub use error::LibraryError;
pub use hash_store::{
    ContentHash, ContentHashStore, PrimaryDb, TagIndex, VideoDetails, DEFAULT_PREFIX_BYTES,
};
pub use registry::{FolderRegistry, ImportSummary, ImportedDoc, RegistryDoc};
pub use scan::VideoExtensions;
pub use shuffle::ShuffleCache;

use crate::store::{DocumentStore, JsonFileStore};

/// File names of the persisted documents under the home directory
pub const FOLDERS_FILE: &str = "folders.json";
pub const IMPORTED_FILE: &str = "imported.json";
pub const DB_FILE: &str = "db.json";

/// Tunables for opening a library
#[derive(Debug, Clone)]
pub struct LibraryOptions {
    pub extensions: VideoExtensions,
    pub hash_prefix_bytes: u64,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            extensions: VideoExtensions::default(),
            hash_prefix_bytes: DEFAULT_PREFIX_BYTES,
        }
    }
}

/// The three library services wired to one shared shuffle cache
#[derive(Clone)]
pub struct Library {
    pub registry: Arc<FolderRegistry>,
    pub hashes: Arc<ContentHashStore>,
    pub catalog: Arc<CatalogAggregator>,
}

impl Library {
    /// Open the library persisted under `home`
    pub async fn open(home: &Path, options: LibraryOptions) -> Result<Self, LibraryError> {
        Self::with_stores(
            Arc::new(JsonFileStore::new(home.join(FOLDERS_FILE))),
            Arc::new(JsonFileStore::new(home.join(IMPORTED_FILE))),
            Arc::new(JsonFileStore::new(home.join(DB_FILE))),
            options,
        )
        .await
    }

    /// Open the library over arbitrary document stores
    pub async fn with_stores(
        folder_store: Arc<dyn DocumentStore<RegistryDoc>>,
        imported_store: Arc<dyn DocumentStore<ImportedDoc>>,
        db_store: Arc<dyn DocumentStore<PrimaryDb>>,
        options: LibraryOptions,
    ) -> Result<Self, LibraryError> {
        let shuffle = Arc::new(ShuffleCache::new());

        let registry = Arc::new(
            FolderRegistry::open(
                folder_store,
                imported_store,
                shuffle.clone(),
                options.extensions,
            )
            .await?,
        );
        let hashes = Arc::new(
            ContentHashStore::open(db_store, registry.clone(), options.hash_prefix_bytes).await?,
        );
        let catalog = Arc::new(CatalogAggregator::new(
            registry.clone(),
            hashes.clone(),
            shuffle,
        ));

        Ok(Self {
            registry,
            hashes,
            catalog,
        })
    }
}

/// Paths of the persisted documents under `home`
pub fn document_paths(home: &Path) -> [PathBuf; 3] {
    [
        home.join(FOLDERS_FILE),
        home.join(IMPORTED_FILE),
        home.join(DB_FILE),
    ]
}
