//! Registry of source folders.
//!
//! Folders come in two sections: `fs` folders are real directories that get
//! scanned, `json` folders are backed by an imported catalog. Paths are
//! unique within a section. Every configuration change clears the injected
//! shuffle cache.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::address::resolve_candidate;
use super::error::LibraryError;
use super::scan::{file_sizes, scan_directory, VideoExtensions};
use super::shuffle::ShuffleCache;
use crate::domain::{normalize_record, Folder, FolderId, FolderView, ImportedVideoRecord, SourceType};
use crate::store::DocumentStore;

/// Persisted registry document (`folders.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDoc {
    /// Next folder id sequence number
    #[serde(default)]
    pub next_id: u64,

    #[serde(default)]
    pub fs: Vec<Folder>,

    #[serde(default)]
    pub json: Vec<Folder>,
}

impl RegistryDoc {
    fn section(&self, source_type: SourceType) -> &Vec<Folder> {
        match source_type {
            SourceType::Fs => &self.fs,
            SourceType::Json => &self.json,
        }
    }

    fn section_mut(&mut self, source_type: SourceType) -> &mut Vec<Folder> {
        match source_type {
            SourceType::Fs => &mut self.fs,
            SourceType::Json => &mut self.json,
        }
    }

    fn all(&self) -> impl Iterator<Item = &Folder> {
        self.fs.iter().chain(self.json.iter())
    }

    fn allocate_id(&mut self) -> FolderId {
        let id = FolderId::from_seq(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Persisted imported catalogs (`imported.json`), keyed by folder id
pub type ImportedDoc = BTreeMap<FolderId, Vec<ImportedVideoRecord>>;

/// Result of a JSON catalog import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub added_folders: usize,
    pub updated_folders: usize,
    pub total_videos: usize,
}

/// Folder registry with write-through persistence
pub struct FolderRegistry {
    folders: RwLock<RegistryDoc>,
    imported: RwLock<ImportedDoc>,
    folder_store: Arc<dyn DocumentStore<RegistryDoc>>,
    imported_store: Arc<dyn DocumentStore<ImportedDoc>>,
    shuffle: Arc<ShuffleCache>,
    extensions: VideoExtensions,
}

impl FolderRegistry {
    /// Load the registry from its stores
    pub async fn open(
        folder_store: Arc<dyn DocumentStore<RegistryDoc>>,
        imported_store: Arc<dyn DocumentStore<ImportedDoc>>,
        shuffle: Arc<ShuffleCache>,
        extensions: VideoExtensions,
    ) -> Result<Self, LibraryError> {
        let folders = folder_store.load().await?;
        let imported = imported_store.load().await?;

        info!(
            "Loaded {} fs and {} json folders from {}",
            folders.fs.len(),
            folders.json.len(),
            folder_store.describe()
        );

        Ok(Self {
            folders: RwLock::new(folders),
            imported: RwLock::new(imported),
            folder_store,
            imported_store,
            shuffle,
            extensions,
        })
    }

    /// Recognized video extensions
    pub fn extensions(&self) -> &VideoExtensions {
        &self.extensions
    }

    /// Register a real directory
    pub async fn register(&self, path: &str) -> Result<FolderView, LibraryError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(LibraryError::invalid("Folder path is required"));
        }

        let meta = tokio::fs::metadata(trimmed)
            .await
            .map_err(|_| LibraryError::invalid(format!("Folder does not exist: {}", trimmed)))?;
        if !meta.is_dir() {
            return Err(LibraryError::invalid(format!(
                "Path is not a directory: {}",
                trimmed
            )));
        }
        let canonical = tokio::fs::canonicalize(trimmed).await?;

        let folder = {
            let mut doc = self.folders.write().await;
            let mut created = None;
            let next = self
                .folder_store
                .update(Box::new(|next: &mut RegistryDoc| -> Result<(), LibraryError> {
                    if next.fs.iter().any(|f| f.path == canonical) {
                        return Err(LibraryError::conflict(format!(
                            "Folder already registered: {}",
                            canonical.display()
                        )));
                    }
                    let folder = Folder::new(next.allocate_id(), canonical.clone(), SourceType::Fs);
                    next.fs.push(folder.clone());
                    created = Some(folder);
                    Ok(())
                }))
                .await?;
            *doc = next;
            created.ok_or_else(|| LibraryError::invalid("Folder was not registered"))?
        };

        self.shuffle.invalidate();
        info!("Registered folder {} at {}", folder.id, folder.path.display());

        Ok(self.view(folder, &[]).await)
    }

    /// Import JSON catalogs: `path -> raw records`.
    ///
    /// Each path gets (or reuses) a json-section folder whose video list is
    /// replaced wholesale by the normalized records.
    pub async fn import_json_catalog(
        &self,
        data: BTreeMap<String, Vec<Value>>,
    ) -> Result<ImportSummary, LibraryError> {
        let mut catalogs = Vec::with_capacity(data.len());
        for (raw_path, raw_records) in data {
            let trimmed = raw_path.trim();
            if trimmed.is_empty() {
                warn!("Skipping catalog with empty folder path");
                continue;
            }
            let path = normalize_catalog_path(trimmed).await;

            let records: Vec<ImportedVideoRecord> = raw_records
                .iter()
                .filter_map(|raw| {
                    let record = normalize_record(raw);
                    if record.is_none() {
                        warn!("Skipping unusable record in catalog for {}", path.display());
                    }
                    record
                })
                .collect();
            catalogs.push((path, records));
        }

        let mut summary = ImportSummary::default();
        {
            let mut doc = self.folders.write().await;
            let mut imported = self.imported.write().await;

            let mut assigned = Vec::with_capacity(catalogs.len());
            let next_doc = self
                .folder_store
                .update(Box::new(|next_doc: &mut RegistryDoc| -> Result<(), LibraryError> {
                    for (path, records) in catalogs {
                        let existing = next_doc
                            .section(SourceType::Json)
                            .iter()
                            .find(|f| f.path == path)
                            .map(|f| f.id.clone());

                        let id = match existing {
                            Some(id) => {
                                summary.updated_folders += 1;
                                id
                            }
                            None => {
                                let folder =
                                    Folder::new(next_doc.allocate_id(), path, SourceType::Json);
                                let id = folder.id.clone();
                                next_doc.section_mut(SourceType::Json).push(folder);
                                summary.added_folders += 1;
                                id
                            }
                        };

                        summary.total_videos += records.len();
                        assigned.push((id, records));
                    }
                    Ok(())
                }))
                .await?;
            *doc = next_doc;

            let next_imported = self
                .imported_store
                .update(Box::new(move |next: &mut ImportedDoc| -> Result<(), LibraryError> {
                    next.extend(assigned);
                    Ok(())
                }))
                .await?;
            *imported = next_imported;
        }

        self.shuffle.invalidate();
        info!(
            "Imported catalogs: {} added, {} updated, {} videos",
            summary.added_folders, summary.updated_folders, summary.total_videos
        );

        Ok(summary)
    }

    /// Make exactly the listed folders active. Unknown ids are ignored.
    pub async fn set_active(&self, active_ids: &[FolderId]) -> Result<Vec<Folder>, LibraryError> {
        let wanted: HashSet<&FolderId> = active_ids.iter().collect();

        let folders = {
            let mut doc = self.folders.write().await;
            let next = self
                .folder_store
                .update(Box::new(|next: &mut RegistryDoc| -> Result<(), LibraryError> {
                    for folder in next.fs.iter_mut().chain(next.json.iter_mut()) {
                        folder.active = wanted.contains(&folder.id);
                    }
                    Ok(())
                }))
                .await?;
            *doc = next;
            doc.all().cloned().collect::<Vec<_>>()
        };

        self.shuffle.invalidate();
        info!(
            "Active folders: {}/{}",
            folders.iter().filter(|f| f.active).count(),
            folders.len()
        );

        Ok(folders)
    }

    /// Remove a folder and its imported catalog rows
    pub async fn delete(&self, id: &FolderId) -> Result<Folder, LibraryError> {
        let removed = {
            let mut doc = self.folders.write().await;
            let mut imported = self.imported.write().await;

            let mut removed = None;
            let next = self
                .folder_store
                .update(Box::new(|next: &mut RegistryDoc| -> Result<(), LibraryError> {
                    let folder = [SourceType::Fs, SourceType::Json]
                        .into_iter()
                        .find_map(|section| {
                            let folders = next.section_mut(section);
                            let pos = folders.iter().position(|f| &f.id == id)?;
                            Some(folders.remove(pos))
                        })
                        .ok_or_else(|| LibraryError::not_found(format!("Folder not found: {}", id)))?;
                    removed = Some(folder);
                    Ok(())
                }))
                .await?;
            *doc = next;

            let next_imported = self
                .imported_store
                .update(Box::new(|next: &mut ImportedDoc| -> Result<(), LibraryError> {
                    next.remove(id);
                    Ok(())
                }))
                .await?;
            *imported = next_imported;

            removed.ok_or_else(|| LibraryError::not_found(format!("Folder not found: {}", id)))?
        };

        self.shuffle.invalidate();
        info!("Deleted folder {} ({})", removed.id, removed.path.display());

        Ok(removed)
    }

    /// All folders (fs section first) with live counts
    pub async fn list(&self) -> Vec<FolderView> {
        let folders = self.all().await;
        let imported = self.imported.read().await.clone();

        join_all(folders.into_iter().map(|folder| {
            let rows = imported.get(&folder.id).cloned().unwrap_or_default();
            async move { self.view(folder, &rows).await }
        }))
        .await
    }

    /// All folders, fs section first
    pub async fn all(&self) -> Vec<Folder> {
        self.folders.read().await.all().cloned().collect()
    }

    /// Active folders in registry order
    pub async fn active_folders(&self) -> Vec<Folder> {
        self.folders
            .read()
            .await
            .all()
            .filter(|f| f.active)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &FolderId) -> Option<Folder> {
        self.folders.read().await.all().find(|f| &f.id == id).cloned()
    }

    /// Imported catalog rows of a folder (empty when none)
    pub async fn imported(&self, id: &FolderId) -> Vec<ImportedVideoRecord> {
        self.imported
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    async fn view(&self, folder: Folder, rows: &[ImportedVideoRecord]) -> FolderView {
        let paths: Vec<PathBuf> = if !rows.is_empty() {
            rows.iter()
                .map(|r| resolve_candidate(&folder.path, &r.file))
                .collect()
        } else if folder.source_type == SourceType::Fs {
            match scan_directory(&folder.path, &self.extensions).await {
                Ok(names) => names.iter().map(|n| folder.path.join(n)).collect(),
                Err(e) => {
                    warn!("Cannot read folder {}: {}", folder.path.display(), e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let total_size = file_sizes(&paths).await.into_iter().flatten().sum();
        let video_count = if rows.is_empty() { paths.len() } else { rows.len() };

        FolderView {
            folder,
            video_count,
            total_size,
        }
    }
}

/// Canonicalize a catalog path when it exists; keep it verbatim otherwise
async fn normalize_catalog_path(raw: &str) -> PathBuf {
    tokio::fs::canonicalize(raw)
        .await
        .unwrap_or_else(|_| Path::new(raw).to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_registry() -> (FolderRegistry, Arc<ShuffleCache>) {
        let shuffle = Arc::new(ShuffleCache::new());
        let registry = FolderRegistry::open(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            shuffle.clone(),
            VideoExtensions::default(),
        )
        .await
        .unwrap();
        (registry, shuffle)
    }

    #[tokio::test]
    async fn test_register_counts_videos() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.mp4"), vec![0u8; 10]).unwrap();
        std::fs::write(temp.path().join("b.mkv"), vec![0u8; 5]).unwrap();
        std::fs::write(temp.path().join("c.txt"), vec![0u8; 99]).unwrap();

        let (registry, _) = create_test_registry().await;
        let view = registry
            .register(temp.path().to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(view.folder.id.as_str(), "f0");
        assert_eq!(view.video_count, 2);
        assert_eq!(view.total_size, 15);
        assert_eq!(view.folder.source_type, SourceType::Fs);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_paths() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.mp4");
        std::fs::write(&file, b"x").unwrap();

        let (registry, _) = create_test_registry().await;
        assert!(matches!(
            registry.register("  ").await,
            Err(LibraryError::InvalidInput(_))
        ));
        assert!(matches!(
            registry
                .register(temp.path().join("missing").to_str().unwrap())
                .await,
            Err(LibraryError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.register(file.to_str().unwrap()).await,
            Err(LibraryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_conflicts() {
        let temp = TempDir::new().unwrap();
        let (registry, _) = create_test_registry().await;
        let path = temp.path().to_str().unwrap();

        registry.register(path).await.unwrap();
        let again = registry.register(&format!("{}/", path)).await;
        assert!(matches!(again, Err(LibraryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_import_creates_then_replaces() {
        let (registry, _) = create_test_registry().await;

        let mut data = BTreeMap::new();
        data.insert(
            "/catalogs/one".to_string(),
            vec![json!({"file": "a.mp4"}), json!({"file": "b.mp4"}), json!(42)],
        );
        let summary = registry.import_json_catalog(data).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                added_folders: 1,
                updated_folders: 0,
                total_videos: 2
            }
        );

        let folder = registry.all().await.pop().unwrap();
        assert_eq!(folder.source_type, SourceType::Json);
        assert_eq!(registry.imported(&folder.id).await.len(), 2);

        let mut data = BTreeMap::new();
        data.insert("/catalogs/one".to_string(), vec![json!({"file": "c.mp4"})]);
        let summary = registry.import_json_catalog(data).await.unwrap();
        assert_eq!(summary.added_folders, 0);
        assert_eq!(summary.updated_folders, 1);

        let rows = registry.imported(&folder.id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file, "c.mp4");
    }

    #[tokio::test]
    async fn test_same_path_in_both_sections() {
        let temp = TempDir::new().unwrap();
        let (registry, _) = create_test_registry().await;
        let view = registry
            .register(temp.path().to_str().unwrap())
            .await
            .unwrap();

        let mut data = BTreeMap::new();
        data.insert(
            temp.path().to_str().unwrap().to_string(),
            vec![json!({"file": "x.mp4"})],
        );
        let summary = registry.import_json_catalog(data).await.unwrap();
        assert_eq!(summary.added_folders, 1);

        let all = registry.all().await;
        assert_eq!(all.len(), 2);
        assert_ne!(all[0].id, all[1].id);
        assert_eq!(all[0].id, view.folder.id);
    }

    #[tokio::test]
    async fn test_set_active_and_delete_cascade() {
        let (registry, shuffle) = create_test_registry().await;

        let mut data = BTreeMap::new();
        data.insert("/c/one".to_string(), vec![json!({"file": "a.mp4"})]);
        data.insert("/c/two".to_string(), vec![json!({"file": "b.mp4"})]);
        registry.import_json_catalog(data).await.unwrap();

        let all = registry.all().await;
        let first = all[0].id.clone();
        let second = all[1].id.clone();

        shuffle.publish(shuffle.generation(), Vec::new());
        registry
            .set_active(&[second.clone(), FolderId::new("f99")])
            .await
            .unwrap();
        assert!(shuffle.get().is_none());

        let active = registry.active_folders().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second);

        registry.delete(&first).await.unwrap();
        assert!(registry.get(&first).await.is_none());
        assert!(registry.imported(&first).await.is_empty());
        assert!(matches!(
            registry.delete(&first).await,
            Err(LibraryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let (registry, _) = create_test_registry().await;
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();

        let first = registry.register(a.path().to_str().unwrap()).await.unwrap();
        registry.delete(&first.folder.id).await.unwrap();
        let second = registry.register(b.path().to_str().unwrap()).await.unwrap();

        assert_eq!(second.folder.id.as_str(), "f1");
    }

    #[tokio::test]
    async fn test_list_tolerates_unreadable_folder() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("vanishing");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("a.mp4"), b"abc").unwrap();

        let (registry, _) = create_test_registry().await;
        registry.register(dir.to_str().unwrap()).await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        let views = registry.list().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].video_count, 0);
    }
}
