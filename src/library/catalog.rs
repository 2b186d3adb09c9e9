//! Aggregated catalog across all active folders.
//!
//! Builds a fresh listing per call (imported catalog rows are authoritative
//! for a folder, otherwise its directory is scanned) and layers the shuffled
//! home feed, search, tag filtering and the size-sorted library view on top.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, warn};

use super::address::{resolve, resolve_candidate, VideoAddress};
use super::error::LibraryError;
use super::hash_store::ContentHashStore;
use super::registry::FolderRegistry;
use super::scan::{file_size, file_sizes, scan_directory};
use super::shuffle::ShuffleCache;
use crate::domain::{Folder, FolderId, ImportedVideoRecord, SourceType, TagMap};

/// Concurrent metadata lookups (each may hash a file prefix)
const METADATA_CONCURRENCY: usize = 16;

/// One listed video, produced fresh per aggregation call
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub address: VideoAddress,
    pub folder_path: PathBuf,
    pub full_path: PathBuf,
    pub imported: Option<ImportedVideoRecord>,
}

impl CatalogEntry {
    pub fn file_name(&self) -> &str {
        &self.address.file_name
    }

    pub fn folder_id(&self) -> &FolderId {
        &self.address.folder_id
    }

    /// Wire form of the address
    pub fn encoded_name(&self) -> String {
        self.address.encode()
    }
}

/// One page of a listing plus the size of the whole listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: usize,
    pub files: Vec<T>,
}

/// Bounds-clamped slice of `items`
pub fn paginate<T: Clone>(items: &[T], offset: usize, limit: usize) -> Page<T> {
    let start = offset.min(items.len());
    let end = start.saturating_add(limit).min(items.len());
    Page {
        total: items.len(),
        files: items[start..end].to_vec(),
    }
}

/// Sort key for the library view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Name,
    Size,
}

impl std::str::FromStr for SortBy {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" | "filename" => Ok(SortBy::Name),
            "size" | "filesize" => Ok(SortBy::Size),
            _ => Err(LibraryError::invalid(format!("Unknown sort key: {}", s))),
        }
    }
}

/// Sort direction for the library view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            _ => Err(LibraryError::invalid(format!("Unknown sort order: {}", s))),
        }
    }
}

/// A row of the library view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryFile {
    /// Encoded address
    pub name: String,
    pub file_name: String,
    pub folder_id: FolderId,
    pub size: u64,
}

/// A page of the library view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPage {
    pub total: usize,

    /// Aggregate size of every listed file, not just this page
    pub total_size: u64,

    pub files: Vec<LibraryFile>,
}

/// Everything known about one video
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoManifest {
    pub address: VideoAddress,
    pub folder_id: FolderId,
    pub file_name: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub resolution: String,
    pub tags: TagMap,
    pub likes: u64,
    pub playlists: Vec<String>,
    pub size: u64,
    pub has_preview: bool,
    pub has_thumbnail: bool,
}

/// Searchable metadata of an entry
#[derive(Debug, Default)]
struct EntryMeta {
    titles: Vec<String>,
    tags: Vec<String>,
}

/// Merges the active folders into one catalog
pub struct CatalogAggregator {
    registry: Arc<FolderRegistry>,
    hashes: Arc<ContentHashStore>,
    shuffle: Arc<ShuffleCache>,
}

impl CatalogAggregator {
    pub fn new(
        registry: Arc<FolderRegistry>,
        hashes: Arc<ContentHashStore>,
        shuffle: Arc<ShuffleCache>,
    ) -> Self {
        Self {
            registry,
            hashes,
            shuffle,
        }
    }

    /// Flat listing of every active folder, in registry order
    pub async fn list_active(&self) -> Vec<CatalogEntry> {
        let folders = self.registry.active_folders().await;
        join_all(folders.into_iter().map(|f| self.folder_entries(f)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn folder_entries(&self, folder: Folder) -> Vec<CatalogEntry> {
        let rows = self.registry.imported(&folder.id).await;

        if !rows.is_empty() {
            return rows
                .into_iter()
                .map(|row| CatalogEntry {
                    address: VideoAddress::new(folder.id.clone(), row.file.clone()),
                    folder_path: folder.path.clone(),
                    full_path: resolve_candidate(&folder.path, &row.file),
                    imported: Some(row),
                })
                .collect();
        }

        if folder.source_type != SourceType::Fs {
            return Vec::new();
        }

        match scan_directory(&folder.path, self.registry.extensions()).await {
            Ok(names) => names
                .into_iter()
                .map(|name| CatalogEntry {
                    full_path: folder.path.join(&name),
                    address: VideoAddress::new(folder.id.clone(), name),
                    folder_path: folder.path.clone(),
                    imported: None,
                })
                .collect(),
            Err(e) => {
                warn!("Cannot read folder {}: {}", folder.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Page of the shuffled home feed.
    ///
    /// Reuses the published permutation unless `reshuffle` is set or the
    /// cache was cleared.
    pub async fn files(&self, offset: usize, limit: usize, reshuffle: bool) -> Page<VideoAddress> {
        let cached = if reshuffle { None } else { self.shuffle.get() };

        let order = match cached {
            Some(order) => order,
            None => {
                let generation = self.shuffle.generation();
                let addresses = self
                    .list_active()
                    .await
                    .into_iter()
                    .map(|e| e.address)
                    .collect();
                let order = self.shuffle.publish(generation, addresses);
                debug!("Published shuffle of {} videos", order.len());
                order
            }
        };

        paginate(&order, offset, limit)
    }

    /// Every active address, in listing order
    pub async fn all_files(&self) -> Vec<VideoAddress> {
        self.list_active()
            .await
            .into_iter()
            .map(|e| e.address)
            .collect()
    }

    /// Random sample without replacement
    pub async fn random(&self, limit: usize) -> Vec<VideoAddress> {
        let all = self.all_files().await;
        all.choose_multiple(&mut rand::thread_rng(), limit)
            .cloned()
            .collect()
    }

    /// Case-insensitive substring search over titles, file names, addresses
    /// and tag values. An empty query matches everything. Sorted by file name.
    pub async fn search(&self, query: &str) -> Vec<VideoAddress> {
        let needle = query.trim().to_lowercase();
        let entries = self.list_active().await;

        let mut matched: Vec<CatalogEntry> = if needle.is_empty() {
            entries
        } else {
            stream::iter(entries)
                .map(|entry| {
                    let needle = needle.as_str();
                    async move {
                        let cheap = entry.file_name().to_lowercase().contains(needle)
                            || entry.encoded_name().to_lowercase().contains(needle);
                        if cheap {
                            return Some(entry);
                        }
                        let meta = self.entry_meta(&entry).await;
                        let hit = meta
                            .titles
                            .iter()
                            .chain(meta.tags.iter())
                            .any(|v| v.to_lowercase().contains(needle));
                        hit.then_some(entry)
                    }
                })
                .buffer_unordered(METADATA_CONCURRENCY)
                .filter_map(|e| async move { e })
                .collect::<Vec<_>>()
                .await
        };

        sort_by_file_name(&mut matched);
        matched.into_iter().map(|e| e.address).collect()
    }

    /// Videos carrying `tag` (exact, case-insensitive) in any category
    pub async fn by_tag(&self, tag: &str) -> Vec<VideoAddress> {
        let wanted = tag.trim().to_lowercase();
        if wanted.is_empty() {
            return Vec::new();
        }

        let entries = self.list_active().await;
        let mut matched: Vec<CatalogEntry> = stream::iter(entries)
            .map(|entry| {
                let wanted = wanted.as_str();
                async move {
                    let meta = self.entry_meta(&entry).await;
                    let hit = meta.tags.iter().any(|t| t.to_lowercase() == wanted);
                    hit.then_some(entry)
                }
            })
            .buffer_unordered(METADATA_CONCURRENCY)
            .filter_map(|e| async move { e })
            .collect::<Vec<_>>()
            .await;

        sort_by_file_name(&mut matched);
        matched.into_iter().map(|e| e.address).collect()
    }

    /// Size-sorted library view.
    ///
    /// Stats every active file on each call; `total_size` covers the whole
    /// listing. Files that vanished since the scan are skipped.
    pub async fn library_listing(
        &self,
        sort_by: SortBy,
        order: SortOrder,
        offset: usize,
        limit: usize,
    ) -> LibraryPage {
        let entries = self.list_active().await;
        let paths: Vec<&PathBuf> = entries.iter().map(|e| &e.full_path).collect();
        let sizes = file_sizes(&paths).await;

        let mut files: Vec<LibraryFile> = entries
            .iter()
            .zip(sizes)
            .filter_map(|(entry, size)| {
                Some(LibraryFile {
                    name: entry.encoded_name(),
                    file_name: entry.file_name().to_string(),
                    folder_id: entry.folder_id().clone(),
                    size: size?,
                })
            })
            .collect();

        match sort_by {
            SortBy::Name => files.sort_by(|a, b| {
                compare_file_names(&a.file_name, &b.file_name).then_with(|| a.name.cmp(&b.name))
            }),
            SortBy::Size => {
                files.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.name.cmp(&b.name)))
            }
        }
        if order == SortOrder::Desc {
            files.reverse();
        }

        let total_size = files.iter().map(|f| f.size).sum();
        let page = paginate(&files, offset, limit);

        LibraryPage {
            total: page.total,
            total_size,
            files: page.files,
        }
    }

    /// Combined imported and user-edited metadata for one video
    pub async fn manifest(&self, address: &VideoAddress) -> Result<VideoManifest, LibraryError> {
        let resolved = resolve(&self.registry, address).await?;
        let hash = self.hashes.hash_file(&resolved.full_path).await?;
        let record = self.hashes.details_for_hash(&hash).await;
        let imported = resolved.imported.clone().unwrap_or_else(|| ImportedVideoRecord {
            file: address.file_name.clone(),
            ..Default::default()
        });

        let (title, tags) = match record {
            Some(r) if !r.title.is_empty() || !r.tags.is_empty() => (
                if r.title.is_empty() { imported.title.clone() } else { r.title },
                if r.tags.is_empty() { imported.tags.clone() } else { r.tags },
            ),
            _ => (imported.title.clone(), imported.tags.clone()),
        };

        let has_preview = match &resolved.preview_path {
            Some(p) => file_size(p).await.is_some(),
            None => false,
        };
        let has_thumbnail = match &resolved.thumbnail_path {
            Some(p) => file_size(p).await.is_some(),
            None => false,
        };

        Ok(VideoManifest {
            address: address.clone(),
            folder_id: address.folder_id.clone(),
            file_name: address.file_name.clone(),
            title,
            description: imported.description,
            duration: imported.duration,
            resolution: imported.resolution,
            tags,
            likes: imported.likes,
            playlists: imported.playlists,
            size: file_size(&resolved.full_path).await.unwrap_or(0),
            has_preview,
            has_thumbnail,
        })
    }

    async fn entry_meta(&self, entry: &CatalogEntry) -> EntryMeta {
        let mut meta = EntryMeta::default();

        if let Some(imported) = &entry.imported {
            meta.titles.push(imported.title.clone());
            meta.tags.extend(imported.tag_values().map(str::to_string));
        }

        match self.hashes.hash_file(&entry.full_path).await {
            Ok(hash) => {
                if let Some(record) = self.hashes.details_for_hash(&hash).await {
                    meta.titles.push(record.title);
                    meta.tags.extend(record.tags.into_values().flatten());
                }
            }
            Err(e) => debug!("No content hash for {}: {}", entry.full_path.display(), e),
        }

        meta
    }
}

fn sort_by_file_name(entries: &mut [CatalogEntry]) {
    entries.sort_by(|a, b| {
        compare_file_names(a.file_name(), b.file_name()).then_with(|| a.address.cmp(&b.address))
    });
}

/// File name order used by every listing: case-insensitive, exact bytes
/// break ties
pub fn compare_file_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_clamps() {
        let items: Vec<u32> = (0..10).collect();

        let page = paginate(&items, 2, 3);
        assert_eq!(page.total, 10);
        assert_eq!(page.files, vec![2, 3, 4]);

        let tail = paginate(&items, 8, 5);
        assert_eq!(tail.files, vec![8, 9]);

        let past_end = paginate(&items, 50, 5);
        assert!(past_end.files.is_empty());
        assert_eq!(past_end.total, 10);

        let huge = paginate(&items, 0, usize::MAX);
        assert_eq!(huge.files.len(), 10);
    }

    #[test]
    fn test_compare_file_names() {
        let mut names = vec!["b.mp4", "B.mp4", "a.mp4", "C.mp4"];
        names.sort_by(|a, b| compare_file_names(a, b));
        assert_eq!(names, vec!["a.mp4", "B.mp4", "b.mp4", "C.mp4"]);
    }

    #[test]
    fn test_sort_parsing() {
        assert_eq!("fileName".parse::<SortBy>().unwrap(), SortBy::Name);
        assert_eq!("size".parse::<SortBy>().unwrap(), SortBy::Size);
        assert!("color".parse::<SortBy>().is_err());

        assert_eq!("ascending".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
