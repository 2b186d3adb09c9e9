//! Metadata store keyed by content hash.
//!
//! A video's key is the SHA-256 of its first `prefix_bytes` bytes (2 MiB by
//! default), so titles and tags survive renames and moves between folders.
//! Hashing whole multi-gigabyte files on every lookup is not an option; two
//! distinct files sharing an identical prefix share one record, which is an
//! accepted risk for a personal catalog.
//!
//! The tag index (`category -> tag -> [hash]`) is derived from the records.
//! Writes reconcile it incrementally; [`ContentHashStore::rebuild_index`]
//! regenerates it from the records on startup and on demand.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::address::{resolve, ResolvedVideo, VideoAddress};
use super::error::LibraryError;
use super::registry::FolderRegistry;
use crate::domain::{normalize_tags, ContentRecord, TagMap};
use crate::store::DocumentStore;

/// Default number of leading bytes that are hashed (2 MiB)
pub const DEFAULT_PREFIX_BYTES: u64 = 2 * 1024 * 1024;

/// Hex SHA-256 of a file's leading bytes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inverted index: category -> tag -> hashes (sorted, unique)
pub type TagIndex = BTreeMap<String, BTreeMap<String, Vec<ContentHash>>>;

/// Persisted primary document (`db.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryDb {
    #[serde(default)]
    pub videos: BTreeMap<ContentHash, ContentRecord>,

    #[serde(default)]
    pub tag_categories: TagIndex,
}

/// Title and tags of a video, empty when untagged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub title: String,
    pub tags: TagMap,
}

/// Hash the first `min(prefix_bytes, size)` bytes of a file
pub async fn hash_prefix(path: &Path, prefix_bytes: u64) -> std::io::Result<ContentHash> {
    let file = File::open(path).await?;
    let size = file.metadata().await?.len();
    let want = size.min(prefix_bytes);

    let mut buffer = Vec::with_capacity(want as usize);
    file.take(want).read_to_end(&mut buffer).await?;

    let mut hasher = Sha256::new();
    hasher.update(&buffer);
    Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Memoized hash of one path; stale once size or mtime moves
#[derive(Debug, Clone)]
struct MemoEntry {
    size: u64,
    modified: Option<SystemTime>,
    hash: ContentHash,
}

/// Content-hash-keyed metadata store
pub struct ContentHashStore {
    db: RwLock<PrimaryDb>,
    store: Arc<dyn DocumentStore<PrimaryDb>>,
    registry: Arc<FolderRegistry>,
    prefix_bytes: u64,
    memo: Mutex<HashMap<PathBuf, MemoEntry>>,
}

impl ContentHashStore {
    /// Load the store and bring its tag index in line with the records
    pub async fn open(
        store: Arc<dyn DocumentStore<PrimaryDb>>,
        registry: Arc<FolderRegistry>,
        prefix_bytes: u64,
    ) -> Result<Self, LibraryError> {
        let db = store.load().await?;
        info!(
            "Loaded {} content records from {}",
            db.videos.len(),
            store.describe()
        );

        let this = Self {
            db: RwLock::new(db),
            store,
            registry,
            prefix_bytes: prefix_bytes.max(1),
            memo: Mutex::new(HashMap::new()),
        };
        this.rebuild_index().await?;
        Ok(this)
    }

    /// Number of leading bytes that are hashed
    pub fn prefix_bytes(&self) -> u64 {
        self.prefix_bytes
    }

    /// Content hash of a file, memoized on (path, size, mtime). One entry
    /// per path; a changed file replaces its entry.
    pub async fn hash_file(&self, path: &Path) -> Result<ContentHash, LibraryError> {
        let meta = tokio::fs::metadata(path).await?;
        let (size, modified) = (meta.len(), meta.modified().ok());

        let cached = self.memo.lock().get(path).and_then(|entry| {
            (entry.size == size && entry.modified == modified).then(|| entry.hash.clone())
        });
        if let Some(hash) = cached {
            return Ok(hash);
        }

        let hash = hash_prefix(path, self.prefix_bytes).await?;
        debug!("Hashed {} -> {}", path.display(), hash);
        self.memo.lock().insert(
            path.to_path_buf(),
            MemoEntry {
                size,
                modified,
                hash: hash.clone(),
            },
        );
        Ok(hash)
    }

    /// Number of memoized paths
    pub fn memo_len(&self) -> usize {
        self.memo.lock().len()
    }

    /// Resolve an address and hash the file behind it
    pub async fn hash_address(
        &self,
        address: &VideoAddress,
    ) -> Result<(ResolvedVideo, ContentHash), LibraryError> {
        let resolved = resolve(&self.registry, address).await?;
        let hash = self.hash_file(&resolved.full_path).await?;
        Ok((resolved, hash))
    }

    /// Title and tags for a video; empty defaults when untagged
    pub async fn get_details(&self, address: &VideoAddress) -> Result<VideoDetails, LibraryError> {
        let (_, hash) = self.hash_address(address).await?;
        Ok(self
            .details_for_hash(&hash)
            .await
            .map(|record| VideoDetails {
                title: record.title,
                tags: record.tags,
            })
            .unwrap_or_default())
    }

    /// Record stored under a hash, if any
    pub async fn details_for_hash(&self, hash: &ContentHash) -> Option<ContentRecord> {
        self.db.read().await.videos.get(hash).cloned()
    }

    /// Replace a video's title and tags, reconciling the tag index
    pub async fn upsert_title_and_tags(
        &self,
        address: &VideoAddress,
        title: &str,
        tags: TagMap,
    ) -> Result<ContentHash, LibraryError> {
        self.update_metadata(address, Some(title), Some(tags)).await
    }

    /// Change only the title; stored tags and the index stay as they are
    pub async fn update_title(
        &self,
        address: &VideoAddress,
        title: &str,
    ) -> Result<ContentHash, LibraryError> {
        self.update_metadata(address, Some(title), None).await
    }

    /// Update the given fields of a video's record, creating it if absent.
    ///
    /// The current record is read, changed and persisted under one write
    /// guard (and, for file stores, one file lock), so concurrent edits are
    /// serialized and none is lost. Fields passed as `None` keep whatever
    /// the stored record holds at that moment.
    pub async fn update_metadata(
        &self,
        address: &VideoAddress,
        title: Option<&str>,
        tags: Option<TagMap>,
    ) -> Result<ContentHash, LibraryError> {
        let (_, hash) = self.hash_address(address).await?;
        let tags = tags.map(normalize_tags);
        let hint = address.encode();

        let mut db = self.db.write().await;
        let next = self
            .store
            .update(Box::new(|doc: &mut PrimaryDb| -> Result<(), LibraryError> {
                let record = doc.videos.entry(hash.clone()).or_default();
                record.file_name_hint = hint;
                if let Some(title) = title {
                    record.title = title.to_string();
                }
                if let Some(tags) = tags {
                    let old_tags = std::mem::replace(&mut record.tags, tags.clone());
                    reconcile_index(&mut doc.tag_categories, &hash, &old_tags, &tags);
                }
                Ok(())
            }))
            .await?;
        *db = next;

        info!("Updated metadata for {} ({})", address, hash);
        Ok(hash)
    }

    /// Create an empty tag category
    pub async fn add_category(&self, name: &str) -> Result<(), LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::invalid("Invalid category name"));
        }

        let mut db = self.db.write().await;
        let next = self
            .store
            .update(Box::new(|doc: &mut PrimaryDb| -> Result<(), LibraryError> {
                if doc.tag_categories.contains_key(name) {
                    return Err(LibraryError::conflict("Category already exists"));
                }
                doc.tag_categories.insert(name.to_string(), BTreeMap::new());
                Ok(())
            }))
            .await?;
        *db = next;

        info!("Added tag category {}", name);
        Ok(())
    }

    /// Snapshot of the tag index
    pub async fn tag_categories(&self) -> TagIndex {
        self.db.read().await.tag_categories.clone()
    }

    /// Regenerate the tag index from the records, persisting only when it
    /// changed. Returns the number of (category, tag) pairs.
    pub async fn rebuild_index(&self) -> Result<usize, LibraryError> {
        let mut db = self.db.write().await;
        if build_index(&db.videos, &db.tag_categories) == db.tag_categories {
            return Ok(count_pairs(&db.tag_categories));
        }

        let next = self
            .store
            .update(Box::new(|doc: &mut PrimaryDb| -> Result<(), LibraryError> {
                doc.tag_categories = build_index(&doc.videos, &doc.tag_categories);
                Ok(())
            }))
            .await?;
        *db = next;

        let pairs = count_pairs(&db.tag_categories);
        info!("Tag index rebuilt ({} tags)", pairs);
        Ok(pairs)
    }
}

fn count_pairs(index: &TagIndex) -> usize {
    index.values().map(BTreeMap::len).sum()
}

/// Apply one record's tag change to the index.
///
/// Removed (category, tag) pairs drop the hash and delete tags left empty;
/// present pairs get the hash with set semantics. Category keys are never
/// removed here.
pub fn reconcile_index(index: &mut TagIndex, hash: &ContentHash, old: &TagMap, new: &TagMap) {
    for (category, tags) in old {
        let kept = new.get(category);
        for tag in tags {
            if kept.map_or(false, |k| k.contains(tag)) {
                continue;
            }
            if let Some(bucket) = index.get_mut(category) {
                if let Some(hashes) = bucket.get_mut(tag) {
                    hashes.retain(|h| h != hash);
                    if hashes.is_empty() {
                        bucket.remove(tag);
                    }
                }
            }
        }
    }

    for (category, tags) in new {
        let bucket = index.entry(category.clone()).or_default();
        for tag in tags {
            insert_sorted(bucket.entry(tag.clone()).or_default(), hash);
        }
    }
}

/// Build the index from scratch. Existing category keys survive as empty
/// buckets when no record uses them.
pub fn build_index(videos: &BTreeMap<ContentHash, ContentRecord>, existing: &TagIndex) -> TagIndex {
    let mut index: TagIndex = existing
        .keys()
        .map(|category| (category.clone(), BTreeMap::new()))
        .collect();

    for (hash, record) in videos {
        reconcile_index(&mut index, hash, &TagMap::new(), &record.tags);
    }

    index
}

fn insert_sorted(hashes: &mut Vec<ContentHash>, hash: &ContentHash) {
    if let Err(pos) = hashes.binary_search(hash) {
        hashes.insert(pos, hash.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn h(s: &str) -> ContentHash {
        ContentHash(s.to_string())
    }

    fn tags(pairs: &[(&str, &[&str])]) -> TagMap {
        pairs
            .iter()
            .map(|(c, ts)| (c.to_string(), ts.iter().map(|t| t.to_string()).collect()))
            .collect()
    }

    #[tokio::test]
    async fn test_hash_prefix_only_reads_prefix() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");

        let mut content = vec![7u8; 64];
        std::fs::write(&a, &content).unwrap();
        content.extend_from_slice(b"trailing bytes differ");
        std::fs::write(&b, &content).unwrap();

        let ha = hash_prefix(&a, 64).await.unwrap();
        let hb = hash_prefix(&b, 64).await.unwrap();
        assert_eq!(ha, hb);
        assert_eq!(ha.as_str().len(), 64);

        let full_b = hash_prefix(&b, DEFAULT_PREFIX_BYTES).await.unwrap();
        assert_ne!(ha, full_b);
    }

    #[tokio::test]
    async fn test_hash_empty_file() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty.mp4");
        std::fs::write(&empty, b"").unwrap();

        let hash = hash_prefix(&empty, DEFAULT_PREFIX_BYTES).await.unwrap();
        // SHA-256 of the empty input
        assert_eq!(
            hash.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_reconcile_add_and_remove() {
        let mut index = TagIndex::new();
        let hash = h("aa");

        let first = tags(&[("Genre", &["Action", "Drama"])]);
        reconcile_index(&mut index, &hash, &TagMap::new(), &first);
        assert_eq!(index["Genre"]["Action"], vec![hash.clone()]);
        assert_eq!(index["Genre"]["Drama"], vec![hash.clone()]);

        let second = tags(&[("Genre", &["Action"])]);
        reconcile_index(&mut index, &hash, &first, &second);
        assert_eq!(index["Genre"]["Action"], vec![hash.clone()]);
        assert!(!index["Genre"].contains_key("Drama"));
    }

    #[test]
    fn test_reconcile_shared_tag_keeps_other_hashes() {
        let mut index = TagIndex::new();
        let one = tags(&[("Genre", &["Action"])]);
        reconcile_index(&mut index, &h("bb"), &TagMap::new(), &one);
        reconcile_index(&mut index, &h("aa"), &TagMap::new(), &one);
        assert_eq!(index["Genre"]["Action"], vec![h("aa"), h("bb")]);

        reconcile_index(&mut index, &h("aa"), &one, &TagMap::new());
        assert_eq!(index["Genre"]["Action"], vec![h("bb")]);
        // Category keys survive even when emptied
        reconcile_index(&mut index, &h("bb"), &one, &TagMap::new());
        assert!(index["Genre"].is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut index = TagIndex::new();
        let t = tags(&[("Genre", &["Action"]), ("Mood", &["Calm"])]);
        reconcile_index(&mut index, &h("aa"), &TagMap::new(), &t);
        let snapshot = index.clone();
        reconcile_index(&mut index, &h("aa"), &t, &t);
        assert_eq!(index, snapshot);
    }

    #[test]
    fn test_build_index_keeps_empty_categories() {
        let mut existing = TagIndex::new();
        existing.insert("Empty".to_string(), BTreeMap::new());
        existing
            .entry("Stale".to_string())
            .or_default()
            .insert("Ghost".to_string(), vec![h("zz")]);

        let mut videos = BTreeMap::new();
        videos.insert(
            h("aa"),
            ContentRecord {
                file_name_hint: "f0::a.mp4".to_string(),
                title: "A".to_string(),
                tags: tags(&[("Genre", &["Action"])]),
            },
        );

        let index = build_index(&videos, &existing);
        assert!(index["Empty"].is_empty());
        assert!(index["Stale"].is_empty());
        assert_eq!(index["Genre"]["Action"], vec![h("aa")]);
    }
}
