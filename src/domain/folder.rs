//! Registered source folders.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable folder identifier (`f0`, `f1`, ...)
///
/// Generated from a persisted counter and never reused, so it can never
/// contain the address delimiter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(String);

impl FolderId {
    /// Build the id for the given counter value
    pub fn from_seq(seq: u64) -> Self {
        Self(format!("f{}", seq))
    }

    /// Wrap an id received from a client
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a folder's listing comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Real directory, scanned for video files
    Fs,

    /// Catalog supplied through a JSON import
    Json,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Fs => write!(f, "fs"),
            SourceType::Json => write!(f, "json"),
        }
    }
}

/// A registered folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: FolderId,

    /// Display name (last path component)
    pub name: String,

    /// Absolute folder path
    pub path: PathBuf,

    /// Whether the folder takes part in aggregation
    pub active: bool,

    pub source_type: SourceType,

    /// When the folder was registered
    pub added_at: DateTime<Utc>,
}

impl Folder {
    /// Create a new, active folder
    pub fn new(id: FolderId, path: PathBuf, source_type: SourceType) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            id,
            name,
            path,
            active: true,
            source_type,
            added_at: Utc::now(),
        }
    }
}

/// Folder enriched with live counts, as returned by listings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderView {
    #[serde(flatten)]
    pub folder: Folder,

    /// Number of videos currently listed for the folder
    pub video_count: usize,

    /// Sum of on-disk sizes of those videos
    pub total_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_id_sequence() {
        assert_eq!(FolderId::from_seq(0).as_str(), "f0");
        assert_eq!(FolderId::from_seq(12).to_string(), "f12");
    }

    #[test]
    fn test_folder_name_from_path() {
        let folder = Folder::new(
            FolderId::from_seq(1),
            PathBuf::from("/media/movies"),
            SourceType::Fs,
        );
        assert_eq!(folder.name, "movies");
        assert!(folder.active);
    }

    #[test]
    fn test_folder_serializes_camel_case() {
        let folder = Folder::new(
            FolderId::from_seq(3),
            PathBuf::from("/media/clips"),
            SourceType::Json,
        );
        let json = serde_json::to_value(&folder).unwrap();
        assert_eq!(json["id"], "f3");
        assert_eq!(json["sourceType"], "json");
        assert!(json.get("addedAt").is_some());
    }
}
