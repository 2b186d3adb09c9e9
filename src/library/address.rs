//! Opaque video addresses.
//!
//! Clients never see absolute paths. A video is identified by the folder it
//! lives in plus its file name, serialized as `<folderId>::<fileName>` only
//! at the HTTP/CLI boundary. Decoding splits on the first delimiter and keeps
//! the remainder as the file name; folder ids are generated and never contain
//! the delimiter, so every file name round-trips.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::LibraryError;
use super::registry::FolderRegistry;
use crate::domain::{Folder, FolderId, ImportedVideoRecord, SourceType};

/// Separator between folder id and file name
pub const DELIMITER: &str = "::";

/// A video identified by folder and file name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VideoAddress {
    pub folder_id: FolderId,
    pub file_name: String,
}

impl VideoAddress {
    pub fn new(folder_id: FolderId, file_name: impl Into<String>) -> Self {
        Self {
            folder_id,
            file_name: file_name.into(),
        }
    }

    /// Wire form of the address
    pub fn encode(&self) -> String {
        encode(&self.folder_id, &self.file_name)
    }
}

/// Join a folder id and file name into the wire form
pub fn encode(folder_id: &FolderId, file_name: &str) -> String {
    format!("{}{}{}", folder_id, DELIMITER, file_name)
}

/// Split a wire address on the first delimiter
pub fn decode(address: &str) -> Result<VideoAddress, LibraryError> {
    let (folder_id, file_name) = address
        .split_once(DELIMITER)
        .ok_or_else(|| LibraryError::invalid(format!("Malformed address: {}", address)))?;

    if folder_id.is_empty() || file_name.is_empty() {
        return Err(LibraryError::invalid(format!(
            "Malformed address: {}",
            address
        )));
    }

    Ok(VideoAddress::new(FolderId::new(folder_id), file_name))
}

impl std::fmt::Display for VideoAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.folder_id, DELIMITER, self.file_name)
    }
}

impl std::str::FromStr for VideoAddress {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

impl Serialize for VideoAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for VideoAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        decode(&raw).map_err(serde::de::Error::custom)
    }
}

/// A video address resolved against the registry
#[derive(Debug, Clone)]
pub struct ResolvedVideo {
    pub address: VideoAddress,
    pub folder: Folder,

    /// Absolute path of the video file (exists at resolve time)
    pub full_path: PathBuf,

    /// Imported catalog metadata, when the folder is catalog-backed
    pub imported: Option<ImportedVideoRecord>,

    /// Preview file to stream, if there is one
    pub preview_path: Option<PathBuf>,

    /// Thumbnail file to stream, if there is one
    pub thumbnail_path: Option<PathBuf>,
}

/// Resolve a candidate path: absolute paths pass through, relative ones
/// are taken relative to the folder.
pub fn resolve_candidate(folder_path: &Path, candidate: &str) -> PathBuf {
    let path = Path::new(candidate);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        folder_path.join(path)
    }
}

/// True when `name` is a single plain path component
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Resolve an address to the file on disk plus its preview/thumbnail
/// candidates. Any failure is reported as NotFound.
pub async fn resolve(
    registry: &FolderRegistry,
    address: &VideoAddress,
) -> Result<ResolvedVideo, LibraryError> {
    let folder = registry
        .get(&address.folder_id)
        .await
        .ok_or_else(|| LibraryError::not_found(format!("Unknown folder: {}", address.folder_id)))?;

    let imported_rows = registry.imported(&folder.id).await;

    let (full_path, imported) = if imported_rows.is_empty() {
        if !is_plain_file_name(&address.file_name) {
            return Err(LibraryError::not_found(format!(
                "File not found: {}",
                address
            )));
        }
        (folder.path.join(&address.file_name), None)
    } else {
        // Catalog-backed folders only expose files their catalog lists
        let record = imported_rows
            .into_iter()
            .find(|r| r.file == address.file_name)
            .ok_or_else(|| LibraryError::not_found(format!("File not found: {}", address)))?;
        (resolve_candidate(&folder.path, &record.file), Some(record))
    };

    let is_file = tokio::fs::metadata(&full_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(LibraryError::not_found(format!(
            "File not found: {}",
            address
        )));
    }

    let preview_path = match imported.as_ref().and_then(|r| r.preview_path.as_deref()) {
        Some(candidate) => Some(resolve_candidate(&folder.path, candidate)),
        None if imported.is_none() && folder.source_type == SourceType::Fs => {
            Some(full_path.clone())
        }
        None => None,
    };

    let thumbnail_path = imported
        .as_ref()
        .and_then(|r| r.thumbnail_path.as_deref())
        .map(|candidate| resolve_candidate(&folder.path, candidate));

    Ok(ResolvedVideo {
        address: address.clone(),
        folder,
        full_path,
        imported,
        preview_path,
        thumbnail_path,
    })
}

/// Decode a wire address and resolve it; a malformed address is NotFound
pub async fn resolve_str(
    registry: &FolderRegistry,
    address: &str,
) -> Result<ResolvedVideo, LibraryError> {
    let address = decode(address)
        .map_err(|_| LibraryError::not_found(format!("File not found: {}", address)))?;
    resolve(registry, &address).await
}
