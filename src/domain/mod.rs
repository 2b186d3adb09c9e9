//! Domain types for the video catalog.
//!
//! This module contains the core data structures:
//! - Folder: Registered source folders and their identifiers
//! - Video: Imported catalog records and hash-keyed content records

pub mod folder;
pub mod video;

// Re-export commonly used types
pub use folder::{Folder, FolderId, FolderView, SourceType};
pub use video::{normalize_record, normalize_tags, ContentRecord, ImportedVideoRecord, TagMap};
