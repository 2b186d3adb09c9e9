//! vidshelf - Rename-safe video catalog and streaming server
//!
//! Federates several video folders (scanned directories or imported JSON
//! catalogs) into one browsable catalog, keeps user titles and tags keyed
//! by file content so they survive renames, and streams files with HTTP
//! byte-range support.
//!
//! # Architecture
//!
//! - Folder configuration, imported catalogs and tag metadata are JSON
//!   documents behind the `store::DocumentStore` trait
//! - Metadata is keyed by a SHA-256 of each file's leading bytes; a derived
//!   tag index maps category -> tag -> hashes
//! - The catalog is rebuilt per request from the active folders; the home
//!   feed pages through one cached shuffle
//!
//! # Modules
//!
//! - `domain`: Data structures (Folder, ImportedVideoRecord, ContentRecord)
//! - `library`: Registry, addressing, content hashing, catalog
//! - `store`: Document persistence (JSON files, in-memory)
//! - `server`: HTTP API and range streaming
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Register a folder and serve it
//! vidshelf folders add ~/Videos
//! vidshelf serve --address 127.0.0.1:3000
//!
//! # Tag a video by address
//! vidshelf tag 'f0::clip.mp4' --title Demo -t Genre=Action
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod library;
pub mod server;
pub mod store;

// Re-export main types at crate root for convenience
pub use domain::{Folder, FolderId, FolderView, ImportedVideoRecord, SourceType, TagMap};
pub use library::{
    CatalogAggregator, ContentHash, ContentHashStore, FolderRegistry, Library, LibraryError,
    LibraryOptions, VideoAddress,
};
pub use server::{build_router, start_server, AppState};
