//! Folder CLI subcommands for managing the library's sources.
//!
//! Provides commands to:
//! - `list`: Show registered folders with video counts and sizes
//! - `add`: Register a directory to scan
//! - `remove`: Delete a folder (and its imported catalog)
//! - `activate`: Choose which folders feed the catalog

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::domain::FolderId;
use crate::library::Library;

/// Folder-related subcommands
#[derive(Subcommand, Debug)]
pub enum FolderCommands {
    /// List registered folders
    List,

    /// Register a directory of videos
    Add {
        /// Directory path
        path: String,
    },

    /// Remove a folder by id
    Remove {
        /// Folder id (e.g. f0)
        id: String,
    },

    /// Make exactly the given folders active
    Activate {
        /// Folder ids; none deactivates everything
        ids: Vec<String>,
    },
}

/// Render a byte count for tables
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub async fn execute_list(library: &Library) -> Result<()> {
    let folders = library.registry.list().await;

    if folders.is_empty() {
        println!("No folders registered. Use 'vidshelf folders add <path>' to add one.");
        return Ok(());
    }

    println!(
        "{:<6} {:<6} {:<7} {:>7} {:>10}  {}",
        "ID", "TYPE", "ACTIVE", "VIDEOS", "SIZE", "PATH"
    );
    println!("{}", "-".repeat(80));

    for view in &folders {
        let folder = &view.folder;
        println!(
            "{:<6} {:<6} {:<7} {:>7} {:>10}  {}",
            folder.id.as_str(),
            folder.source_type.to_string(),
            if folder.active { "yes" } else { "no" },
            view.video_count,
            human_size(view.total_size),
            folder.path.display()
        );
    }

    println!("\nTotal: {} folders", folders.len());

    Ok(())
}

pub async fn execute_add(library: &Library, path: &str) -> Result<()> {
    let view = library
        .registry
        .register(path)
        .await
        .with_context(|| format!("Failed to register folder: {}", path))?;

    println!("✓ Added {} ({})", view.folder.id, view.folder.path.display());
    println!("  Videos: {}", view.video_count);
    println!("  Size:   {}", human_size(view.total_size));

    Ok(())
}

pub async fn execute_remove(library: &Library, id: &str) -> Result<()> {
    let removed = library
        .registry
        .delete(&FolderId::new(id))
        .await
        .with_context(|| format!("Failed to remove folder: {}", id))?;

    println!("✓ Removed {} ({})", removed.id, removed.path.display());

    Ok(())
}

pub async fn execute_activate(library: &Library, ids: &[String]) -> Result<()> {
    let ids: Vec<FolderId> = ids.iter().map(FolderId::new).collect();
    let folders = library.registry.set_active(&ids).await?;

    for folder in &folders {
        let mark = if folder.active { "✓" } else { " " };
        println!("[{}] {:<6} {}", mark, folder.id.as_str(), folder.path.display());
    }

    let unknown: Vec<&FolderId> = ids
        .iter()
        .filter(|id| !folders.iter().any(|f| &f.id == *id))
        .collect();
    for id in unknown {
        println!("⚠ Unknown folder id ignored: {}", id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }
}
