//! Command-line interface for vidshelf.
//!
//! Provides commands for serving the library over HTTP, managing source
//! folders, importing catalogs and editing video metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::config;
use crate::domain::TagMap;
use crate::library::{decode, document_paths, Library};
use crate::server::{start_server, AppState};

pub mod folders;

/// vidshelf - Rename-safe video catalog and streaming server
#[derive(Parser, Debug)]
#[command(name = "vidshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to (defaults to server.bind from config)
        #[arg(short, long, env = "VIDSHELF_BIND")]
        address: Option<String>,
    },

    /// Manage source folders
    Folders {
        #[command(subcommand)]
        command: folders::FolderCommands,
    },

    /// Import a JSON catalog ({path: [records]} or {data: {...}})
    Import {
        /// Catalog file
        file: PathBuf,
    },

    /// Search the catalog
    Search {
        /// Search query
        query: String,
    },

    /// Set the title and tags of a video
    Tag {
        /// Video address (<folderId>::<fileName>)
        address: String,

        /// New title (kept when omitted)
        #[arg(long)]
        title: Option<String>,

        /// Tag as Category=Tag; repeatable. Replaces all tags when given.
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Show the tag index, or add a category
    Categories {
        #[command(subcommand)]
        command: Option<CategoryCommands>,
    },

    /// Rebuild the tag index from the stored records
    Reindex,

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommands {
    /// Add an empty tag category
    Add {
        /// Category name
        name: String,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve { address } => serve(address).await,
            Commands::Folders { command } => execute_folders(command).await,
            Commands::Import { file } => import_catalog(&file).await,
            Commands::Search { query } => search_library(&query).await,
            Commands::Tag {
                address,
                title,
                tags,
            } => tag_video(&address, title, &tags).await,
            Commands::Categories { command } => categories(command).await,
            Commands::Reindex => reindex().await,
            Commands::Config => show_config().await,
        }
    }
}

/// Open the library configured for this process
async fn open_library() -> Result<Library> {
    let cfg = config::config()?;
    Library::open(&cfg.home, cfg.library_options())
        .await
        .with_context(|| format!("Failed to open library at {}", cfg.home.display()))
}

/// Execute folder subcommands
async fn execute_folders(command: folders::FolderCommands) -> Result<()> {
    let library = open_library().await?;
    match command {
        folders::FolderCommands::List => folders::execute_list(&library).await,
        folders::FolderCommands::Add { path } => folders::execute_add(&library, &path).await,
        folders::FolderCommands::Remove { id } => folders::execute_remove(&library, &id).await,
        folders::FolderCommands::Activate { ids } => {
            folders::execute_activate(&library, &ids).await
        }
    }
}

async fn serve(address: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let address = address.unwrap_or_else(|| cfg.bind.clone());

    let library = open_library().await?;
    let state = AppState::new(library).with_page_size(cfg.page_size);
    start_server(state, &address).await
}

/// Parse a catalog file: either `{path: [records]}` or `{data: {path: [records]}}`
fn parse_catalog(content: &str) -> Result<BTreeMap<String, Vec<Value>>> {
    let mut value: Value = serde_json::from_str(content).context("Catalog is not valid JSON")?;

    let data = if value.get("data").map_or(false, Value::is_object) {
        value["data"].take()
    } else {
        value
    };

    let Value::Object(map) = data else {
        anyhow::bail!("Catalog must be an object of folder path -> records");
    };

    Ok(map
        .into_iter()
        .filter_map(|(path, records)| match records {
            Value::Array(records) => Some((path, records)),
            _ => {
                tracing::warn!("Skipping catalog entry for {}: not an array", path);
                None
            }
        })
        .collect())
}

async fn import_catalog(file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read catalog file: {}", file.display()))?;
    let data = parse_catalog(&content)?;

    if data.is_empty() {
        println!("Catalog contains no folders.");
        return Ok(());
    }

    let library = open_library().await?;
    let summary = library.registry.import_json_catalog(data).await?;

    println!("✓ Imported {}", file.display());
    println!("  Added folders:   {}", summary.added_folders);
    println!("  Updated folders: {}", summary.updated_folders);
    println!("  Videos:          {}", summary.total_videos);

    Ok(())
}

/// Search the library
async fn search_library(query: &str) -> Result<()> {
    let library = open_library().await?;
    let results = library.catalog.search(query).await;

    if results.is_empty() {
        println!("No results found for: {}", query);
        return Ok(());
    }

    println!("Found {} results for '{}':\n", results.len(), query);
    for address in &results {
        println!("  {}", address);
    }

    Ok(())
}

/// Parse repeated `Category=Tag` arguments
fn parse_tag_args(args: &[String]) -> Result<TagMap> {
    let mut tags = TagMap::new();
    for arg in args {
        let (category, tag) = arg
            .split_once('=')
            .with_context(|| format!("Tag must be Category=Tag, got: {}", arg))?;
        tags.entry(category.trim().to_string())
            .or_default()
            .push(tag.trim().to_string());
    }
    Ok(tags)
}

async fn tag_video(address: &str, title: Option<String>, tag_args: &[String]) -> Result<()> {
    let address = decode(address)?;
    let library = open_library().await?;

    let tags = if tag_args.is_empty() {
        None
    } else {
        Some(parse_tag_args(tag_args)?)
    };

    let hash = library
        .hashes
        .update_metadata(&address, title.as_deref(), tags)
        .await?;

    let details = library.hashes.get_details(&address).await?;
    println!("✓ Updated {}", address);
    println!("  Hash:  {}", hash);
    println!("  Title: {}", details.title);
    for (category, values) in &details.tags {
        println!("  {}: {}", category, values.join(", "));
    }

    Ok(())
}

async fn categories(command: Option<CategoryCommands>) -> Result<()> {
    let library = open_library().await?;

    if let Some(CategoryCommands::Add { name }) = command {
        library.hashes.add_category(&name).await?;
        println!("✓ Added category: {}", name.trim());
        return Ok(());
    }

    let index = library.hashes.tag_categories().await;
    if index.is_empty() {
        println!("No tag categories yet.");
        return Ok(());
    }

    for (category, tags) in &index {
        println!("{}", category);
        if tags.is_empty() {
            println!("  (no tags)");
        }
        for (tag, hashes) in tags {
            println!("  {:<30} {} videos", tag, hashes.len());
        }
    }

    Ok(())
}

async fn reindex() -> Result<()> {
    let library = open_library().await?;
    let pairs = library.hashes.rebuild_index().await?;
    println!("✓ Tag index holds {} tags", pairs);
    Ok(())
}

async fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let [folders_path, imported_path, db_path] = document_paths(&cfg.home);

    println!("vidshelf configuration");
    println!("======================");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Folders:   {}", folders_path.display());
    println!("  Imported:  {}", imported_path.display());
    println!("  Database:  {}", db_path.display());
    println!();
    println!("Server:");
    println!("  Bind:      {}", cfg.bind);
    println!("  Page size: {}", cfg.page_size);
    println!();
    println!("Library:");
    println!("  Extensions:   {}", cfg.video_extensions.as_slice().join(", "));
    println!("  Hash prefix:  {} bytes", cfg.hash_prefix_bytes);

    Ok(())
}
