//! Configuration for vidshelf.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VIDSHELF_HOME, VIDSHELF_BIND)
//! 2. Config file (.vidshelf/config.yaml)
//! 3. Defaults (~/.vidshelf, 0.0.0.0:3000)
//!
//! Config file discovery:
//! - Searches current directory and parents for .vidshelf/config.yaml
//! - `paths.home` is relative to the .vidshelf/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::library::{LibraryOptions, VideoExtensions, DEFAULT_PREFIX_BYTES};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_PAGE_SIZE: usize = 150;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .vidshelf/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryConfig {
    pub video_extensions: Option<Vec<String>>,
    pub hash_prefix_bytes: Option<u64>,
    pub page_size: Option<usize>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory holding folders.json, imported.json and db.json
    pub home: PathBuf,
    /// Listen address for `serve`
    pub bind: String,
    pub video_extensions: VideoExtensions,
    pub hash_prefix_bytes: u64,
    /// Default page size of the home feed
    pub page_size: usize,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn library_options(&self) -> LibraryOptions {
        LibraryOptions {
            extensions: self.video_extensions.clone(),
            hash_prefix_bytes: self.hash_prefix_bytes,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".vidshelf").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge a parsed config file, env overrides and defaults
fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    env_home: Option<String>,
    env_bind: Option<String>,
) -> Result<ResolvedConfig> {
    let home = match (env_home, &file.paths.home, &config_file) {
        (Some(env), _, _) => PathBuf::from(env),
        (None, Some(home), Some(config_path)) => {
            let vidshelf_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(vidshelf_dir, home)
        }
        (None, Some(home), None) => PathBuf::from(home),
        (None, None, _) => dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".vidshelf"),
    };

    let bind = env_bind
        .or(file.server.bind)
        .unwrap_or_else(|| DEFAULT_BIND.to_string());

    let video_extensions = match file.library.video_extensions {
        Some(list) if !list.is_empty() => VideoExtensions::new(list),
        _ => VideoExtensions::default(),
    };

    Ok(ResolvedConfig {
        home,
        bind,
        video_extensions,
        hash_prefix_bytes: file
            .library
            .hash_prefix_bytes
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PREFIX_BYTES),
        page_size: file
            .library
            .page_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE),
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_file = find_config_file();
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(
        file,
        config_file,
        std::env::var("VIDSHELF_HOME").ok(),
        std::env::var("VIDSHELF_BIND").ok(),
    )
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Resolve the configuration again from its sources.
///
/// The value cached by [`config`] is left as it is; callers that need the
/// fresh settings use the returned value.
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the vidshelf state directory
pub fn vidshelf_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(ConfigFile::default(), None, None, None).unwrap();

        let expected_home = dirs::home_dir().unwrap().join(".vidshelf");
        assert_eq!(config.home, expected_home);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.hash_prefix_bytes, DEFAULT_PREFIX_BYTES);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.video_extensions, VideoExtensions::default());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let vidshelf_dir = temp.path().join(".vidshelf");
        std::fs::create_dir_all(&vidshelf_dir).unwrap();

        let config_path = vidshelf_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
server:
  bind: 127.0.0.1:8080
library:
  video_extensions: [mp4, webm]
  hash_prefix_bytes: 4096
  page_size: 50
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("1.0"));
        assert_eq!(parsed.paths.home.as_deref(), Some("./state"));

        let config = resolve(parsed, Some(config_path), None, None).unwrap();
        assert_eq!(config.home, vidshelf_dir.join("./state"));
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.hash_prefix_bytes, 4096);
        assert_eq!(config.page_size, 50);
        assert!(config.video_extensions.matches(Path::new("a.webm")));
        assert!(!config.video_extensions.matches(Path::new("a.mkv")));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            server: ServerConfig {
                bind: Some("127.0.0.1:1".to_string()),
            },
            paths: PathsConfig {
                home: Some("/from/file".to_string()),
            },
            ..Default::default()
        };

        let config = resolve(
            file,
            None,
            Some("/from/env".to_string()),
            Some("127.0.0.1:2".to_string()),
        )
        .unwrap();
        assert_eq!(config.home, PathBuf::from("/from/env"));
        assert_eq!(config.bind, "127.0.0.1:2");
    }

    #[test]
    fn test_reload_resolves_from_sources_and_keeps_cache() {
        let cached = config().unwrap();
        let cached_ptr: *const ResolvedConfig = cached;

        let fresh = reload_config().unwrap();
        assert_eq!(fresh.home, cached.home);
        assert_eq!(fresh.bind, cached.bind);
        assert_eq!(fresh.config_file, cached.config_file);

        // Same cached instance before and after
        assert!(std::ptr::eq(cached_ptr, config().unwrap()));
    }

    #[test]
    fn test_zero_tunables_fall_back() {
        let file = ConfigFile {
            library: LibraryConfig {
                video_extensions: Some(vec![]),
                hash_prefix_bytes: Some(0),
                page_size: Some(0),
            },
            ..Default::default()
        };
        let config = resolve(file, None, Some("/h".to_string()), None).unwrap();
        assert_eq!(config.hash_prefix_bytes, DEFAULT_PREFIX_BYTES);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.video_extensions, VideoExtensions::default());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
