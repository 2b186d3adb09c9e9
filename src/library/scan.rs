//! Directory scanning for video files.

use std::io;
use std::path::Path;

use futures::future::join_all;
use tokio::fs;

use super::catalog::compare_file_names;

/// Recognized video file extensions (lowercase, without the dot)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoExtensions(Vec<String>);

impl Default for VideoExtensions {
    fn default() -> Self {
        Self::new(["mp4", "mkv", "mov", "avi"])
    }
}

impl VideoExtensions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// Check a path's extension, case-insensitively
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_lowercase();
                self.0.iter().any(|known| *known == e)
            })
            .unwrap_or(false)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// List video file names directly inside `dir`, sorted by name ignoring case.
///
/// Not recursive. Non-UTF-8 names are skipped.
pub async fn scan_directory(dir: &Path, extensions: &VideoExtensions) -> io::Result<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !extensions.matches(&path) {
            continue;
        }
        // Follow symlinks so linked videos are listed too
        let is_file = fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    names.sort_by(|a, b| compare_file_names(a, b));
    Ok(names)
}

/// Size of a regular file, `None` if it is missing or not a file
pub async fn file_size(path: &Path) -> Option<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Stat many files concurrently; missing files come back as `None`
pub async fn file_sizes<P: AsRef<Path>>(paths: &[P]) -> Vec<Option<u64>> {
    join_all(paths.iter().map(|p| file_size(p.as_ref()))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_matching() {
        let exts = VideoExtensions::default();
        assert!(exts.matches(Path::new("a.mp4")));
        assert!(exts.matches(Path::new("A.MKV")));
        assert!(exts.matches(Path::new("dir/b.Mov")));
        assert!(!exts.matches(Path::new("notes.txt")));
        assert!(!exts.matches(Path::new("mp4")));

        let custom = VideoExtensions::new([".WebM"]);
        assert!(custom.matches(Path::new("x.webm")));
    }

    #[tokio::test]
    async fn test_scan_directory_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.mp4"), b"b").unwrap();
        std::fs::write(temp.path().join("a.MKV"), b"a").unwrap();
        std::fs::write(temp.path().join("readme.txt"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("dir.mp4")).unwrap();

        let names = scan_directory(temp.path(), &VideoExtensions::default())
            .await
            .unwrap();
        assert_eq!(names, vec!["a.MKV".to_string(), "b.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_scan_missing_directory_errors() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");
        assert!(scan_directory(&missing, &VideoExtensions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_file_sizes() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("a.mp4");
        std::fs::write(&present, vec![0u8; 42]).unwrap();
        let missing = temp.path().join("b.mp4");

        let sizes = file_sizes(&[present, missing]).await;
        assert_eq!(sizes, vec![Some(42), None]);
    }
}
