//! Video metadata records.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categorized tags: category -> tags
pub type TagMap = BTreeMap<String, Vec<String>>;

/// Category used when an imported record carries a bare tag array
pub const DEFAULT_IMPORT_CATEGORY: &str = "tags";

/// Metadata for one video supplied by a JSON catalog import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedVideoRecord {
    /// File name relative to the folder (or an absolute path)
    pub file: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,

    #[serde(default)]
    pub resolution: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<String>,

    #[serde(default)]
    pub tags: TagMap,

    #[serde(default)]
    pub likes: u64,

    #[serde(default)]
    pub playlists: Vec<String>,
}

impl ImportedVideoRecord {
    /// Iterate over every tag value of the record
    pub fn tag_values(&self) -> impl Iterator<Item = &str> {
        self.tags.values().flatten().map(String::as_str)
    }
}

/// Primary metadata record, keyed by content hash
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Address used by the most recent write; informational only
    #[serde(rename = "fileName", default)]
    pub file_name_hint: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub tags: TagMap,
}

/// Trim tags, drop blanks and duplicates (first occurrence wins).
/// Blank category names are dropped; categories with no tags are kept.
pub fn normalize_tags(tags: TagMap) -> TagMap {
    tags.into_iter()
        .filter_map(|(category, values)| {
            let category = category.trim().to_string();
            if category.is_empty() {
                return None;
            }
            Some((category, dedup_tags(values)))
        })
        .collect()
}

fn dedup_tags(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() || out.iter().any(|v| v == value) {
            continue;
        }
        out.push(value.to_string());
    }
    out
}

/// Normalize one raw imported record, applying defensive defaults.
///
/// Returns `None` when the value is not an object or has no usable `file`.
pub fn normalize_record(raw: &Value) -> Option<ImportedVideoRecord> {
    let obj = raw.as_object()?;

    let file = obj.get("file").and_then(Value::as_str)?.trim().to_string();
    if file.is_empty() {
        return None;
    }

    let title = match obj.get("title").and_then(Value::as_str) {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => Path::new(&file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file.clone()),
    };

    Some(ImportedVideoRecord {
        title,
        description: string_field(obj.get("description")),
        duration: duration_field(obj.get("duration")),
        resolution: string_field(obj.get("resolution")),
        thumbnail_path: optional_path(obj.get("thumbnailPath")),
        preview_path: optional_path(obj.get("previewPath")),
        tags: tags_field(obj.get("tags")),
        likes: obj.get("likes").and_then(Value::as_u64).unwrap_or(0),
        playlists: string_list(obj.get("playlists")),
        file,
    })
}

fn string_field(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

fn optional_path(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn duration_field(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|d| d.is_finite() && *d >= 0.0).unwrap_or(0.0)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn tags_field(value: Option<&Value>) -> TagMap {
    match value {
        Some(Value::Object(categories)) => {
            let tags = categories
                .iter()
                .map(|(category, values)| (category.clone(), string_list(Some(values))))
                .collect();
            normalize_tags(tags)
        }
        Some(Value::Array(_)) => {
            let values = dedup_tags(string_list(value));
            if values.is_empty() {
                TagMap::new()
            } else {
                TagMap::from([(DEFAULT_IMPORT_CATEGORY.to_string(), values)])
            }
        }
        _ => TagMap::new(),
    }
}
