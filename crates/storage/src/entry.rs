//! Backend-agnostic file and directory descriptions.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::path;

/// Broad content category of a file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Code,
    Other,
}

impl FileCategory {
    /// Classify a lower-case extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "heic" | "svg" | "tif" | "tiff" => {
                FileCategory::Image
            }
            "mp4" | "mkv" | "avi" | "mov" | "wmv" | "webm" | "m4v" | "flv" | "ts" => {
                FileCategory::Video
            }
            "mp3" | "flac" | "wav" | "aac" | "ogg" | "m4a" | "opus" | "wma" => FileCategory::Audio,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "txt"
            | "md" | "rtf" | "csv" | "epub" => FileCategory::Document,
            "zip" | "tar" | "gz" | "tgz" | "bz2" | "xz" | "7z" | "rar" | "zst" => {
                FileCategory::Archive
            }
            "rs" | "py" | "js" | "java" | "kt" | "c" | "h" | "cpp" | "go" | "sh" | "json"
            | "toml" | "yaml" | "yml" | "xml" | "html" | "css" => FileCategory::Code,
            _ => FileCategory::Other,
        }
    }
}

/// Category plus a human-readable type name, e.g. `PDF document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileType {
    pub category: FileCategory,
    pub display_name: String,
}

impl FileType {
    /// Derive the file type from a file name. Returns `None` without an extension.
    pub fn from_name(name: &str) -> Option<Self> {
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        let ext = ext.to_ascii_lowercase();
        let category = FileCategory::from_extension(&ext);
        let kind = match category {
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Audio => "audio",
            FileCategory::Document => "document",
            FileCategory::Archive => "archive",
            FileCategory::Code => "source file",
            FileCategory::Other => "file",
        };
        Some(Self {
            category,
            display_name: format!("{} {}", ext.to_ascii_uppercase(), kind),
        })
    }
}

/// A single file or directory on some backend.
///
/// `id` is the canonical absolute path on the owning backend, so it is only
/// unique per backend. Entries are plain values: a mutation yields a fresh
/// entry rather than updating an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    /// Entry name (not full path).
    pub name: String,
    /// Uniform absolute path.
    pub path: String,
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modified timestamp (Unix epoch milliseconds).
    pub last_modified: i64,
    pub file_type: Option<FileType>,
}

impl FileEntry {
    /// Build a file entry; the file type is derived from the name.
    pub fn file(path: impl Into<String>, size: u64, last_modified: i64) -> Self {
        let path = path.into();
        let name = path::file_name(&path).unwrap_or(path::ROOT).to_string();
        let file_type = FileType::from_name(&name);
        Self {
            id: path.clone(),
            name,
            path,
            is_directory: false,
            size,
            last_modified,
            file_type,
        }
    }

    /// Build a directory entry.
    pub fn directory(path: impl Into<String>, last_modified: i64) -> Self {
        let path = path.into();
        let name = path::file_name(&path).unwrap_or(path::ROOT).to_string();
        Self {
            id: path.clone(),
            name,
            path,
            is_directory: true,
            size: 0,
            last_modified,
            file_type: None,
        }
    }

    /// Uniform path of the containing directory.
    pub fn parent_path(&self) -> Option<String> {
        path::parent(&self.path)
    }

    /// Whether the entry name marks it hidden.
    pub fn is_hidden(&self) -> bool {
        path::is_hidden(&self.name)
    }

    /// Content category; directories and extension-less files are `Other`.
    pub fn category(&self) -> FileCategory {
        self.file_type
            .as_ref()
            .map(|t| t.category)
            .unwrap_or(FileCategory::Other)
    }
}

/// Convert a timestamp to Unix epoch milliseconds (0 before the epoch).
pub fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Current time in Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    epoch_millis(SystemTime::now())
}
