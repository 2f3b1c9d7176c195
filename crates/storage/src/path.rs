//! Uniform path handling.
//!
//! Every backend speaks absolute, `/`-separated paths with no trailing slash
//! (except the root `/`). Remote paths start with the share name, so
//! `/media/movies` is the `movies` directory of the `media` share.

use crate::error::{StorageError, StorageResult};

/// The root path.
pub const ROOT: &str = "/";

/// Normalize a path into the uniform representation.
///
/// Collapses repeated separators and drops `.` components and trailing
/// slashes. `..` components are rejected rather than resolved. Only `/`
/// separates components; a `\` is an ordinary name character.
pub fn normalize(path: &str) -> StorageResult<String> {
    let mut parts = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                return Err(StorageError::InvalidPath(format!(
                    "parent components are not allowed: {path}"
                )))
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Ok(ROOT.to_string());
    }

    Ok(format!("/{}", parts.join("/")))
}

/// Join a validated child name onto a directory path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT || parent.is_empty() {
        format!("/{name}")
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Parent of a path, or `None` at the root.
pub fn parent(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some(ROOT.to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => None,
    }
}

/// Last component of a path, or `None` at the root.
pub fn file_name(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    trimmed.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Split a path into `(parent, name)`.
pub fn split(path: &str) -> StorageResult<(String, String)> {
    let name = file_name(path)
        .ok_or_else(|| StorageError::InvalidPath(format!("path has no file name: {path}")))?;
    let parent = parent(path)
        .ok_or_else(|| StorageError::InvalidPath(format!("path has no parent: {path}")))?;
    Ok((parent, name.to_string()))
}

/// Validate a single entry name.
pub fn validate_name(name: &str) -> StorageResult<()> {
    if name.trim().is_empty() {
        return Err(StorageError::InvalidName("name is blank".to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(StorageError::InvalidName(format!(
            "name contains a path separator: {name}"
        )));
    }
    if name == "." || name == ".." {
        return Err(StorageError::InvalidName(format!("reserved name: {name}")));
    }
    if name.contains('\0') {
        return Err(StorageError::InvalidName("name contains NUL".to_string()));
    }
    Ok(())
}

/// Whether `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return true;
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Whether a name marks a hidden entry.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("").unwrap(), "/");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("share//docs/").unwrap(), "/share/docs");
        assert_eq!(normalize("/share/./docs").unwrap(), "/share/docs");
        assert_eq!(normalize("/share/we\\ird.txt").unwrap(), "/share/we\\ird.txt");
    }

    #[test]
    fn test_normalize_rejects_parent_components() {
        let result = normalize("/share/../etc");
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join("/", "share"), "/share");
        assert_eq!(join("/share", "docs"), "/share/docs");
        assert_eq!(parent("/share/docs").as_deref(), Some("/share"));
        assert_eq!(parent("/share").as_deref(), Some("/"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn test_file_name_and_split() {
        assert_eq!(file_name("/share/docs/a.txt"), Some("a.txt"));
        assert_eq!(file_name("/"), None);
        let (parent, name) = split("/share/a.txt").unwrap();
        assert_eq!(parent, "/share");
        assert_eq!(name, "a.txt");
        assert!(split("/").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(validate_name("with space").is_ok());
        assert!(matches!(validate_name(""), Err(StorageError::InvalidName(_))));
        assert!(matches!(validate_name("   "), Err(StorageError::InvalidName(_))));
        assert!(matches!(validate_name("a/b"), Err(StorageError::InvalidName(_))));
        assert!(matches!(validate_name("a\\b"), Err(StorageError::InvalidName(_))));
        assert!(matches!(validate_name(".."), Err(StorageError::InvalidName(_))));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }
}
