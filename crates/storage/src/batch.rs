//! Multi-item operations that keep going past individual failures.

use serde::Serialize;

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::path;
use crate::tree;

/// One item a batch could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub path: String,
    pub error: String,
}

/// Aggregate result of a batch operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, operation: &str, path: &str, result: StorageResult<()>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                tracing::warn!(operation, path, error = %e, "Batch item failed");
                self.failed.push(BatchFailure {
                    path: path.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Delete every path.
pub fn delete_all<B, I, P>(backend: &B, paths: I) -> BatchOutcome
where
    B: StorageBackend + ?Sized,
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut outcome = BatchOutcome::default();
    for p in paths {
        let p = p.as_ref();
        outcome.record("delete", p, tree::delete_tree(backend, p));
    }
    log_outcome("delete", &outcome);
    outcome
}

/// Copy every path into `dest_dir`, keeping each item's name.
pub fn copy_all<B, I, P>(backend: &B, paths: I, dest_dir: &str) -> BatchOutcome
where
    B: StorageBackend + ?Sized,
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut outcome = BatchOutcome::default();
    for p in paths {
        let p = p.as_ref();
        let result = target_in(p, dest_dir).and_then(|dst| tree::copy_tree(backend, p, &dst));
        outcome.record("copy", p, result);
    }
    log_outcome("copy", &outcome);
    outcome
}

/// Move every path into `dest_dir`, keeping each item's name.
pub fn move_all<B, I, P>(backend: &B, paths: I, dest_dir: &str) -> BatchOutcome
where
    B: StorageBackend + ?Sized,
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut outcome = BatchOutcome::default();
    for p in paths {
        let p = p.as_ref();
        let result = target_in(p, dest_dir).and_then(|dst| tree::move_tree(backend, p, &dst));
        outcome.record("move", p, result);
    }
    log_outcome("move", &outcome);
    outcome
}

fn target_in(src: &str, dest_dir: &str) -> StorageResult<String> {
    let src = path::normalize(src)?;
    let dest_dir = path::normalize(dest_dir)?;
    let name = path::file_name(&src)
        .ok_or_else(|| StorageError::InvalidPath(format!("path has no file name: {src}")))?;
    Ok(path::join(&dest_dir, name))
}

fn log_outcome(operation: &str, outcome: &BatchOutcome) {
    tracing::info!(
        operation,
        succeeded = outcome.succeeded,
        failed = outcome.failed_count(),
        "Batch finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, String) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_string_lossy().to_string();
        fs::write(temp.path().join("a.txt"), b"aaa").unwrap();
        fs::write(temp.path().join("b.txt"), b"bb").unwrap();
        fs::create_dir(temp.path().join("dir")).unwrap();
        fs::write(temp.path().join("dir/c.txt"), b"c").unwrap();
        fs::create_dir(temp.path().join("dest")).unwrap();
        (temp, root)
    }

    #[test]
    fn test_delete_all_continues_past_missing() {
        let (temp, root) = setup();
        let backend = LocalBackend::new();
        let paths = [
            format!("{root}/a.txt"),
            format!("{root}/missing.txt"),
            format!("{root}/dir"),
        ];

        let outcome = delete_all(&backend, &paths);

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed_count(), 1);
        assert!(outcome.failed[0].path.ends_with("missing.txt"));
        assert!(!temp.path().join("a.txt").exists());
        assert!(!temp.path().join("dir").exists());
        assert!(temp.path().join("b.txt").exists());
    }

    #[test]
    fn test_copy_all_into_directory() {
        let (temp, root) = setup();
        let backend = LocalBackend::new();
        let paths = [format!("{root}/a.txt"), format!("{root}/dir")];

        let outcome = copy_all(&backend, &paths, &format!("{root}/dest"));

        assert!(outcome.is_complete_success());
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(fs::read(temp.path().join("dest/a.txt")).unwrap(), b"aaa");
        assert_eq!(fs::read(temp.path().join("dest/dir/c.txt")).unwrap(), b"c");
        assert!(temp.path().join("a.txt").exists());
    }

    #[test]
    fn test_move_all_reports_conflicts() {
        let (temp, root) = setup();
        fs::write(temp.path().join("dest/b.txt"), b"existing").unwrap();
        let backend = LocalBackend::new();
        let paths = [format!("{root}/a.txt"), format!("{root}/b.txt")];

        let outcome = move_all(&backend, &paths, &format!("{root}/dest"));

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed_count(), 1);
        assert!(outcome.failed[0].error.contains("already exists"));
        assert!(!temp.path().join("a.txt").exists());
        assert!(temp.path().join("dest/a.txt").exists());
        assert!(temp.path().join("b.txt").exists());
        assert_eq!(fs::read(temp.path().join("dest/b.txt")).unwrap(), b"existing");
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = BatchOutcome {
            succeeded: 1,
            failed: vec![BatchFailure {
                path: "/x".to_string(),
                error: "not found: /x".to_string(),
            }],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failed"][0]["path"], "/x");
    }
}
