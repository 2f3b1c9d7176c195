//! Sorting and filtering policies over entry listings.
//!
//! Backends return entries in native order; presentation order is decided
//! here by the caller.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::entry::{FileCategory, FileEntry};

/// Field used to order entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Size,
    Date,
    Type,
}

/// A complete sort policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortOption {
    pub field: SortField,
    pub ascending: bool,
    /// Group directories ahead of files regardless of direction.
    pub directories_first: bool,
}

impl Default for SortOption {
    fn default() -> Self {
        Self {
            field: SortField::Name,
            ascending: true,
            directories_first: true,
        }
    }
}

impl SortOption {
    pub fn new(field: SortField, ascending: bool) -> Self {
        Self {
            field,
            ascending,
            ..Self::default()
        }
    }

    /// Compare two entries under this policy.
    pub fn compare(&self, a: &FileEntry, b: &FileEntry) -> Ordering {
        if self.directories_first && a.is_directory != b.is_directory {
            return if a.is_directory {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        let by_name = || a.name.to_lowercase().cmp(&b.name.to_lowercase());
        let ordering = match self.field {
            SortField::Name => by_name(),
            SortField::Size => a.size.cmp(&b.size).then_with(by_name),
            SortField::Date => a.last_modified.cmp(&b.last_modified).then_with(by_name),
            SortField::Type => type_key(a).cmp(&type_key(b)).then_with(by_name),
        };

        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }

    /// Stable in-place sort.
    pub fn sort(&self, entries: &mut [FileEntry]) {
        entries.sort_by(|a, b| self.compare(a, b));
    }
}

fn type_key(entry: &FileEntry) -> String {
    entry
        .name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Composable listing filter. Every configured predicate must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// Include entries whose name starts with `.`.
    pub show_hidden: bool,
    /// Allowed categories for files. `None` allows all.
    pub categories: Option<HashSet<FileCategory>>,
    /// Inclusive lower size bound for files.
    pub min_size: Option<u64>,
    /// Inclusive upper size bound for files.
    pub max_size: Option<u64>,
    /// Case-insensitive substring that the name must contain.
    pub query: Option<String>,
}

impl FilterOptions {
    pub fn show_hidden(mut self, show: bool) -> Self {
        self.show_hidden = show;
        self
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = FileCategory>) -> Self {
        self.categories = Some(categories.into_iter().collect());
        self
    }

    pub fn size_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Whether a single entry passes every predicate.
    ///
    /// Category and size predicates only constrain files; directories pass
    /// them so that navigation stays possible.
    pub fn matches(&self, entry: &FileEntry) -> bool {
        if !self.show_hidden && entry.is_hidden() {
            return false;
        }

        if !entry.is_directory {
            if let Some(categories) = &self.categories {
                if !categories.contains(&entry.category()) {
                    return false;
                }
            }
            if self.min_size.is_some_and(|min| entry.size < min) {
                return false;
            }
            if self.max_size.is_some_and(|max| entry.size > max) {
                return false;
            }
        }

        match self.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => name_matches(&entry.name, query),
            _ => true,
        }
    }

    /// Keep only matching entries, preserving order.
    pub fn apply(&self, entries: Vec<FileEntry>) -> Vec<FileEntry> {
        entries.into_iter().filter(|e| self.matches(e)).collect()
    }
}

/// Case-insensitive substring match on an entry name.
pub fn name_matches(name: &str, query: &str) -> bool {
    name.to_lowercase().contains(&query.to_lowercase())
}
