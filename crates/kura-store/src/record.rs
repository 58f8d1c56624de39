//! Stored file records.
//!
//! In-memory backends keep content as a line sequence because pagination
//! and grep both work per line. Reassembly is `lines.join("\n")`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A file held by an in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Content split on `\n`. Empty content has zero lines.
    pub lines: Vec<String>,
    /// When the file was first written.
    pub created_at: DateTime<Utc>,
    /// When the content last changed.
    pub modified_at: DateTime<Utc>,
}

impl FileData {
    /// Create a record from string content, stamped now.
    pub fn new(content: &str) -> Self {
        let now = Utc::now();
        Self {
            lines: split_lines(content),
            created_at: now,
            modified_at: now,
        }
    }

    /// A copy with new content, keeping `created_at` and bumping `modified_at`.
    pub fn with_content(&self, content: &str) -> Self {
        Self {
            lines: split_lines(content),
            created_at: self.created_at,
            modified_at: Utc::now(),
        }
    }

    /// The full content, lines joined with `\n`.
    pub fn content(&self) -> String {
        self.lines.join("\n")
    }

    /// Size in bytes of [`content`](Self::content), computed without joining.
    pub fn size(&self) -> u64 {
        let bytes: usize = self.lines.iter().map(String::len).sum();
        (bytes + self.lines.len().saturating_sub(1)) as u64
    }

    /// True if the file has no lines at all.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn split_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        Vec::new()
    } else {
        content.split('\n').map(str::to_string).collect()
    }
}

/// Path → record map. Ordered so listings and searches are deterministic.
pub type FileMap = BTreeMap<String, FileData>;

/// A file map owned by an execution context or shared across several.
pub type SharedFiles = Arc<RwLock<FileMap>>;

/// Create an empty shared file map.
pub fn shared_files() -> SharedFiles {
    Arc::new(RwLock::new(FileMap::new()))
}

/// Merge a backend's `files_update` delta into the caller's map.
///
/// A `None` delta means the backend already persisted the change.
pub fn apply_files_update(files: &SharedFiles, update: Option<FileMap>) {
    if let Some(update) = update {
        files.write().extend(update);
    }
}
