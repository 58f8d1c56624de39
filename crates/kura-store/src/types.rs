//! Values returned across the backend contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FileOpError;
use crate::record::{FileData, FileMap};

/// A listing or search entry.
///
/// Directory entries never carry `size` or `modified_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Canonical path.
    pub path: String,
    /// True for directories.
    pub is_dir: bool,
    /// Size in bytes (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last modification time (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileInfo {
    /// A file entry.
    pub fn file(path: impl Into<String>, size: u64, modified_at: Option<DateTime<Utc>>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size: Some(size),
            modified_at,
        }
    }

    /// A directory entry.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: None,
            modified_at: None,
        }
    }

    /// A file entry describing an in-memory record.
    pub fn from_record(path: impl Into<String>, data: &FileData) -> Self {
        Self::file(path, data.size(), Some(data.modified_at))
    }
}

/// One matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// File the line belongs to.
    pub path: String,
    /// 1-based line number.
    pub line: usize,
    /// The line text, without its terminator.
    pub text: String,
}

impl GrepMatch {
    pub fn new(path: impl Into<String>, line: usize, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            text: text.into(),
        }
    }
}

/// What `grep_raw` hands back.
///
/// Built-in backends always return `Matches`; `Formatted` exists for
/// backends that can only produce pre-rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrepOutput {
    /// Structured matches.
    Matches(Vec<GrepMatch>),
    /// Pre-rendered output.
    Formatted(String),
}

impl GrepOutput {
    /// The structured matches, if any were returned.
    pub fn matches(&self) -> Option<&[GrepMatch]> {
        match self {
            GrepOutput::Matches(m) => Some(m),
            GrepOutput::Formatted(_) => None,
        }
    }

    /// Consume into matches, treating formatted output as none.
    pub fn into_matches(self) -> Vec<GrepMatch> {
        match self {
            GrepOutput::Matches(m) => m,
            GrepOutput::Formatted(_) => Vec::new(),
        }
    }
}

impl From<Vec<GrepMatch>> for GrepOutput {
    fn from(matches: Vec<GrepMatch>) -> Self {
        GrepOutput::Matches(matches)
    }
}

/// A successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    /// Canonical path of the new file.
    pub path: String,
    /// Delta the caller must merge, for backends that defer mutation.
    pub files_update: Option<FileMap>,
}

/// A successful edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edited {
    /// Canonical path of the edited file.
    pub path: String,
    /// How many occurrences were replaced.
    pub occurrences: usize,
    /// Delta the caller must merge, for backends that defer mutation.
    pub files_update: Option<FileMap>,
}

/// Per-item outcome of a bulk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FileOpError>,
}

impl FileUploadResponse {
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: None,
        }
    }

    pub fn err(path: impl Into<String>, error: FileOpError) -> Self {
        Self {
            path: path.into(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-item outcome of a bulk download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDownloadResponse {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FileOpError>,
}

impl FileDownloadResponse {
    pub fn ok(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content: Some(content),
            error: None,
        }
    }

    pub fn err(path: impl Into<String>, error: FileOpError) -> Self {
        Self {
            path: path.into(),
            content: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
