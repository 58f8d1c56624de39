//! Agent-facing filesystem tools.
//!
//! This is where untrusted input meets a backend: each call validates its
//! path, dispatches through [`AsyncBackend`], merges any returned delta into
//! the execution's state map, and renders a [`ToolResponse`].

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::backend::{AsyncBackend, Backend};
use crate::constants::DEFAULT_TOOL_READ_LIMIT;
use crate::error::{BackendError, FileOpError};
use crate::format::{OutputMode, format_grep_matches, truncate_if_too_long};
use crate::paths::{ROOT, validate};
use crate::record::{SharedFiles, apply_files_update};
use crate::types::{FileInfo, GrepOutput};

/// Result of a tool call, serialized as `{"status": "success", ...}` or
/// `{"status": "error", "message": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Success(ToolOutput),
    Error { message: String },
}

/// Payload of a successful call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Entries { entries: Vec<FileInfo> },
    Content { content: String },
    Written { path: String },
    Edited { path: String, occurrences: usize },
    Result { result: String },
}

impl ToolResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<BackendError> for ToolResponse {
    fn from(e: BackendError) -> Self {
        Self::error(e.to_string())
    }
}

/// Filesystem tools bound to one backend and one execution's state map.
#[derive(Debug, Clone)]
pub struct FilesystemTools {
    backend: AsyncBackend,
    state: SharedFiles,
    read_limit: usize,
}

impl FilesystemTools {
    pub fn new(backend: Arc<dyn Backend>, state: SharedFiles) -> Self {
        Self {
            backend: AsyncBackend::new(backend),
            state,
            read_limit: DEFAULT_TOOL_READ_LIMIT,
        }
    }

    /// Page size used when `read_file` is called without a limit.
    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = limit;
        self
    }

    pub fn state(&self) -> &SharedFiles {
        &self.state
    }

    /// List a directory.
    pub async fn ls(&self, path: &str) -> ToolResponse {
        let path = match validate(path, None) {
            Ok(p) => p,
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        match self.backend.ls_info(path).await {
            Ok(entries) => ToolResponse::Success(ToolOutput::Entries { entries }),
            Err(e) => e.into(),
        }
    }

    /// Read a page of a file with line numbers.
    pub async fn read_file(
        &self,
        path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> ToolResponse {
        let path = match validate(path, None) {
            Ok(p) => p,
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        let offset = offset.unwrap_or(0);
        let limit = limit.unwrap_or(self.read_limit);
        match self.backend.read(path, offset, limit).await {
            Ok(Ok(content)) => ToolResponse::Success(ToolOutput::Content { content }),
            Ok(Err(e)) => ToolResponse::error(e.to_string()),
            Err(e) => e.into(),
        }
    }

    /// Create a new file.
    pub async fn write_file(&self, path: &str, content: &str) -> ToolResponse {
        let path = match validate(path, None) {
            Ok(p) => p,
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        match self.backend.write(path.clone(), content).await {
            Ok(Ok(written)) => {
                apply_files_update(&self.state, written.files_update);
                ToolResponse::Success(ToolOutput::Written { path: written.path })
            }
            // The state backend reports an existing key as invalid_path.
            Ok(Err(FileOpError::AlreadyExists)) => exists_error(&path),
            Ok(Err(FileOpError::InvalidPath)) if self.state.read().contains_key(&path) => {
                exists_error(&path)
            }
            Ok(Err(kind)) => ToolResponse::error(kind.to_string()),
            Err(e) => e.into(),
        }
    }

    /// Replace text in an existing file.
    pub async fn edit_file(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> ToolResponse {
        let path = match validate(path, None) {
            Ok(p) => p,
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        match self.backend.edit(path, old, new, replace_all).await {
            Ok(Ok(edited)) => {
                apply_files_update(&self.state, edited.files_update);
                ToolResponse::Success(ToolOutput::Edited {
                    path: edited.path,
                    occurrences: edited.occurrences,
                })
            }
            Ok(Err(e)) => ToolResponse::error(e.to_string()),
            Err(e) => e.into(),
        }
    }

    /// Find files by glob pattern beneath `path` (default `/`).
    pub async fn glob(&self, pattern: &str, path: Option<&str>) -> ToolResponse {
        let path = match validate(path.unwrap_or(ROOT), None) {
            Ok(p) => p,
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        match self.backend.glob_info(pattern, path).await {
            Ok(entries) => ToolResponse::Success(ToolOutput::Entries { entries }),
            Err(e) => e.into(),
        }
    }

    /// Literal text search, rendered per `mode` and truncated to the tool budget.
    pub async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
        mode: OutputMode,
    ) -> ToolResponse {
        let path = match path.map(|p| validate(p, None)).transpose() {
            Ok(p) => p,
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        let raw = match self
            .backend
            .grep_raw(pattern, path, glob.map(str::to_string))
            .await
        {
            Ok(raw) => raw,
            Err(e) => return e.into(),
        };
        let rendered = match raw {
            GrepOutput::Formatted(text) => text,
            GrepOutput::Matches(matches) => {
                debug!(count = matches.len(), %mode, "grep matches");
                format_grep_matches(&matches, mode)
            }
        };
        ToolResponse::Success(ToolOutput::Result {
            result: truncate_if_too_long(&rendered),
        })
    }
}

fn exists_error(path: &str) -> ToolResponse {
    ToolResponse::error(format!("File already exists: {path}. Use edit_file to modify."))
}
