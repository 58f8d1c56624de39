//! Execution-scoped backend.
//!
//! Files live in a map owned by one execution context. Writes and edits
//! never touch that map: they return a `files_update` delta and the owner
//! commits it with [`crate::record::apply_files_update`]. Without concurrent
//! writers there is nothing to lock against beyond the map's own guard.

use tracing::instrument;

use crate::edit::perform_string_replacement;
use crate::error::{BackendResult, EditError, FileOpError, ReadError};
use crate::format::format_read_response;
use crate::paths::normalize;
use crate::record::{FileData, FileMap, SharedFiles};
use crate::search::{glob_search_files, grep_matches_from_files, is_directory, list_files};
use crate::types::{
    Edited, FileDownloadResponse, FileInfo, FileUploadResponse, GrepOutput, Written,
};

use super::{Backend, Dispatch, unsupported};

/// Backend over an execution context's file map.
#[derive(Debug, Clone)]
pub struct StateBackend {
    files: SharedFiles,
}

impl StateBackend {
    pub fn new(files: SharedFiles) -> Self {
        Self { files }
    }

    /// The backing map.
    pub fn files(&self) -> &SharedFiles {
        &self.files
    }
}

impl Backend for StateBackend {
    fn name(&self) -> &'static str {
        "StateBackend"
    }

    fn ls_info(&self, path: &str) -> Vec<FileInfo> {
        list_files(&self.files.read(), path)
    }

    #[instrument(name = "backend.read", skip(self), fields(backend = "state"))]
    fn read(&self, path: &str, offset: usize, limit: usize) -> Result<String, ReadError> {
        let normalized = normalize(path);
        let files = self.files.read();
        match files.get(&normalized) {
            Some(data) => Ok(format_read_response(&data.lines, offset, limit)),
            None if is_directory(&files, &normalized) => {
                Err(ReadError::op(FileOpError::IsDirectory, normalized))
            }
            None => Err(ReadError::not_found(normalized)),
        }
    }

    #[instrument(name = "backend.write", skip(self, content), fields(backend = "state"))]
    fn write(&self, path: &str, content: &str) -> Result<Written, FileOpError> {
        let normalized = normalize(path);
        if self.files.read().contains_key(&normalized) {
            return Err(FileOpError::InvalidPath);
        }
        let mut update = FileMap::new();
        update.insert(normalized.clone(), FileData::new(content));
        Ok(Written {
            path: normalized,
            files_update: Some(update),
        })
    }

    #[instrument(name = "backend.edit", skip(self, old, new), fields(backend = "state"))]
    fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<Edited, EditError> {
        let normalized = normalize(path);
        let files = self.files.read();
        let Some(data) = files.get(&normalized) else {
            if is_directory(&files, &normalized) {
                return Err(FileOpError::IsDirectory.into());
            }
            return Err(FileOpError::FileNotFound.into());
        };

        let (content, occurrences) =
            perform_string_replacement(&data.content(), old, new, replace_all)?;
        let mut update = FileMap::new();
        update.insert(normalized.clone(), data.with_content(&content));
        Ok(Edited {
            path: normalized,
            occurrences,
            files_update: Some(update),
        })
    }

    #[instrument(name = "backend.grep", skip(self), fields(backend = "state"))]
    fn grep_raw(&self, pattern: &str, path: Option<&str>, glob: Option<&str>) -> GrepOutput {
        grep_matches_from_files(&self.files.read(), pattern, path, glob).into()
    }

    fn glob_info(&self, pattern: &str, path: &str) -> Vec<FileInfo> {
        glob_search_files(&self.files.read(), pattern, path)
    }

    fn upload_files(
        &self,
        _files: &[(String, Vec<u8>)],
    ) -> BackendResult<Vec<FileUploadResponse>> {
        unsupported(self.name(), "upload_files")
    }

    fn download_files(&self, paths: &[String]) -> BackendResult<Vec<FileDownloadResponse>> {
        let files = self.files.read();
        Ok(paths
            .iter()
            .map(|p| {
                let normalized = normalize(p);
                match files.get(&normalized) {
                    Some(data) => FileDownloadResponse::ok(normalized, data.content().into_bytes()),
                    None if is_directory(&files, &normalized) => {
                        FileDownloadResponse::err(normalized, FileOpError::IsDirectory)
                    }
                    None => FileDownloadResponse::err(normalized, FileOpError::FileNotFound),
                }
            })
            .collect())
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Inline
    }
}
