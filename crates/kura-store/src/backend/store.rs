//! Shared cross-context backend.
//!
//! Several execution contexts hold the same map. An optional namespace
//! prefixes every key internally; callers only ever see namespace-free
//! paths and never observe another namespace's files.
//!
//! Unlike [`super::StateBackend`], mutation is direct. Existence checks and
//! inserts happen under one write lock, so two writers racing to create the
//! same path cannot both succeed.

use tracing::instrument;

use crate::edit::perform_string_replacement;
use crate::error::{BackendResult, EditError, FileOpError, ReadError};
use crate::format::format_read_response;
use crate::paths::{self, normalize, relative_to};
use crate::record::{FileData, FileMap, SharedFiles};
use crate::search::{glob_search_files, grep_matches_from_files, is_directory, list_files};
use crate::types::{
    Edited, FileDownloadResponse, FileInfo, FileUploadResponse, GrepOutput, Written,
};

use super::{Backend, Dispatch};

/// Backend over a map shared between execution contexts.
#[derive(Debug, Clone)]
pub struct StoreBackend {
    files: SharedFiles,
    namespace: Option<String>,
}

impl StoreBackend {
    /// A backend with no namespace; it sees every key in the map.
    pub fn new(files: SharedFiles) -> Self {
        Self {
            files,
            namespace: None,
        }
    }

    /// A backend confined to `namespace` within the map.
    ///
    /// An empty or root namespace is the same as none.
    pub fn with_namespace(files: SharedFiles, namespace: &str) -> Self {
        let ns = normalize(namespace);
        Self {
            files,
            namespace: (ns != paths::ROOT).then_some(ns),
        }
    }

    /// The normalized namespace prefix, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The backing map.
    pub fn files(&self) -> &SharedFiles {
        &self.files
    }

    /// Internal key for a caller path.
    fn ns_path(&self, path: &str) -> String {
        let normalized = normalize(path);
        match &self.namespace {
            None => normalized,
            Some(ns) if normalized == paths::ROOT => ns.clone(),
            Some(ns) => format!("{ns}{normalized}"),
        }
    }

    /// Caller path for an internal key, or `None` if it is outside the namespace.
    fn strip_ns(&self, key: &str) -> Option<String> {
        match &self.namespace {
            None => Some(key.to_string()),
            Some(ns) => relative_to(key, ns).map(|rel| format!("/{rel}")),
        }
    }

    /// This namespace's entries, keyed by caller path.
    fn scoped(&self) -> FileMap {
        let files = self.files.read();
        match &self.namespace {
            None => files.clone(),
            Some(_) => files
                .iter()
                .filter_map(|(k, v)| self.strip_ns(k).map(|p| (p, v.clone())))
                .collect(),
        }
    }
}

impl Backend for StoreBackend {
    fn name(&self) -> &'static str {
        "StoreBackend"
    }

    fn ls_info(&self, path: &str) -> Vec<FileInfo> {
        list_files(&self.scoped(), path)
    }

    #[instrument(name = "backend.read", skip(self), fields(backend = "store"))]
    fn read(&self, path: &str, offset: usize, limit: usize) -> Result<String, ReadError> {
        let key = self.ns_path(path);
        let files = self.files.read();
        match files.get(&key) {
            Some(data) => Ok(format_read_response(&data.lines, offset, limit)),
            None if is_directory(&files, &key) => {
                Err(ReadError::op(FileOpError::IsDirectory, normalize(path)))
            }
            None => Err(ReadError::not_found(normalize(path))),
        }
    }

    #[instrument(name = "backend.write", skip(self, content), fields(backend = "store"))]
    fn write(&self, path: &str, content: &str) -> Result<Written, FileOpError> {
        let key = self.ns_path(path);
        let mut files = self.files.write();
        if files.contains_key(&key) {
            return Err(FileOpError::AlreadyExists);
        }
        files.insert(key, FileData::new(content));
        Ok(Written {
            path: normalize(path),
            files_update: None,
        })
    }

    #[instrument(name = "backend.edit", skip(self, old, new), fields(backend = "store"))]
    fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<Edited, EditError> {
        let key = self.ns_path(path);
        let mut files = self.files.write();
        let Some(data) = files.get(&key) else {
            if is_directory(&files, &key) {
                return Err(FileOpError::IsDirectory.into());
            }
            return Err(FileOpError::FileNotFound.into());
        };

        let (content, occurrences) =
            perform_string_replacement(&data.content(), old, new, replace_all)?;
        let updated = data.with_content(&content);
        files.insert(key, updated);
        Ok(Edited {
            path: normalize(path),
            occurrences,
            files_update: None,
        })
    }

    #[instrument(name = "backend.grep", skip(self), fields(backend = "store"))]
    fn grep_raw(&self, pattern: &str, path: Option<&str>, glob: Option<&str>) -> GrepOutput {
        grep_matches_from_files(&self.scoped(), pattern, path, glob).into()
    }

    fn glob_info(&self, pattern: &str, path: &str) -> Vec<FileInfo> {
        glob_search_files(&self.scoped(), pattern, path)
    }

    fn upload_files(&self, files: &[(String, Vec<u8>)]) -> BackendResult<Vec<FileUploadResponse>> {
        let mut map = self.files.write();
        Ok(files
            .iter()
            .map(|(name, bytes)| {
                let key = self.ns_path(name);
                let path = normalize(name);
                if map.contains_key(&key) {
                    return FileUploadResponse::err(path, FileOpError::AlreadyExists);
                }
                map.insert(key, FileData::new(&String::from_utf8_lossy(bytes)));
                FileUploadResponse::ok(path)
            })
            .collect())
    }

    fn download_files(&self, paths: &[String]) -> BackendResult<Vec<FileDownloadResponse>> {
        let files = self.files.read();
        Ok(paths
            .iter()
            .map(|p| {
                let (path, key) = (normalize(p), self.ns_path(p));
                match files.get(&key) {
                    Some(data) => FileDownloadResponse::ok(path, data.content().into_bytes()),
                    None if is_directory(&files, &key) => {
                        FileDownloadResponse::err(path, FileOpError::IsDirectory)
                    }
                    None => FileDownloadResponse::err(path, FileOpError::FileNotFound),
                }
            })
            .collect())
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Inline
    }
}
