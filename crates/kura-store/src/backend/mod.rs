//! The storage contract and its implementations.
//!
//! Every backend answers the same eight operations. Per-item failures are
//! returned as values; [`BackendError`] is reserved for calling an
//! operation the backend structurally cannot perform.
//!
//! | Backend | Data lives in | Mutation |
//! |---------|---------------|----------|
//! | [`StateBackend`] | a caller-owned map for one execution | deferred: returns a delta |
//! | [`StoreBackend`] | a map shared across executions | direct, namespaced |
//! | [`FilesystemBackend`] | a directory on disk | direct |
//! | [`CompositeBackend`] | its children | routed by longest prefix |

mod composite;
mod filesystem;
mod ripgrep;
mod state;
mod store;

pub use composite::CompositeBackend;
pub use filesystem::FilesystemBackend;
pub use ripgrep::{FallbackReason, RipgrepSearcher};
pub use state::StateBackend;
pub use store::StoreBackend;

use std::fmt;
use std::sync::Arc;

use crate::error::{BackendError, BackendResult, EditError, FileOpError, ReadError};
use crate::types::{
    Edited, FileDownloadResponse, FileInfo, FileUploadResponse, GrepOutput, Written,
};

/// How [`AsyncBackend`] should run a backend's operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Operations may block on I/O; run them on the blocking pool.
    #[default]
    Blocking,
    /// Operations never block; run them on the calling task.
    Inline,
}

/// A storage substrate.
///
/// Methods are synchronous; wrap in [`AsyncBackend`] to call from async
/// code. Paths are accepted in any form and normalized internally.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short type name used in logs and [`BackendError::Unsupported`].
    fn name(&self) -> &'static str;

    /// List a directory, or describe a single file. Missing paths list as empty.
    fn ls_info(&self, path: &str) -> Vec<FileInfo>;

    /// Render lines `[offset, offset + limit)` with line numbers.
    fn read(&self, path: &str, offset: usize, limit: usize) -> Result<String, ReadError>;

    /// Create a new file. Never overwrites.
    fn write(&self, path: &str, content: &str) -> Result<Written, FileOpError>;

    /// Replace `old` with `new` in an existing file.
    fn edit(&self, path: &str, old: &str, new: &str, replace_all: bool)
    -> Result<Edited, EditError>;

    /// Literal substring search.
    fn grep_raw(&self, pattern: &str, path: Option<&str>, glob: Option<&str>) -> GrepOutput;

    /// Files beneath `path` whose relative path matches `pattern`.
    fn glob_info(&self, pattern: &str, path: &str) -> Vec<FileInfo>;

    /// Store raw bytes at each path.
    fn upload_files(&self, files: &[(String, Vec<u8>)])
    -> BackendResult<Vec<FileUploadResponse>>;

    /// Fetch raw bytes for each path.
    fn download_files(&self, paths: &[String]) -> BackendResult<Vec<FileDownloadResponse>>;

    /// Whether operations may block.
    fn dispatch(&self) -> Dispatch {
        Dispatch::Blocking
    }
}

/// Async facade over a [`Backend`].
///
/// Blocking backends run on `tokio::task::spawn_blocking`; inline backends
/// run on the calling task. The outer `Result` only fails if a worker task
/// panicked or was cancelled.
#[derive(Debug, Clone)]
pub struct AsyncBackend {
    inner: Arc<dyn Backend>,
}

impl AsyncBackend {
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self { inner }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &Arc<dyn Backend> {
        &self.inner
    }

    async fn run<T, F>(&self, op: F) -> BackendResult<T>
    where
        F: FnOnce(&dyn Backend) -> T + Send + 'static,
        T: Send + 'static,
    {
        match self.inner.dispatch() {
            Dispatch::Inline => Ok(op(self.inner.as_ref())),
            Dispatch::Blocking => {
                let inner = Arc::clone(&self.inner);
                Ok(tokio::task::spawn_blocking(move || op(inner.as_ref())).await?)
            }
        }
    }

    pub async fn ls_info(&self, path: impl Into<String>) -> BackendResult<Vec<FileInfo>> {
        let path = path.into();
        self.run(move |b| b.ls_info(&path)).await
    }

    pub async fn read(
        &self,
        path: impl Into<String>,
        offset: usize,
        limit: usize,
    ) -> BackendResult<Result<String, ReadError>> {
        let path = path.into();
        self.run(move |b| b.read(&path, offset, limit)).await
    }

    pub async fn write(
        &self,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> BackendResult<Result<Written, FileOpError>> {
        let (path, content) = (path.into(), content.into());
        self.run(move |b| b.write(&path, &content)).await
    }

    pub async fn edit(
        &self,
        path: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
        replace_all: bool,
    ) -> BackendResult<Result<Edited, EditError>> {
        let (path, old, new) = (path.into(), old.into(), new.into());
        self.run(move |b| b.edit(&path, &old, &new, replace_all))
            .await
    }

    pub async fn grep_raw(
        &self,
        pattern: impl Into<String>,
        path: Option<String>,
        glob: Option<String>,
    ) -> BackendResult<GrepOutput> {
        let pattern = pattern.into();
        self.run(move |b| b.grep_raw(&pattern, path.as_deref(), glob.as_deref()))
            .await
    }

    pub async fn glob_info(
        &self,
        pattern: impl Into<String>,
        path: impl Into<String>,
    ) -> BackendResult<Vec<FileInfo>> {
        let (pattern, path) = (pattern.into(), path.into());
        self.run(move |b| b.glob_info(&pattern, &path)).await
    }

    pub async fn upload_files(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> BackendResult<Vec<FileUploadResponse>> {
        self.run(move |b| b.upload_files(&files)).await?
    }

    pub async fn download_files(
        &self,
        paths: Vec<String>,
    ) -> BackendResult<Vec<FileDownloadResponse>> {
        self.run(move |b| b.download_files(&paths)).await?
    }
}

impl From<Arc<dyn Backend>> for AsyncBackend {
    fn from(inner: Arc<dyn Backend>) -> Self {
        Self::new(inner)
    }
}

/// Shorthand for the loud failure of an unsupported bulk operation.
pub(crate) fn unsupported<T>(backend: &'static str, operation: &'static str) -> BackendResult<T> {
    Err(BackendError::unsupported(backend, operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::shared_files;
    use crate::types::GrepMatch;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inline_backend_runs_on_caller() {
        let backend: Arc<dyn Backend> = Arc::new(StateBackend::new(shared_files()));
        assert_eq!(backend.dispatch(), Dispatch::Inline);

        let facade = AsyncBackend::new(backend);
        let written = facade.write("/a.txt", "hello").await.unwrap().unwrap();
        assert_eq!(written.path, "/a.txt");
        assert!(written.files_update.is_some());
    }

    #[tokio::test]
    async fn test_blocking_backend_runs_on_pool() {
        let tmp = TempDir::new().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(FilesystemBackend::new(tmp.path(), true));
        assert_eq!(backend.dispatch(), Dispatch::Blocking);

        let facade = AsyncBackend::new(backend);
        facade.write("/a.txt", "hello").await.unwrap().unwrap();
        let text = facade.read("/a.txt", 0, 10).await.unwrap().unwrap();
        assert!(text.contains("hello"));
        let listed = facade.ls_info("/").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disk_grep_on_pool() {
        // Exercises rg when installed; the scan otherwise.
        let tmp = TempDir::new().unwrap();
        let facade = AsyncBackend::new(Arc::new(FilesystemBackend::new(tmp.path(), true)));
        facade.write("/src/a.rs", "needle\nhay").await.unwrap().unwrap();
        facade.write("/.hidden", "needle").await.unwrap().unwrap();

        let matches = facade
            .grep_raw("needle", None, None)
            .await
            .unwrap()
            .into_matches();
        assert_eq!(
            matches,
            vec![
                GrepMatch::new("/.hidden", 1, "needle"),
                GrepMatch::new("/src/a.rs", 1, "needle"),
            ]
        );
    }

    #[tokio::test]
    async fn test_unsupported_surfaces_through_facade() {
        let facade = AsyncBackend::new(Arc::new(StateBackend::new(shared_files())));
        let err = facade
            .upload_files(vec![("/a".into(), b"x".to_vec())])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported { .. }));
    }
}
