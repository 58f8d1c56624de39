//! Prefix-routing backend.
//!
//! Routes are matched by longest prefix: with `/a` and `/a/b` both routed,
//! `/a/b/c.txt` goes to the `/a/b` backend. Unrouted paths go to the
//! default. Paths are passed through unchanged; the routed backend sees
//! the full path, prefix included.
//!
//! Grep and glob fan out to every backend when scoped to `/` (or unscoped)
//! and to the single resolved backend otherwise. Listings come from the
//! owning backend, with route mount points shown as directories.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::instrument;

use crate::constants::NO_MATCHES;
use crate::error::{BackendResult, EditError, FileOpError, ReadError};
use crate::paths::{self, is_within, normalize};
use crate::types::{
    Edited, FileDownloadResponse, FileInfo, FileUploadResponse, GrepMatch, GrepOutput, Written,
};

use super::{Backend, Dispatch};

/// Backend that dispatches by path prefix.
pub struct CompositeBackend {
    default: Arc<dyn Backend>,
    /// Sorted longest prefix first.
    routes: Vec<(String, Arc<dyn Backend>)>,
}

impl fmt::Debug for CompositeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeBackend")
            .field("default", &self.default.name())
            .field(
                "routes",
                &self
                    .routes
                    .iter()
                    .map(|(prefix, b)| (prefix.as_str(), b.name()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CompositeBackend {
    /// Build a router. Prefixes are normalized; routes are fixed from here on.
    pub fn new(
        default: Arc<dyn Backend>,
        routes: impl IntoIterator<Item = (String, Arc<dyn Backend>)>,
    ) -> Self {
        let mut routes: Vec<(String, Arc<dyn Backend>)> = routes
            .into_iter()
            .map(|(prefix, backend)| (normalize(&prefix), backend))
            .collect();
        // stable: equal lengths keep insertion order
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { default, routes }
    }

    /// The fallback for unrouted paths.
    pub fn default_backend(&self) -> &Arc<dyn Backend> {
        &self.default
    }

    /// `(prefix, backend)` pairs, longest prefix first.
    pub fn routes(&self) -> &[(String, Arc<dyn Backend>)] {
        &self.routes
    }

    /// The backend that owns `path`.
    pub fn resolve(&self, path: &str) -> &Arc<dyn Backend> {
        let normalized = normalize(path);
        self.routes
            .iter()
            .find(|(prefix, _)| is_within(&normalized, prefix))
            .map(|(_, backend)| backend)
            .unwrap_or(&self.default)
    }

    /// Every backend that could hold files beneath `path`.
    fn resolve_all(&self, path: Option<&str>) -> Vec<&Arc<dyn Backend>> {
        match path.map(normalize) {
            Some(p) if p != paths::ROOT => vec![self.resolve(&p)],
            _ => std::iter::once(&self.default)
                .chain(self.routes.iter().map(|(_, b)| b))
                .collect(),
        }
    }
}

impl Backend for CompositeBackend {
    fn name(&self) -> &'static str {
        "CompositeBackend"
    }

    /// The owning backend's listing plus a directory entry for every route
    /// mounted beneath `path`.
    fn ls_info(&self, path: &str) -> Vec<FileInfo> {
        let mut entries = self.resolve(path).ls_info(path);
        let dir = normalize(path);
        let mut seen: HashSet<String> = entries.iter().map(|e| e.path.clone()).collect();
        for (prefix, _) in &self.routes {
            let Some(first) = paths::relative_to(prefix, &dir)
                .and_then(|rel| rel.split('/').next())
                .filter(|first| !first.is_empty())
            else {
                continue;
            };
            let mount = if dir == paths::ROOT {
                format!("/{first}")
            } else {
                format!("{dir}/{first}")
            };
            if seen.insert(mount.clone()) {
                entries.push(FileInfo::directory(mount));
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    fn read(&self, path: &str, offset: usize, limit: usize) -> Result<String, ReadError> {
        self.resolve(path).read(path, offset, limit)
    }

    fn write(&self, path: &str, content: &str) -> Result<Written, FileOpError> {
        self.resolve(path).write(path, content)
    }

    fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<Edited, EditError> {
        self.resolve(path).edit(path, old, new, replace_all)
    }

    /// Concatenate matches from every relevant backend.
    ///
    /// A backend's pre-formatted output is passed through only when it is
    /// not the no-match string and nothing has matched yet.
    #[instrument(name = "backend.grep", skip(self), fields(backend = "composite"))]
    fn grep_raw(&self, pattern: &str, path: Option<&str>, glob: Option<&str>) -> GrepOutput {
        let mut all: Vec<GrepMatch> = Vec::new();
        for backend in self.resolve_all(path) {
            match backend.grep_raw(pattern, path, glob) {
                GrepOutput::Matches(matches) => all.extend(matches),
                GrepOutput::Formatted(text) if text != NO_MATCHES && all.is_empty() => {
                    return GrepOutput::Formatted(text);
                }
                GrepOutput::Formatted(_) => {}
            }
        }
        GrepOutput::Matches(all)
    }

    /// Merge glob results, first backend to report a path wins.
    #[instrument(name = "backend.glob", skip(self), fields(backend = "composite"))]
    fn glob_info(&self, pattern: &str, path: &str) -> Vec<FileInfo> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for backend in self.resolve_all(Some(path)) {
            for info in backend.glob_info(pattern, path) {
                if seen.insert(info.path.clone()) {
                    merged.push(info);
                }
            }
        }
        merged
    }

    fn upload_files(&self, files: &[(String, Vec<u8>)]) -> BackendResult<Vec<FileUploadResponse>> {
        let mut responses = Vec::with_capacity(files.len());
        for item in files {
            responses.extend(self.resolve(&item.0).upload_files(std::slice::from_ref(item))?);
        }
        Ok(responses)
    }

    fn download_files(&self, paths: &[String]) -> BackendResult<Vec<FileDownloadResponse>> {
        let mut responses = Vec::with_capacity(paths.len());
        for path in paths {
            responses.extend(self.resolve(path).download_files(std::slice::from_ref(path))?);
        }
        Ok(responses)
    }

    fn dispatch(&self) -> Dispatch {
        let all_inline = std::iter::once(&self.default)
            .chain(self.routes.iter().map(|(_, b)| b))
            .all(|b| b.dispatch() == Dispatch::Inline);
        if all_inline {
            Dispatch::Inline
        } else {
            Dispatch::Blocking
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FilesystemBackend, StateBackend, StoreBackend};
    use crate::error::BackendError;
    use crate::record::{SharedFiles, shared_files};
    use tempfile::TempDir;

    /// A backend that only knows how to return pre-formatted grep output.
    #[derive(Debug)]
    struct Formatted(&'static str);

    impl Backend for Formatted {
        fn name(&self) -> &'static str {
            "Formatted"
        }
        fn ls_info(&self, _: &str) -> Vec<FileInfo> {
            Vec::new()
        }
        fn read(&self, path: &str, _: usize, _: usize) -> Result<String, ReadError> {
            Err(ReadError::not_found(path))
        }
        fn write(&self, _: &str, _: &str) -> Result<Written, FileOpError> {
            Err(FileOpError::PermissionDenied)
        }
        fn edit(&self, _: &str, _: &str, _: &str, _: bool) -> Result<Edited, EditError> {
            Err(FileOpError::PermissionDenied.into())
        }
        fn grep_raw(&self, _: &str, _: Option<&str>, _: Option<&str>) -> GrepOutput {
            GrepOutput::Formatted(self.0.to_string())
        }
        fn glob_info(&self, _: &str, _: &str) -> Vec<FileInfo> {
            Vec::new()
        }
        fn upload_files(&self, _: &[(String, Vec<u8>)]) -> BackendResult<Vec<FileUploadResponse>> {
            Ok(Vec::new())
        }
        fn download_files(&self, _: &[String]) -> BackendResult<Vec<FileDownloadResponse>> {
            Ok(Vec::new())
        }
        fn dispatch(&self) -> Dispatch {
            Dispatch::Inline
        }
    }

    fn stores() -> (SharedFiles, SharedFiles, CompositeBackend) {
        let b1 = shared_files();
        let b2 = shared_files();
        let composite = CompositeBackend::new(
            Arc::new(StoreBackend::new(shared_files())),
            vec![
                ("/a".to_string(), Arc::new(StoreBackend::new(Arc::clone(&b1))) as Arc<dyn Backend>),
                ("/a/b/".to_string(), Arc::new(StoreBackend::new(Arc::clone(&b2))) as Arc<dyn Backend>),
            ],
        );
        (b1, b2, composite)
    }

    #[test]
    fn test_routes_sorted_longest_first() {
        let (_, _, composite) = stores();
        let prefixes: Vec<_> = composite.routes().iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(prefixes, vec!["/a/b", "/a"]);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (b1, b2, composite) = stores();
        composite.write("/a/b/c/file.txt", "deep").unwrap();
        composite.write("/a/file.txt", "shallow").unwrap();
        composite.write("/ab/file.txt", "default").unwrap();

        assert!(b2.read().contains_key("/a/b/c/file.txt"));
        assert!(b1.read().contains_key("/a/file.txt"));
        assert!(!b1.read().contains_key("/ab/file.txt"));
        assert!(
            composite
                .default_backend()
                .read("/ab/file.txt", 0, 10)
                .is_ok()
        );
    }

    #[test]
    fn test_ls_shows_route_mounts() {
        let (_, _, composite) = stores();
        composite.write("/top.txt", "x").unwrap();
        composite.write("/a/file.txt", "x").unwrap();

        let paths = |dir: &str| -> Vec<(String, bool)> {
            composite
                .ls_info(dir)
                .into_iter()
                .map(|info| (info.path, info.is_dir))
                .collect()
        };
        assert_eq!(
            paths("/"),
            vec![("/a".to_string(), true), ("/top.txt".to_string(), false)]
        );
        assert_eq!(
            paths("/a"),
            vec![("/a/b".to_string(), true), ("/a/file.txt".to_string(), false)]
        );
        assert!(paths("/a/b").is_empty());
    }

    #[test]
    fn test_exact_prefix_routes() {
        let (_, _, composite) = stores();
        assert!(Arc::ptr_eq(composite.resolve("/a/b"), &composite.routes()[0].1));
        assert!(Arc::ptr_eq(composite.resolve("/a"), &composite.routes()[1].1));
        assert!(Arc::ptr_eq(composite.resolve("/"), composite.default_backend()));
    }

    #[test]
    fn test_grep_fans_out_at_root_only() {
        let (_, _, composite) = stores();
        composite.write("/top.txt", "needle").unwrap();
        composite.write("/a/x.txt", "needle").unwrap();
        composite.write("/a/b/y.txt", "needle").unwrap();

        assert_eq!(composite.grep_raw("needle", None, None).into_matches().len(), 3);
        assert_eq!(
            composite.grep_raw("needle", Some("/"), None).into_matches().len(),
            3
        );
        let scoped = composite.grep_raw("needle", Some("/a/b"), None).into_matches();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].path, "/a/b/y.txt");
    }

    #[test]
    fn test_formatted_grep_output() {
        let state = shared_files();
        state
            .write()
            .insert("/hit.txt".into(), crate::record::FileData::new("needle"));

        // matches found first are never replaced by formatted text
        let composite = CompositeBackend::new(
            Arc::new(StateBackend::new(Arc::clone(&state))),
            vec![(
                "/fmt".to_string(),
                Arc::new(Formatted("/fmt/x: needle")) as Arc<dyn Backend>,
            )],
        );
        assert_eq!(composite.grep_raw("needle", None, None).into_matches().len(), 1);

        // with nothing matched yet, formatted text passes through
        let composite = CompositeBackend::new(
            Arc::new(StateBackend::new(shared_files())),
            vec![(
                "/fmt".to_string(),
                Arc::new(Formatted("/fmt/x: needle")) as Arc<dyn Backend>,
            )],
        );
        assert_eq!(
            composite.grep_raw("needle", None, None),
            GrepOutput::Formatted("/fmt/x: needle".into())
        );

        // the no-match string never does
        let composite = CompositeBackend::new(
            Arc::new(StateBackend::new(shared_files())),
            vec![(
                "/fmt".to_string(),
                Arc::new(Formatted(NO_MATCHES)) as Arc<dyn Backend>,
            )],
        );
        assert_eq!(
            composite.grep_raw("needle", None, None),
            GrepOutput::Matches(Vec::new())
        );
    }

    #[test]
    fn test_glob_dedups_by_path() {
        let shared = shared_files();
        // two routes over the same map report identical paths
        let composite = CompositeBackend::new(
            Arc::new(StoreBackend::new(Arc::clone(&shared))),
            vec![(
                "/mirror".to_string(),
                Arc::new(StoreBackend::new(Arc::clone(&shared))) as Arc<dyn Backend>,
            )],
        );
        composite.write("/src/a.py", "").unwrap();
        composite.write("/src/b.py", "").unwrap();

        let found = composite.glob_info("**/*.py", "/");
        let paths: Vec<_> = found.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/src/a.py", "/src/b.py"]);
    }

    #[test]
    fn test_bulk_ops_partition_and_keep_order() {
        let tmp = TempDir::new().unwrap();
        let disk: Arc<dyn Backend> = Arc::new(FilesystemBackend::new(tmp.path(), true));
        let store = shared_files();
        let composite = CompositeBackend::new(
            Arc::clone(&disk),
            vec![(
                "/mem".to_string(),
                Arc::new(StoreBackend::new(Arc::clone(&store))) as Arc<dyn Backend>,
            )],
        );

        let up = composite
            .upload_files(&[
                ("/mem/a.txt".into(), b"A".to_vec()),
                ("/disk.txt".into(), b"B".to_vec()),
                ("/mem/c.txt".into(), b"C".to_vec()),
            ])
            .unwrap();
        let paths: Vec<_> = up.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/mem/a.txt", "/disk.txt", "/mem/c.txt"]);
        assert!(up.iter().all(FileUploadResponse::is_ok));
        assert!(store.read().contains_key("/mem/c.txt"));
        assert!(tmp.path().join("disk.txt").is_file());

        let down = composite
            .download_files(&["/disk.txt".into(), "/mem/a.txt".into()])
            .unwrap();
        assert_eq!(down[0].content.as_deref(), Some(&b"B"[..]));
        assert_eq!(down[1].content.as_deref(), Some(&b"A"[..]));
    }

    #[test]
    fn test_unsupported_child_fails_loudly() {
        let composite = CompositeBackend::new(
            Arc::new(StateBackend::new(shared_files())),
            Vec::<(String, Arc<dyn Backend>)>::new(),
        );
        let err = composite
            .upload_files(&[("/a.txt".into(), b"x".to_vec())])
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported { .. }));
    }

    #[test]
    fn test_dispatch_inline_only_when_all_children_are() {
        let (_, _, composite) = stores();
        assert_eq!(composite.dispatch(), Dispatch::Inline);

        let tmp = TempDir::new().unwrap();
        let mixed = CompositeBackend::new(
            Arc::new(StoreBackend::new(shared_files())),
            vec![(
                "/disk".to_string(),
                Arc::new(FilesystemBackend::new(tmp.path(), true)) as Arc<dyn Backend>,
            )],
        );
        assert_eq!(mixed.dispatch(), Dispatch::Blocking);
    }
}
