//! Disk-backed backend.
//!
//! Paths map onto a real directory tree. In virtual mode every caller path
//! is resolved beneath `root` and anything that resolves outside it is
//! refused; outside virtual mode absolute paths are used as given and
//! relative paths are joined onto `root`.
//!
//! Grep tries ripgrep first and falls back to an in-process walk when the
//! fast path reports a [`FallbackReason`](super::FallbackReason).

use std::fs::{self, Metadata, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::constants::DEFAULT_MAX_FILE_SIZE_MB;
use crate::edit::perform_string_replacement;
use crate::error::{BackendResult, EditError, FileOpError, PathError, ReadError};
use crate::format::format_read_response;
use crate::paths::normalize;
use crate::search::{GlobFilter, compile_glob};
use crate::types::{
    Edited, FileDownloadResponse, FileInfo, FileUploadResponse, GrepMatch, GrepOutput, Written,
};

use super::{Backend, RipgrepSearcher};

/// Backend over a directory on disk.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
    virtual_mode: bool,
    max_file_size: u64,
    searcher: RipgrepSearcher,
}

impl FilesystemBackend {
    /// Create a backend rooted at `root`.
    ///
    /// The root is canonicalized so symlinked temp dirs compare correctly.
    pub fn new(root: impl Into<PathBuf>, virtual_mode: bool) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            virtual_mode,
            max_file_size: (DEFAULT_MAX_FILE_SIZE_MB * 1024.0 * 1024.0) as u64,
            searcher: RipgrepSearcher::default(),
        }
    }

    /// Refuse reads of files larger than `bytes`.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Use a different ripgrep executable or timeout.
    pub fn with_searcher(mut self, searcher: RipgrepSearcher) -> Self {
        self.searcher = searcher;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_mode
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Map a caller path to a real path.
    fn resolve(&self, key: &str) -> Result<PathBuf, PathError> {
        if !self.virtual_mode {
            let p = Path::new(key);
            return Ok(if p.is_absolute() {
                p.to_path_buf()
            } else {
                lexical_join(&self.root, p)
            });
        }

        let rel = key.trim_start_matches(['/', '\\']);
        if rel.is_empty() {
            return Ok(self.root.clone());
        }
        let resolved = resolve_symlinks(&lexical_join(&self.root, Path::new(rel)));
        if !resolved.starts_with(&self.root) {
            warn!(path = key, root = %self.root.display(), "refusing path outside root");
            return Err(PathError::EscapesRoot(key.to_string()));
        }
        Ok(resolved)
    }

    /// The path reported back for a caller-supplied path.
    fn external(&self, key: &str) -> String {
        if self.virtual_mode {
            normalize(key)
        } else {
            key.to_string()
        }
    }

    /// The path reported for a real path found by walking.
    fn display(&self, real: &Path) -> String {
        if self.virtual_mode
            && let Some(rel) = relative_slash(real, &self.root)
        {
            return format!("/{rel}");
        }
        real.to_string_lossy().into_owned()
    }

    fn file_info(&self, real: &Path, meta: &Metadata) -> FileInfo {
        if meta.is_dir() {
            FileInfo::directory(self.display(real))
        } else {
            FileInfo::file(self.display(real), meta.len(), modified_at(meta))
        }
    }

    /// In-process literal grep beneath `root`.
    fn scan(&self, pattern: &str, root: &Path, glob: Option<&str>) -> Vec<GrepMatch> {
        let filter = glob.map(GlobFilter::new);
        let mut matches = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(filter) = &filter {
                let rel = match relative_slash(entry.path(), root) {
                    Some(rel) if !rel.is_empty() => rel,
                    _ => entry.file_name().to_string_lossy().into_owned(),
                };
                if !filter.is_match(&rel) {
                    continue;
                }
            }
            match entry.metadata() {
                Ok(meta) if meta.len() > self.max_file_size => continue,
                Ok(_) => {}
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            }
            let Ok(bytes) = fs::read(entry.path()) else {
                continue;
            };
            if bytes.is_empty() {
                continue;
            }
            let path = entry.path().to_string_lossy();
            let body = bytes.strip_suffix(b"\n").unwrap_or(&bytes);
            for (i, line) in body.split(|b| *b == b'\n').enumerate() {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                // rg reports non-UTF-8 lines as raw bytes, which are skipped too
                let Ok(line) = std::str::from_utf8(line) else {
                    continue;
                };
                if line.contains(pattern) {
                    matches.push(GrepMatch::new(&*path, i + 1, line));
                }
            }
        }
        matches
    }

    fn create_new(&self, key: &str, bytes: &[u8]) -> Result<PathBuf, FileOpError> {
        let resolved = self.resolve(key)?;
        if fs::symlink_metadata(&resolved).is_ok() {
            return Err(FileOpError::AlreadyExists);
        }
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&resolved)?;
        file.write_all(bytes)?;
        Ok(resolved)
    }
}

impl Backend for FilesystemBackend {
    fn name(&self) -> &'static str {
        "FilesystemBackend"
    }

    #[instrument(name = "backend.ls", skip(self), fields(backend = "filesystem"))]
    fn ls_info(&self, path: &str) -> Vec<FileInfo> {
        let Ok(resolved) = self.resolve(path) else {
            return Vec::new();
        };
        let Ok(meta) = fs::metadata(&resolved) else {
            return Vec::new();
        };
        if meta.is_file() {
            return vec![FileInfo::file(
                self.external(path),
                meta.len(),
                modified_at(&meta),
            )];
        }
        if !meta.is_dir() {
            return Vec::new();
        }

        let Ok(dir) = fs::read_dir(&resolved) else {
            return Vec::new();
        };
        let mut entries: Vec<FileInfo> = dir
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let child = entry.path();
                match fs::metadata(&child) {
                    Ok(meta) => Some(self.file_info(&child, &meta)),
                    Err(e) => {
                        debug!(path = %child.display(), error = %e, "skipping unreadable entry");
                        None
                    }
                }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    #[instrument(name = "backend.read", skip(self), fields(backend = "filesystem"))]
    fn read(&self, path: &str, offset: usize, limit: usize) -> Result<String, ReadError> {
        let resolved = self
            .resolve(path)
            .map_err(|e| ReadError::op(e.into(), path))?;
        let meta = fs::metadata(&resolved).map_err(|e| ReadError::op(e.into(), path))?;
        if meta.is_dir() {
            return Err(ReadError::op(FileOpError::IsDirectory, path));
        }
        if meta.len() > self.max_file_size {
            return Err(ReadError::TooLarge {
                path: path.to_string(),
                size: meta.len(),
                max: self.max_file_size,
            });
        }

        let bytes = fs::read(&resolved).map_err(|e| ReadError::op(e.into(), path))?;
        let content = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = if content.is_empty() {
            Vec::new()
        } else {
            content.split('\n').collect()
        };
        Ok(format_read_response(&lines, offset, limit))
    }

    #[instrument(name = "backend.write", skip(self, content), fields(backend = "filesystem"))]
    fn write(&self, path: &str, content: &str) -> Result<Written, FileOpError> {
        self.create_new(path, content.as_bytes())?;
        Ok(Written {
            path: self.external(path),
            files_update: None,
        })
    }

    #[instrument(name = "backend.edit", skip(self, old, new), fields(backend = "filesystem"))]
    fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<Edited, EditError> {
        let resolved = self.resolve(path).map_err(FileOpError::from)?;
        let meta = fs::metadata(&resolved).map_err(FileOpError::from)?;
        if meta.is_dir() {
            return Err(FileOpError::IsDirectory.into());
        }
        let current = fs::read_to_string(&resolved).map_err(FileOpError::from)?;
        let (content, occurrences) = perform_string_replacement(&current, old, new, replace_all)?;
        fs::write(&resolved, content).map_err(FileOpError::from)?;
        Ok(Edited {
            path: self.external(path),
            occurrences,
            files_update: None,
        })
    }

    #[instrument(name = "backend.grep", skip(self), fields(backend = "filesystem"))]
    fn grep_raw(&self, pattern: &str, path: Option<&str>, glob: Option<&str>) -> GrepOutput {
        let root = match path {
            Some(p) => match self.resolve(p) {
                Ok(root) => root,
                Err(_) => return GrepOutput::Matches(Vec::new()),
            },
            None => self.root.clone(),
        };
        if !root.exists() {
            return GrepOutput::Matches(Vec::new());
        }

        // rg ignores --glob for explicitly named files; scan single files directly.
        let mut matches = if root.is_file() {
            self.scan(pattern, &root, glob)
        } else {
            match self
                .searcher
                .search_blocking(pattern, &root, glob, Some(self.max_file_size))
            {
                Ok(matches) => matches,
                Err(reason) => {
                    debug!(%reason, "ripgrep unavailable, scanning in-process");
                    self.scan(pattern, &root, glob)
                }
            }
        };
        for m in &mut matches {
            m.path = self.display(Path::new(&m.path));
        }
        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
        GrepOutput::Matches(matches)
    }

    #[instrument(name = "backend.glob", skip(self), fields(backend = "filesystem"))]
    fn glob_info(&self, pattern: &str, path: &str) -> Vec<FileInfo> {
        let Ok(base) = self.resolve(path) else {
            return Vec::new();
        };
        if !base.is_dir() {
            return Vec::new();
        }
        let Some(matcher) = compile_glob(pattern) else {
            return Vec::new();
        };

        let mut entries: Vec<FileInfo> = WalkDir::new(&base)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                relative_slash(entry.path(), &base).is_some_and(|rel| matcher.is_match(&rel))
            })
            .filter_map(|entry| {
                let meta = entry.metadata().ok()?;
                Some(self.file_info(entry.path(), &meta))
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    fn upload_files(&self, files: &[(String, Vec<u8>)]) -> BackendResult<Vec<FileUploadResponse>> {
        Ok(files
            .iter()
            .map(|(name, bytes)| match self.create_new(name, bytes) {
                Ok(_) => FileUploadResponse::ok(self.external(name)),
                Err(kind) => FileUploadResponse::err(self.external(name), kind),
            })
            .collect())
    }

    fn download_files(&self, paths: &[String]) -> BackendResult<Vec<FileDownloadResponse>> {
        Ok(paths
            .iter()
            .map(|p| {
                let path = self.external(p);
                let fetched = self.resolve(p).map_err(FileOpError::from).and_then(|real| {
                    if real.is_dir() {
                        return Err(FileOpError::IsDirectory);
                    }
                    fs::read(&real).map_err(FileOpError::from)
                });
                match fetched {
                    Ok(bytes) => FileDownloadResponse::ok(path, bytes),
                    Err(kind) => FileDownloadResponse::err(path, kind),
                }
            })
            .collect())
    }
}

/// Join `rel` onto `base`, applying `.` and `..` without touching the disk.
fn lexical_join(base: &Path, rel: &Path) -> PathBuf {
    let mut out = base.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(s) => out.push(s),
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-append the rest.
///
/// Follows symlinks that already exist while still allowing paths to files
/// that have not been created yet.
fn resolve_symlinks(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if existing.exists() {
            return match dunce::canonicalize(existing) {
                Ok(mut canonical) => {
                    canonical.extend(tail.iter().rev());
                    canonical
                }
                Err(_) => path.to_path_buf(),
            };
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// `path` relative to `base` with `/` separators.
fn relative_slash(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

fn modified_at(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}
