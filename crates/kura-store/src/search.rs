//! Listing, literal grep, and glob over in-memory file maps.
//!
//! The disk backend reuses [`GlobFilter`] and [`compile_glob`] so pattern
//! semantics match across backends.

use std::collections::BTreeMap;

use globset::{Glob, GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::paths::{self, is_within, normalize, relative_to};
use crate::record::{FileData, FileMap};
use crate::types::{FileInfo, GrepMatch};

/// Compile a glob where `*` stays within one segment and `**` spans many.
///
/// Returns `None` for an invalid pattern, which callers treat as matching
/// nothing.
pub fn compile_glob(pattern: &str) -> Option<GlobMatcher> {
    match GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
    {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            debug!(pattern, error = %e, "invalid glob pattern");
            None
        }
    }
}

/// The file filter applied by `grep_raw`'s `glob` argument.
///
/// A pattern without `/` matches the file name at any depth. A pattern
/// containing `/` matches the path relative to the search root.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    matcher: Option<GlobMatcher>,
    by_name: bool,
}

impl GlobFilter {
    pub fn new(pattern: &str) -> Self {
        let by_name = !pattern.contains('/');
        let matcher = if by_name {
            Glob::new(pattern)
                .map(|g| g.compile_matcher())
                .map_err(|e| debug!(pattern, error = %e, "invalid glob pattern"))
                .ok()
        } else {
            compile_glob(pattern.trim_start_matches('/'))
        };
        Self { matcher, by_name }
    }

    /// Test a path given relative to the search root.
    pub fn is_match(&self, relative: &str) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        if self.by_name {
            matcher.is_match(paths::file_name(relative))
        } else {
            matcher.is_match(relative)
        }
    }
}

/// Entries at or beneath `path`.
pub fn filter_files_by_path<'a>(
    files: &'a FileMap,
    path: &'a str,
) -> impl Iterator<Item = (&'a String, &'a FileData)> + 'a {
    files.iter().filter(move |(fp, _)| is_within(fp, path))
}

/// List a directory, or describe a single file.
///
/// An exact file match returns just that file. Otherwise direct children
/// are returned as files and deeper descendants collapse into one
/// synthesized directory entry per first segment. Sorted by path.
pub fn list_files(files: &FileMap, path: &str) -> Vec<FileInfo> {
    let normalized = normalize(path);
    if let Some(data) = files.get(&normalized) {
        return vec![FileInfo::from_record(normalized, data)];
    }

    let prefix = if normalized == paths::ROOT {
        normalized.clone()
    } else {
        format!("{normalized}/")
    };

    let mut entries: BTreeMap<String, FileInfo> = BTreeMap::new();
    for (fp, data) in files {
        let Some(remainder) = fp.strip_prefix(&prefix) else {
            continue;
        };
        match remainder.split_once('/') {
            Some((dir, _)) => {
                let dir_path = format!("{prefix}{dir}");
                entries
                    .entry(dir_path.clone())
                    .or_insert_with(|| FileInfo::directory(dir_path));
            }
            None => {
                entries.insert(fp.clone(), FileInfo::from_record(fp.clone(), data));
            }
        }
    }
    entries.into_values().collect()
}

/// True if `path` has no record of its own but has descendants.
pub fn is_directory(files: &FileMap, path: &str) -> bool {
    !files.contains_key(path)
        && files
            .keys()
            .any(|fp| fp.as_str() != path && is_within(fp, path))
}

/// Literal substring search, line by line.
///
/// `path` restricts the search to that file or directory. `glob` filters
/// files as described on [`GlobFilter`]. Results are ordered by path, then
/// line.
pub fn grep_matches_from_files(
    files: &FileMap,
    pattern: &str,
    path: Option<&str>,
    glob: Option<&str>,
) -> Vec<GrepMatch> {
    let base = normalize(path.unwrap_or(paths::ROOT));
    let filter = glob.map(GlobFilter::new);

    let mut matches = Vec::new();
    for (fp, data) in filter_files_by_path(files, &base) {
        if let Some(filter) = &filter {
            // a file searched directly is matched by its own name
            let rel = match relative_to(fp, &base) {
                Some("") | None => paths::file_name(fp),
                Some(rel) => rel,
            };
            if !filter.is_match(rel) {
                continue;
            }
        }
        for (i, line) in data.lines.iter().enumerate() {
            if line.contains(pattern) {
                matches.push(GrepMatch::new(fp.clone(), i + 1, line.clone()));
            }
        }
    }
    matches
}

/// Files beneath `path` whose relative path matches `pattern`.
pub fn glob_search_files(files: &FileMap, pattern: &str, path: &str) -> Vec<FileInfo> {
    let base = normalize(path);
    let Some(matcher) = compile_glob(pattern) else {
        return Vec::new();
    };
    filter_files_by_path(files, &base)
        .filter(|(fp, _)| {
            relative_to(fp, &base).is_some_and(|rel| !rel.is_empty() && matcher.is_match(rel))
        })
        .map(|(fp, data)| FileInfo::from_record(fp.clone(), data))
        .collect()
}
