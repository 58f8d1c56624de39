//! Canonical virtual paths.
//!
//! Every path that crosses a backend boundary is a `/`-rooted string with no
//! trailing slash (except `/` itself) and no `.` or `..` segments.
//! [`validate`] is the one security checkpoint for untrusted input.

use crate::error::PathError;

/// The root path.
pub const ROOT: &str = "/";

/// Canonicalize a path.
///
/// Backslashes become forward slashes, `.` and empty segments are dropped,
/// `..` pops the previous segment (and is discarded at the root), and the
/// result always starts with `/`.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Validate an untrusted path and return its canonical form.
///
/// Rejects literal `..` segments, any `~`, and drive-letter paths before
/// normalizing. When `allowed_prefixes` is non-empty, the normalized path
/// must equal or sit beneath one of them.
pub fn validate(path: &str, allowed_prefixes: Option<&[&str]>) -> Result<String, PathError> {
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PathError::Traversal(path.to_string()));
    }
    if path.contains('~') {
        return Err(PathError::HomeExpansion(path.to_string()));
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(PathError::DriveLetter(path.to_string()));
    }

    let normalized = normalize(path);

    if let Some(allowed) = allowed_prefixes.filter(|a| !a.is_empty()) {
        let inside = allowed
            .iter()
            .any(|prefix| is_within(&normalized, &normalize(prefix)));
        if !inside {
            return Err(PathError::OutsideAllowed {
                path: normalized,
                allowed: allowed.iter().map(|p| p.to_string()).collect(),
            });
        }
    }

    Ok(normalized)
}

/// True if `path` equals `prefix` or is a descendant of it.
///
/// Both arguments must already be normalized. Every path is within `/`.
pub fn is_within(path: &str, prefix: &str) -> bool {
    if prefix == ROOT {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Path of `path` relative to the directory `base`, without a leading `/`.
///
/// Returns `None` when `path` is not within `base`. Both arguments must
/// already be normalized.
pub fn relative_to<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if !is_within(path, base) {
        return None;
    }
    if base == ROOT {
        Some(path.trim_start_matches('/'))
    } else {
        Some(path[base.len()..].trim_start_matches('/'))
    }
}

/// The final segment of a normalized path (empty for `/`).
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}
