//! Virtual path parsing and root-path confinement.
//!
//! A virtual path looks like `memory-1://home/file.txt`: the text before the
//! first `://` names the adapter, the rest is relative to that adapter's root.

use std::fmt;
use thiserror::Error;

use super::error::{FsError, FsResult};

/// Delimiter between adapter prefix and relative path.
pub const PREFIX_SEPARATOR: &str = "://";

/// A parsed virtual path. Derived per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPath {
    pub prefix: String,
    pub path: String,
}

impl VirtualPath {
    /// Split `path` on the first `://`.
    ///
    /// Fails with `PrefixNotFoundInPath` when the delimiter is missing, which
    /// also covers `memory-1:file` and `memory-1:/file`.
    pub fn parse(path: &str) -> FsResult<Self> {
        match path.split_once(PREFIX_SEPARATOR) {
            Some((prefix, rest)) => Ok(Self {
                prefix: prefix.to_string(),
                path: rest.to_string(),
            }),
            None => Err(FsError::prefix_not_found_in_path(path)),
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, PREFIX_SEPARATOR, self.path)
    }
}

/// Path confinement failure.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path '{0}' escapes the adapter root")]
    EscapesRoot(String),
}

/// Normalize a relative path into its segments.
///
/// Empty and `.` segments are dropped and `..` pops the previous segment.
/// Popping above the root is an error.
pub fn normalize_segments(path: &str) -> Result<Vec<&str>, PathError> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::EscapesRoot(path.to_string()));
                }
            }
            other => segments.push(other),
        }
    }
    Ok(segments)
}

/// Prepend `root` to a caller-supplied relative path.
///
/// ```
/// use polyfs_kernel::vfs::path::join_root;
/// assert_eq!(join_root("/", "home/a.txt").unwrap(), "/home/a.txt");
/// assert_eq!(join_root("/data/", "/x/../y").unwrap(), "/data/y");
/// assert_eq!(join_root("/data", "").unwrap(), "/data");
/// ```
pub fn join_root(root: &str, path: &str) -> Result<String, PathError> {
    let segments = normalize_segments(path)?;
    let base = root.trim_end_matches('/');

    if segments.is_empty() {
        return Ok(if root.is_empty() {
            String::new()
        } else if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        });
    }

    let joined = segments.join("/");
    if root.is_empty() {
        Ok(joined)
    } else {
        Ok(format!("{base}/{joined}"))
    }
}

/// Last segment of a backend path (`""` for `/`).
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Parent of a backend path, or `None` for a root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => Some(""),
    }
}

/// Every ancestor of `path`, outermost first, excluding `path` itself.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        result.push(p);
        current = parent(p);
    }
    result.reverse();
    result
}

/// Returns true if `path` is `dir` or lies below it.
pub fn is_within(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return true;
    }
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}
