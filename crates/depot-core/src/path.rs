//! Path addressing for remote objects
//!
//! Callers hand depot logical paths in whatever shape their platform
//! produces: backslashes or forward slashes, with or without a leading or
//! trailing separator, sometimes padded with whitespace. Everything that
//! touches the remote first goes through [`normalize`], which maps any such
//! spelling onto one canonical [`RemotePath`] under the configured root.

use crate::error::{Error, Result};
use std::fmt;
use tracing::error;

/// Canonical absolute path on the remote backend.
///
/// Always begins with `/<root>`, uses forward-slash separators and never
/// carries a trailing separator. Two logical paths that differ only in
/// separator style or a trailing slash normalize to the same `RemotePath`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath(String);

impl RemotePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Appends a leaf name, preserving the no-trailing-separator invariant.
    pub fn join(&self, leaf: &str) -> RemotePath {
        if self.0.ends_with('/') {
            RemotePath(format!("{}{}", self.0, leaf))
        } else {
            RemotePath(format!("{}/{}", self.0, leaf))
        }
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Converts a caller-supplied logical path into the canonical [`RemotePath`]
/// under `root`.
///
/// Total over any string. Backslashes become forward slashes, surrounding
/// whitespace is trimmed, trailing separators are stripped and a missing
/// leading slash is prepended, so `a\b`, `a/b/`, ` /a/b ` all address the
/// same remote object. An empty, whitespace-only or separator-only logical
/// path addresses the root itself.
pub fn normalize(logical: &str, root: &str) -> RemotePath {
    let folded = logical.replace('\\', "/");
    let trimmed = folded.trim().trim_end_matches('/');

    let mut path = String::with_capacity(root.len() + trimmed.len() + 2);
    if !root.is_empty() {
        path.push('/');
        path.push_str(root);
    }
    if !trimmed.is_empty() {
        if !trimmed.starts_with('/') {
            path.push('/');
        }
        path.push_str(trimmed);
    }
    if path.is_empty() {
        path.push('/');
    }

    RemotePath(path)
}

/// Splits a logical path into `(parent, leaf)` at its last separator.
///
/// The parent feeds [`normalize`], the leaf names the object inside that
/// folder. A path with no separator is all leaf: `file.txt` lives directly
/// under the root. A folder-shaped path (trailing separator) yields an empty
/// leaf, which file-level operations reject.
pub fn split_leaf(path: &str) -> (String, String) {
    let folded = path.trim().replace('\\', "/");
    match folded.rfind('/') {
        Some(idx) => (folded[..idx].to_string(), folded[idx + 1..].to_string()),
        None => (String::new(), folded),
    }
}

/// Rejects logical paths that could escape the configured root.
///
/// Remote paths are plain strings to the backend, so a `..` component or an
/// embedded NUL would otherwise travel through [`normalize`] untouched.
pub fn validate_path(path: &str) -> Result<()> {
    if path.contains('\0') {
        error!(path, "Logical path contains a NUL byte");
        return Err(Error::InvalidPath(format!(
            "Path contains a NUL byte: {:?}",
            path
        )));
    }

    let folded = path.replace('\\', "/");
    for component in folded.split('/') {
        if component == ".." {
            error!(path, "Logical path contains a parent directory component");
            return Err(Error::InvalidPath(format!(
                "Path traversal attempt detected: {:?}",
                path
            )));
        }
    }

    Ok(())
}
