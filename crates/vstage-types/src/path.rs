//! Logical paths.
//!
//! A logical path names a file in an object's state, independent of where its
//! content lives on disk. Logical paths are slash-separated, relative, and
//! made of non-empty segments other than `.` and `..`. The root of the
//! logical tree is written `.` (or the empty string) and is only meaningful
//! as a directory, never as a file name.

use crate::error::TypeError;

/// Returns `true` if `path` names the root of the logical tree.
pub fn is_root(path: &str) -> bool {
    path.is_empty() || path == "."
}

/// Check that `path` is usable as a file name in an object's state.
///
/// The root (`.` or empty) is rejected: it can only name a directory.
pub fn validate_logical_path(path: &str) -> Result<(), TypeError> {
    if is_root(path) {
        return Err(TypeError::InvalidLogicalPath(path.to_string()));
    }
    let valid = path
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if !valid {
        return Err(TypeError::InvalidLogicalPath(path.to_string()));
    }
    Ok(())
}

/// Check that `dir` is usable as a logical directory (the root is allowed).
pub fn validate_logical_dir(dir: &str) -> Result<(), TypeError> {
    if is_root(dir) {
        return Ok(());
    }
    validate_logical_path(dir)
}

/// Join a logical directory and a relative path.
///
/// Joining onto the root returns `rel` unchanged.
pub fn join_logical(dir: &str, rel: &str) -> String {
    if is_root(dir) {
        rel.to_string()
    } else {
        format!("{dir}/{rel}")
    }
}

/// Returns `true` if `path` lies strictly inside the logical directory `dir`.
///
/// Every path is under the root. A path is never under itself.
pub fn is_under(path: &str, dir: &str) -> bool {
    if is_root(dir) {
        return true;
    }
    path.len() > dir.len() + 1
        && path.starts_with(dir)
        && path.as_bytes()[dir.len()] == b'/'
}

/// Iterate over the proper ancestors of `path`, nearest first.
///
/// `a/b/c` yields `a/b` then `a`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut rest = path;
    std::iter::from_fn(move || {
        let idx = rest.rfind('/')?;
        rest = &rest[..idx];
        Some(rest)
    })
}
