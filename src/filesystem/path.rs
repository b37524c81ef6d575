// src/filesystem/path.rs

//! Path sanitization utilities for security
//!
//! `model::RelativePath` already rejects `..`/absolute paths at the protocol
//! boundary. These helpers are the second, disk-facing layer of defense used
//! wherever a path is joined onto a filesystem root — revision store blobs,
//! staging areas, client downloads.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Sanitize a path from an untrusted source.
///
/// 1. Rejects paths containing `..` (parent directory) components
/// 2. Skips `.` (current directory) components
/// 3. Strips leading slashes to make the path relative
/// 4. Returns an error for empty paths
///
/// ```
/// use revkeep::filesystem::path::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("songs/sermon.pro").unwrap(), PathBuf::from("songs/sermon.pro"));
/// assert_eq!(sanitize_path("/songs/sermon.pro").unwrap(), PathBuf::from("songs/sermon.pro"));
/// assert!(sanitize_path("../etc/passwd").is_err());
/// ```
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();
    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => return Err(Error::PathTraversal(path.to_path_buf())),
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath {
            path: path_str.to_string(),
            reason: "empty path after sanitization",
        });
    }

    Ok(normalized)
}

/// Safely join a root path with an untrusted path, verifying the joined
/// result cannot escape `root`.
///
/// ```
/// use revkeep::filesystem::path::safe_join;
/// use std::path::PathBuf;
///
/// let root = PathBuf::from("/var/revkeep/contemporary");
/// assert_eq!(
///     safe_join(&root, "songs/sermon.pro").unwrap(),
///     PathBuf::from("/var/revkeep/contemporary/songs/sermon.pro")
/// );
/// assert!(safe_join(&root, "../etc/passwd").is_err());
/// ```
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let sanitized = sanitize_path(path.as_ref())?;
    let joined = root.join(&sanitized);

    if let (Ok(canonical_root), Ok(canonical_joined)) =
        (root.canonicalize(), joined.canonicalize())
        && !canonical_joined.starts_with(&canonical_root)
    {
        return Err(Error::PathTraversal(joined));
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path_normal() {
        assert_eq!(sanitize_path("usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
    }

    #[test]
    fn test_sanitize_path_leading_slash() {
        assert_eq!(sanitize_path("/usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
        assert_eq!(sanitize_path("///usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
    }

    #[test]
    fn test_sanitize_path_dot() {
        assert_eq!(sanitize_path("./usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
        assert_eq!(sanitize_path("usr/./bin/./foo").unwrap(), PathBuf::from("usr/bin/foo"));
    }

    #[test]
    fn test_sanitize_path_traversal_rejected() {
        assert!(sanitize_path("..").is_err());
        assert!(sanitize_path("../etc/passwd").is_err());
        assert!(sanitize_path("usr/../../../etc/passwd").is_err());
    }

    #[test]
    fn test_sanitize_path_empty_rejected() {
        assert!(sanitize_path("").is_err());
        assert!(sanitize_path("/").is_err());
        assert!(sanitize_path("./").is_err());
    }

    #[test]
    fn test_safe_join_normal() {
        let root = PathBuf::from("/tmp/test");
        assert_eq!(safe_join(&root, "usr/bin/foo").unwrap(), PathBuf::from("/tmp/test/usr/bin/foo"));
    }

    #[test]
    fn test_safe_join_traversal_rejected() {
        let root = PathBuf::from("/tmp/test");
        assert!(safe_join(&root, "../etc/passwd").is_err());
    }
}
