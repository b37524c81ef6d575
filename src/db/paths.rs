// src/db/paths.rs
//! Centralized path derivation for revkeep's on-disk layout.

use std::path::{Path, PathBuf};

/// Get the directory containing the database
pub fn db_dir(db_path: &str) -> PathBuf {
    Path::new(db_path)
        .parent()
        .unwrap_or(Path::new("/var/lib/revkeep"))
        .to_path_buf()
}

/// Storage root for the Contemporary service's revisions.
pub fn contemporary_root(db_path: &str) -> PathBuf {
    std::env::var("REVKEEP_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| db_dir(db_path))
        .join("contemporary")
}

/// Storage root for the Traditional service's revisions.
pub fn traditional_root(db_path: &str) -> PathBuf {
    std::env::var("REVKEEP_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| db_dir(db_path))
        .join("traditional")
}

/// Staging directory for in-flight transaction uploads, kept on the same
/// filesystem as the storage roots so commit can rename rather than copy.
pub fn staging_dir(db_path: &str) -> PathBuf {
    std::env::var("REVKEEP_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| db_dir(db_path))
        .join("staging")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_dir() {
        assert_eq!(
            db_dir("/var/lib/revkeep/revkeep.db"),
            PathBuf::from("/var/lib/revkeep")
        );
    }

    #[test]
    fn test_service_roots() {
        assert_eq!(
            contemporary_root("/var/lib/revkeep/revkeep.db"),
            PathBuf::from("/var/lib/revkeep/contemporary")
        );
        assert_eq!(
            traditional_root("/var/lib/revkeep/revkeep.db"),
            PathBuf::from("/var/lib/revkeep/traditional")
        );
    }

    #[test]
    fn test_staging_dir() {
        assert_eq!(
            staging_dir("/var/lib/revkeep/revkeep.db"),
            PathBuf::from("/var/lib/revkeep/staging")
        );
    }
}
