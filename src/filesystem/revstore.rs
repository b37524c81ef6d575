// src/filesystem/revstore.rs

//! On-disk revision storage.
//!
//! Each service (`contemporary` or `traditional`) has its own storage
//! root. Under that root, a logical path `songs/sermon.pro` with
//! revision number `N` is stored as `songs/sermon.N.pro` — the
//! revision number is spliced in before the last extension component,
//! so a directory listing of retained revisions sorts and reads the
//! way a human would expect. A path with no extension gets a plain
//! `.N` suffix.
//!
//! Writes are never in-place: content is written to a temp file beside
//! the destination, fsync'd, then renamed into place. The rename is
//! atomic on a single filesystem; if the temp directory and the
//! destination happen to live on different filesystems (`EXDEV`) we
//! fall back to copy + fsync + remove.

use crate::error::{Error, Result};
use crate::hash::Hasher;
use crate::model::{RelativePath, Service};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Root-relative storage for one service's revisioned files.
#[derive(Clone)]
pub struct RevisionStore {
    roots: [PathBuf; 2],
}

/// Result of writing a new revision to disk.
pub struct RevisionHandle {
    pub path_on_disk: PathBuf,
    pub size: u64,
    pub content_hash: String,
}

impl RevisionStore {
    pub fn new(contemporary_root: impl Into<PathBuf>, traditional_root: impl Into<PathBuf>) -> Self {
        Self {
            roots: [contemporary_root.into(), traditional_root.into()],
        }
    }

    fn root(&self, service: Service) -> &Path {
        match service {
            Service::Contemporary => &self.roots[0],
            Service::Traditional => &self.roots[1],
        }
    }

    /// Compute the on-disk filename for a given logical path and revision.
    pub fn revision_filename(path: &RelativePath, revision: u64) -> PathBuf {
        let raw = path.as_str();
        let (dir, filename) = match raw.rfind('/') {
            Some(idx) => (&raw[..idx], &raw[idx + 1..]),
            None => ("", raw),
        };
        let stamped = match filename.rfind('.') {
            Some(idx) if idx > 0 => format!("{}.{}{}", &filename[..idx], revision, &filename[idx..]),
            _ => format!("{filename}.{revision}"),
        };
        if dir.is_empty() {
            PathBuf::from(stamped)
        } else {
            Path::new(dir).join(stamped)
        }
    }

    /// Absolute on-disk location of a given revision, without touching disk.
    pub fn revision_path(&self, service: Service, path: &RelativePath, revision: u64) -> PathBuf {
        self.root(service).join(Self::revision_filename(path, revision))
    }

    /// Write `content` as revision `revision` of `path` under `service`,
    /// hashing it as it streams to disk. Returns the resulting handle.
    pub fn store_revision(
        &self,
        service: Service,
        path: &RelativePath,
        revision: u64,
        mut content: impl Read,
    ) -> Result<RevisionHandle> {
        let dest = self.revision_path(service, path, revision);
        let parent = dest.parent().ok_or_else(|| Error::Internal("revision path has no parent".into()))?;
        fs::create_dir_all(parent)?;

        let tmp_path = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        let mut tmp_file = File::create(&tmp_path)?;

        let mut hasher = Hasher::new();
        let mut buffer = [0u8; 8192];
        let mut size: u64 = 0;
        loop {
            let n = content.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            tmp_file.write_all(&buffer[..n])?;
            hasher.update(&buffer[..n]);
            size += n as u64;
        }
        tmp_file.sync_all()?;
        drop(tmp_file);

        move_file_atomic(&tmp_path, &dest)?;
        fsync_dir(parent)?;

        Ok(RevisionHandle {
            path_on_disk: dest,
            size,
            content_hash: hasher.finalize(),
        })
    }

    /// Open a reader for an existing revision.
    pub fn read_revision(&self, service: Service, path: &RelativePath, revision: u64) -> Result<File> {
        let dest = self.revision_path(service, path, revision);
        File::open(&dest).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("revision {revision} of {path}"))
            } else {
                Error::Io(e)
            }
        })
    }

    /// Remove a revision's file from disk. Missing files are not an error —
    /// pruning is idempotent.
    pub fn remove_revision(&self, service: Service, path: &RelativePath, revision: u64) -> Result<()> {
        let dest = self.revision_path(service, path, revision);
        match fs::remove_file(&dest) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Rename `src` to `dest`, falling back to copy+fsync+remove when the two
/// paths live on different filesystems (`EXDEV`, e.g. a temp dir mounted as
/// tmpfs next to a storage root on a real disk).
fn move_file_atomic(src: &Path, dest: &Path) -> Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            fs::copy(src, dest)?;
            if let Ok(f) = File::open(dest) {
                f.sync_all()?;
            }
            fs::remove_file(src)?;
            Ok(())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18
}

#[cfg(not(unix))]
fn libc_exdev() -> i32 {
    i32::MIN
}

fn fsync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let f = File::open(dir)?;
        f.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn store() -> (tempfile::TempDir, RevisionStore) {
        let dir = tempfile::tempdir().unwrap();
        let contemporary = dir.path().join("contemporary");
        let traditional = dir.path().join("traditional");
        (dir, RevisionStore::new(contemporary, traditional))
    }

    #[test]
    fn revision_filename_splices_before_extension() {
        let path = RelativePath::parse("songs/sermon.pro").unwrap();
        assert_eq!(
            RevisionStore::revision_filename(&path, 3),
            PathBuf::from("songs/sermon.3.pro")
        );
    }

    #[test]
    fn revision_filename_handles_no_extension() {
        let path = RelativePath::parse("README").unwrap();
        assert_eq!(RevisionStore::revision_filename(&path, 2), PathBuf::from("README.2"));
    }

    #[test]
    fn store_and_read_round_trip() {
        let (_dir, store) = store();
        let path = RelativePath::parse("songs/sermon.pro").unwrap();
        let handle = store
            .store_revision(Service::Contemporary, &path, 1, Cursor::new(b"lyrics"))
            .unwrap();
        assert_eq!(handle.size, 6);

        let mut read_back = Vec::new();
        store
            .read_revision(Service::Contemporary, &path, 1)
            .unwrap()
            .read_to_end(&mut read_back)
            .unwrap();
        assert_eq!(read_back, b"lyrics");
    }

    #[test]
    fn remove_missing_revision_is_not_an_error() {
        let (_dir, store) = store();
        let path = RelativePath::parse("songs/sermon.pro").unwrap();
        assert!(store.remove_revision(Service::Contemporary, &path, 9).is_ok());
    }
}
