// src/restore.rs

//! Restoring an older revision of a file to current. Unlike push/pull,
//! this runs outside the transaction system and needs no lock: it is a
//! single metadata-index write plus at most one blob copy, not a batch
//! of client-staged changes.
//!
//! Restoring revision `N` does not simply relabel it current — the
//! existing current revision is archived first, so `N` stays reachable
//! at its original number and the restored content gets a fresh
//! revision of its own. Both new rows land in the same changelist so a
//! client's history view shows the restore as one event.

use crate::db::{self, NewRevision};
use crate::error::{Error, Result};
use crate::filesystem::RevisionStore;
use crate::model::{RelativePath, Service};
use rusqlite::Connection;

pub struct RestoreOutcome {
    pub archived_revision: u64,
    pub restored_revision: db::Revision,
}

/// Restore `path` to the content of `target_revision`.
///
/// Steps:
/// 1. The current revision is archived to the next free revision number,
///    with its original content hash, size, and timestamp preserved.
/// 2. `target_revision`'s content is copied to the revision number after
///    that, with a freshly computed hash/size, `now` as the timestamp,
///    and `restoring_user` as the author.
///
/// Fails if `target_revision` is already current, or if either revision
/// is missing.
pub fn restore_revision(
    conn: &Connection,
    store: &RevisionStore,
    service: Service,
    path: &RelativePath,
    target_revision: u64,
    restoring_user: &str,
) -> Result<RestoreOutcome> {
    let current = db::current_revision(conn, service, path.as_str())?
        .ok_or_else(|| Error::NotFound(format!("{service}/{path}")))?;
    if target_revision == current.revision_number {
        return Err(Error::Validation("revision is already current".to_string()));
    }
    let target = db::get_revision(conn, service, path.as_str(), target_revision)?
        .ok_or_else(|| Error::NotFound(format!("{service}/{path}#{target_revision}")))?;

    let changelist_id = db::insert_changelist(conn, restoring_user, "admin", Some(&format!("restore {path} to revision {target_revision}")))?;

    let archive_number = db::next_revision_number(conn, service, path.as_str())?;
    if !current.tombstone {
        let blob = store.read_revision(service, path, current.revision_number)?;
        store.store_revision(service, path, archive_number, blob)?;
    }
    db::insert_revision(
        conn,
        NewRevision {
            service,
            path: path.as_str(),
            revision_number: archive_number,
            content_hash: current.content_hash.as_deref(),
            size: current.size,
            tombstone: current.tombstone,
            created_by: &current.created_by,
            operation_id: None,
            changelist_id: Some(changelist_id),
            created_at: Some(current.created_at),
        },
    )?;

    let restored_number = archive_number + 1;
    let (content_hash, size) = if target.tombstone {
        (None, None)
    } else {
        let blob = store.read_revision(service, path, target_revision)?;
        let handle = store.store_revision(service, path, restored_number, blob)?;
        (Some(handle.content_hash), Some(handle.size))
    };
    let restored = db::insert_revision(
        conn,
        NewRevision {
            service,
            path: path.as_str(),
            revision_number: restored_number,
            content_hash: content_hash.as_deref(),
            size,
            tombstone: target.tombstone,
            created_by: restoring_user,
            operation_id: None,
            changelist_id: Some(changelist_id),
            created_at: None,
        },
    )?;

    Ok(RestoreOutcome {
        archived_revision: archive_number,
        restored_revision: restored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::migrate;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    fn harness() -> (Connection, RevisionStore, TempDir) {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let dir = TempDir::new().unwrap();
        let store = RevisionStore::new(dir.path().join("contemporary"), dir.path().join("traditional"));
        (conn, store, dir)
    }

    fn write_revision(conn: &Connection, store: &RevisionStore, path: &RelativePath, revision: u64, content: &[u8], author: &str) {
        let handle = store.store_revision(Service::Contemporary, path, revision, Cursor::new(content.to_vec())).unwrap();
        db::insert_revision(
            conn,
            NewRevision {
                service: Service::Contemporary,
                path: path.as_str(),
                revision_number: revision,
                content_hash: Some(&handle.content_hash),
                size: Some(handle.size),
                tombstone: false,
                created_by: author,
                operation_id: None,
                changelist_id: None,
                created_at: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn restore_archives_current_and_recreates_target() {
        let (conn, store, _dir) = harness();
        let path = RelativePath::parse("songs/sermon.pro").unwrap();
        write_revision(&conn, &store, &path, 0, b"version zero", "alice");
        write_revision(&conn, &store, &path, 1, b"version one", "alice");

        let outcome = restore_revision(&conn, &store, Service::Contemporary, &path, 0, "bob").unwrap();
        assert_eq!(outcome.archived_revision, 2);
        assert_eq!(outcome.restored_revision.revision_number, 3);
        assert_eq!(outcome.restored_revision.created_by, "bob");

        let current = db::current_revision(&conn, Service::Contemporary, path.as_str()).unwrap().unwrap();
        assert_eq!(current.revision_number, 3);
        let mut restored_file = store.read_revision(Service::Contemporary, &path, 3).unwrap();
        let mut contents = Vec::new();
        restored_file.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"version zero");

        let archived = db::get_revision(&conn, Service::Contemporary, path.as_str(), 2).unwrap().unwrap();
        assert_eq!(archived.content_hash, db::get_revision(&conn, Service::Contemporary, path.as_str(), 1).unwrap().unwrap().content_hash);
    }

    #[test]
    fn restoring_current_revision_is_rejected() {
        let (conn, store, _dir) = harness();
        let path = RelativePath::parse("songs/sermon.pro").unwrap();
        write_revision(&conn, &store, &path, 0, b"only version", "alice");
        assert!(restore_revision(&conn, &store, Service::Contemporary, &path, 0, "bob").is_err());
    }
}
