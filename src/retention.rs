// src/retention.rs

//! Retention & maintenance: revision pruning, and the periodic sweep that
//! retires expired admin sessions and orphaned staging directories.
//!
//! Grounded in the teacher's `server::mod::run_server` pattern of spawning
//! a single background `tokio::spawn`'d loop alongside the HTTP listener,
//! and in `server::jobs::JobManager::cleanup_expired`'s TTL-sweep shape.

use crate::auth::SessionStore;
use crate::db;
use crate::filesystem::RevisionStore;
use crate::model::Service;
use crate::transaction::TransactionManager;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a cancelled transaction stays visible to a status poll before
/// the sweep reaps it. Long enough that a client polling once a minute
/// will see the cancellation at least once.
const CANCELLED_TRANSACTION_GRACE: Duration = Duration::from_secs(600);

/// Prune revisions of `path` beyond the `keep` most recent, deleting both
/// the on-disk blob and the metadata row for each. Called after every
/// commit to the service.
pub fn prune_excess(conn: &Connection, store: &RevisionStore, service: Service, path: &str, keep: u64) -> crate::error::Result<usize> {
    let prunable = db::prunable_revisions(conn, service, path, keep)?;
    for revision_number in &prunable {
        let rel = crate::model::RelativePath::parse(path)?;
        store.remove_revision(service, &rel, *revision_number)?;
        db::delete_revision_row(conn, service, path, *revision_number)?;
    }
    Ok(prunable.len())
}

/// Remove staging directories left behind by transactions that are no
/// longer active (committed, rolled back, or cancelled) in case their
/// in-process cleanup was interrupted.
fn sweep_orphan_staging_dirs(conn: &Connection, staging_root: &Path) -> crate::error::Result<usize> {
    if !staging_root.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(staging_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let transaction_id = entry.file_name().to_string_lossy().into_owned();
        let record = db::get_operation_record(conn, &transaction_id)?;
        let orphaned = match record {
            Some(r) => r.status.is_terminal(),
            None => true,
        };
        if orphaned {
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                warn!(transaction_id, error = %e, "failed to remove orphaned staging directory");
            } else {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// One pass of the maintenance sweep: expired admin sessions, orphan
/// staging directories, then cancelled transactions past their retention
/// grace period. Revision pruning happens inline at commit time (see
/// [`prune_excess`]) rather than here, since it needs the set of paths
/// touched by a specific transaction.
pub fn run_maintenance_sweep(conn: &Connection, staging_root: &Path, sessions: &SessionStore, transactions: &TransactionManager) {
    sessions.cleanup_expired();
    match sweep_orphan_staging_dirs(conn, staging_root) {
        Ok(0) => debug!("maintenance sweep: no orphaned staging directories"),
        Ok(n) => info!(count = n, "maintenance sweep: removed orphaned staging directories"),
        Err(e) => warn!(error = %e, "maintenance sweep: failed to scan staging directory"),
    }
    let reaped = transactions.reap_cancelled(CANCELLED_TRANSACTION_GRACE);
    if reaped > 0 {
        info!(count = reaped, "maintenance sweep: reaped cancelled transactions");
    }
}

/// Spawn the periodic background sweep. Returns the join handle so the
/// caller can abort it on shutdown.
pub fn spawn_background_sweep(
    db_path: std::path::PathBuf,
    staging_root: std::path::PathBuf,
    sessions: Arc<SessionStore>,
    transactions: Arc<TransactionManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let db_path = db_path.clone();
            let staging_root = staging_root.clone();
            let sessions = sessions.clone();
            let transactions = transactions.clone();
            let result = tokio::task::spawn_blocking(move || {
                match Connection::open(&db_path) {
                    Ok(conn) => run_maintenance_sweep(&conn, &staging_root, &sessions, &transactions),
                    Err(e) => warn!(error = %e, "maintenance sweep: failed to open database"),
                }
            })
            .await;
            if let Err(e) = result {
                warn!(error = %e, "maintenance sweep task panicked");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::migrate;
    use crate::model::RelativePath;

    #[test]
    fn prune_excess_keeps_only_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let store = RevisionStore::new(dir.path().join("contemporary"), dir.path().join("traditional"));
        let path = RelativePath::parse("songs/a.pro").unwrap();

        for n in 1..=5u64 {
            store.store_revision(Service::Contemporary, &path, n, std::io::Cursor::new(b"x")).unwrap();
            db::insert_revision(
                &conn,
                db::NewRevision {
                    service: Service::Contemporary,
                    path: path.as_str(),
                    revision_number: n,
                    content_hash: Some("h"),
                    size: Some(1),
                    tombstone: false,
                    created_by: "alice",
                    operation_id: Some("op-1"),
                    changelist_id: None,
                    created_at: None,
                },
            )
            .unwrap();
        }

        let pruned = prune_excess(&conn, &store, Service::Contemporary, path.as_str(), 2).unwrap();
        assert_eq!(pruned, 3);
        assert!(store.read_revision(Service::Contemporary, &path, 1).is_err());
        assert!(store.read_revision(Service::Contemporary, &path, 5).is_ok());
    }

    #[test]
    fn sweep_removes_only_terminal_or_unknown_staging_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let staging_root = dir.path().join("staging");
        std::fs::create_dir_all(staging_root.join("op-active")).unwrap();
        std::fs::create_dir_all(staging_root.join("op-unknown")).unwrap();
        db::insert_operation_record(&conn, "op-active", Service::Contemporary, "push", "alice").unwrap();

        let sessions = SessionStore::new(Duration::from_secs(60));
        let store = RevisionStore::new(dir.path().join("contemporary"), dir.path().join("traditional"));
        let transactions = TransactionManager::new(staging_root.clone(), store);
        run_maintenance_sweep(&conn, &staging_root, &sessions, &transactions);

        assert!(staging_root.join("op-active").exists());
        assert!(!staging_root.join("op-unknown").exists());
    }

    #[test]
    fn sweep_leaves_freshly_cancelled_transaction_within_grace() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let staging_root = dir.path().join("staging");
        let store = RevisionStore::new(dir.path().join("contemporary"), dir.path().join("traditional"));
        let transactions = TransactionManager::new(staging_root.clone(), store);
        let id = transactions.begin(&conn, Service::Contemporary, "push", "alice").unwrap();
        transactions.cancel(&conn, &id, "maintenance").unwrap();

        let sessions = SessionStore::new(Duration::from_secs(60));
        run_maintenance_sweep(&conn, &staging_root, &sessions, &transactions);

        match transactions.status(&id, "alice") {
            Err(crate::error::Error::TransactionCancelled) => {}
            other => panic!("expected TransactionCancelled, got {other:?}"),
        }
    }
}
