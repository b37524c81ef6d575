// src/transaction/mod.rs

//! The transaction manager.
//!
//! Unlike the package-install transactions this module is descended from —
//! which persisted a CRC32-checksummed journal so a half-applied install
//! could be replayed after a crash — a revkeep transaction is in-memory
//! only. Durability lives in the metadata index: each transaction has a
//! corresponding `operation_records` row (see [`crate::db::models`]) that is
//! written `active` on begin and moved to a terminal status on commit or
//! rollback. If the process restarts with an operation record still
//! `active` or `aborting`, there is no journal to replay — recovery simply
//! marks the record `rolled_back` and removes its staging directory. See
//! [`recover_incomplete`].
//!
//! A transaction holds the process-wide write lock for its entire lifetime
//! (acquired by the caller via [`crate::lock::LockManager`] before `begin`,
//! released by the caller after `commit`/`rollback`/`cancel` returns) — the
//! manager itself does not know about locks, only about staged changes and
//! their commit-time application.
//!
//! Only the transaction's initiator may commit, roll back, or poll its
//! status — an admin cancellation is the one action another party can take
//! against it. A cancelled transaction is kept, tombstoned, in the map
//! rather than removed immediately, so the initiator's next `status` poll
//! can observe the distinguished cancellation rather than a plain
//! "not found"; [`TransactionManager::reap_cancelled`] evicts these entries
//! after a grace period.

use crate::db::{self, NewRevision};
use crate::error::{Error, Result};
use crate::filesystem::path::safe_join;
use crate::filesystem::RevisionStore;
use crate::model::{RelativePath, Service};
use rusqlite::Connection;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committing,
    Committed,
    Aborting,
    RolledBack,
    Cancelled,
}

impl From<TransactionState> for db::OperationStatus {
    fn from(state: TransactionState) -> Self {
        match state {
            TransactionState::Active => db::OperationStatus::Active,
            TransactionState::Committing => db::OperationStatus::Committing,
            TransactionState::Committed => db::OperationStatus::Committed,
            TransactionState::Aborting => db::OperationStatus::Aborting,
            TransactionState::RolledBack => db::OperationStatus::RolledBack,
            TransactionState::Cancelled => db::OperationStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone)]
enum StagedChange {
    Write { staging_path: PathBuf, size: u64, content_hash: String },
    Delete,
}

/// One in-flight (or just-cancelled) transaction.
pub struct Transaction {
    pub id: String,
    pub service: Service,
    pub initiator: String,
    pub op_type: String,
    pub state: TransactionState,
    staged: HashMap<RelativePath, StagedChange>,
    staging_dir: PathBuf,
    cancelled_at: Option<Instant>,
}

impl Transaction {
    /// Paths staged so far, in insertion order is not guaranteed.
    pub fn staged_paths(&self) -> Vec<&RelativePath> {
        self.staged.keys().collect()
    }
}

/// Owns every in-flight transaction. One instance per server process.
pub struct TransactionManager {
    transactions: Mutex<HashMap<String, Transaction>>,
    staging_root: PathBuf,
    store: RevisionStore,
}

fn require_owner(txn: &Transaction, requesting_user: &str) -> Result<()> {
    if txn.initiator != requesting_user {
        return Err(Error::PermissionDenied("transaction_owner"));
    }
    Ok(())
}

impl TransactionManager {
    pub fn new(staging_root: PathBuf, store: RevisionStore) -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            staging_root,
            store,
        }
    }

    /// Begin a new transaction. The caller must already hold the
    /// process-wide write lock.
    pub fn begin(&self, conn: &Connection, service: Service, op_type: &str, initiator: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let staging_dir = self.staging_root.join(&id);
        fs::create_dir_all(&staging_dir)?;

        db::insert_operation_record(conn, &id, service, op_type, initiator)?;

        let txn = Transaction {
            id: id.clone(),
            service,
            initiator: initiator.to_string(),
            op_type: op_type.to_string(),
            state: TransactionState::Active,
            staged: HashMap::new(),
            staging_dir,
            cancelled_at: None,
        };
        self.transactions.lock().unwrap().insert(id.clone(), txn);
        info!(transaction_id = %id, %service, "transaction begun");
        Ok(id)
    }

    /// Stage a file write within a transaction. Content is hashed as it is
    /// written to the transaction's staging directory; nothing touches the
    /// revision store until commit.
    pub fn stage_write(&self, transaction_id: &str, path: &RelativePath, content: impl Read) -> Result<(u64, String)> {
        let mut guard = self.transactions.lock().unwrap();
        let txn = guard
            .get_mut(transaction_id)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
        if txn.state != TransactionState::Active {
            return Err(Error::Validation(format!("transaction {transaction_id} is not active")));
        }

        let staging_path = safe_join(&txn.staging_dir, path.as_str())?;
        if let Some(parent) = staging_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let handle = write_staged_file(&staging_path, content)?;
        txn.staged.insert(
            path.clone(),
            StagedChange::Write {
                staging_path,
                size: handle.0,
                content_hash: handle.1.clone(),
            },
        );
        Ok(handle)
    }

    /// Stage a deletion (tombstone) within a transaction.
    pub fn stage_delete(&self, transaction_id: &str, path: &RelativePath) -> Result<()> {
        let mut guard = self.transactions.lock().unwrap();
        let txn = guard
            .get_mut(transaction_id)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
        if txn.state != TransactionState::Active {
            return Err(Error::Validation(format!("transaction {transaction_id} is not active")));
        }
        txn.staged.insert(path.clone(), StagedChange::Delete);
        Ok(())
    }

    /// Commit: apply every staged change as a new revision, update the
    /// metadata index, then remove the staging directory. This is the
    /// point of no return — once the first revision row is written,
    /// rollback is no longer offered for this transaction.
    ///
    /// Only `requesting_user` matching the transaction's initiator may
    /// commit it. A transaction a cancelled by an admin reports
    /// `Error::TransactionCancelled` rather than the generic "not active"
    /// validation error.
    pub fn commit(&self, conn: &mut Connection, transaction_id: &str, requesting_user: &str) -> Result<Vec<RelativePath>> {
        let mut guard = self.transactions.lock().unwrap();
        let txn = guard
            .get_mut(transaction_id)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
        require_owner(txn, requesting_user)?;
        if txn.state == TransactionState::Cancelled {
            return Err(Error::TransactionCancelled);
        }
        if txn.state != TransactionState::Active {
            return Err(Error::Validation(format!("transaction {transaction_id} is not active")));
        }
        txn.state = TransactionState::Committing;
        db::update_operation_status(conn, transaction_id, db::OperationStatus::Committing, None)?;

        let tx = conn.transaction()?;
        let changelist_id = if txn.staged.is_empty() {
            None
        } else {
            Some(db::insert_changelist(&tx, &txn.initiator, &txn.op_type, None)?)
        };

        let mut committed_paths = Vec::with_capacity(txn.staged.len());
        let mut files_written = 0u64;
        let mut files_deleted = 0u64;
        for (path, change) in &txn.staged {
            let revision_number = db::next_revision_number(&tx, txn.service, path.as_str())?;
            match change {
                StagedChange::Write { staging_path, size, content_hash } => {
                    let mut src = fs::File::open(staging_path)?;
                    self.store.store_revision(txn.service, path, revision_number, &mut src)?;
                    db::insert_revision(
                        &tx,
                        NewRevision {
                            service: txn.service,
                            path: path.as_str(),
                            revision_number,
                            content_hash: Some(content_hash),
                            size: Some(*size),
                            tombstone: false,
                            created_by: &txn.initiator,
                            operation_id: Some(transaction_id),
                            changelist_id,
                            created_at: None,
                        },
                    )?;
                    db::insert_operation_entry(&tx, transaction_id, path.as_str(), "write", Some(revision_number))?;
                    files_written += 1;
                }
                StagedChange::Delete => {
                    db::insert_revision(
                        &tx,
                        NewRevision {
                            service: txn.service,
                            path: path.as_str(),
                            revision_number,
                            content_hash: None,
                            size: None,
                            tombstone: true,
                            created_by: &txn.initiator,
                            operation_id: Some(transaction_id),
                            changelist_id,
                            created_at: None,
                        },
                    )?;
                    db::insert_operation_entry(&tx, transaction_id, path.as_str(), "delete", Some(revision_number))?;
                    files_deleted += 1;
                }
            }
            committed_paths.push(path.clone());
        }
        db::update_operation_status(&tx, transaction_id, db::OperationStatus::Committed, None)?;
        db::update_last_operation(
            &tx,
            &db::LastOperation {
                service: txn.service,
                op_type: txn.op_type.clone(),
                initiator: txn.initiator.clone(),
                completed_at: chrono::Utc::now(),
                files_total: committed_paths.len() as u64,
                files_pushed: Some(files_written + files_deleted),
                files_pulled: None,
            },
        )?;
        tx.commit()?;

        txn.state = TransactionState::Committed;
        let staging_dir = txn.staging_dir.clone();
        drop(guard);
        let _ = fs::remove_dir_all(&staging_dir);
        self.transactions.lock().unwrap().remove(transaction_id);

        info!(transaction_id, "transaction committed");
        Ok(committed_paths)
    }

    /// Roll back: discard staged changes without touching the revision
    /// store or the metadata index beyond marking the operation record.
    /// Only the transaction's initiator may roll it back.
    pub fn rollback(&self, conn: &Connection, transaction_id: &str, requesting_user: &str) -> Result<()> {
        {
            let guard = self.transactions.lock().unwrap();
            let txn = guard
                .get(transaction_id)
                .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
            require_owner(txn, requesting_user)?;
        }
        self.end_without_commit(conn, transaction_id, db::OperationStatus::RolledBack, None, false)
    }

    /// Admin-initiated cancellation. Unlike rollback, the transaction
    /// entry is retained (tombstoned) rather than removed, so the
    /// initiator's next `status` poll observes the cancellation instead of
    /// a plain "not found".
    pub fn cancel(&self, conn: &Connection, transaction_id: &str, reason: &str) -> Result<()> {
        self.end_without_commit(conn, transaction_id, db::OperationStatus::Cancelled, Some(reason), true)
    }

    /// Poll a transaction's liveness. Returns `Ok(())` while active,
    /// `Err(Error::TransactionCancelled)` if an admin cancelled it, or
    /// `Err(Error::TransactionNotFound)` once it has been reaped or never
    /// existed. Only the initiator may poll.
    pub fn status(&self, transaction_id: &str, requesting_user: &str) -> Result<()> {
        let guard = self.transactions.lock().unwrap();
        let txn = guard
            .get(transaction_id)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
        require_owner(txn, requesting_user)?;
        match txn.state {
            TransactionState::Cancelled => Err(Error::TransactionCancelled),
            _ => Ok(()),
        }
    }

    fn end_without_commit(
        &self,
        conn: &Connection,
        transaction_id: &str,
        status: db::OperationStatus,
        reason: Option<&str>,
        retain: bool,
    ) -> Result<()> {
        let mut guard = self.transactions.lock().unwrap();
        let txn = guard
            .get_mut(transaction_id)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;

        let staging_dir = txn.staging_dir.clone();
        txn.staged.clear();
        txn.state = match status {
            db::OperationStatus::RolledBack => TransactionState::RolledBack,
            db::OperationStatus::Cancelled => TransactionState::Cancelled,
            _ => txn.state,
        };
        if status == db::OperationStatus::Cancelled {
            txn.cancelled_at = Some(Instant::now());
        }
        if !retain {
            guard.remove(transaction_id);
        }
        drop(guard);

        db::update_operation_status(conn, transaction_id, status, reason)?;
        let _ = fs::remove_dir_all(&staging_dir);
        info!(transaction_id, ?status, "transaction ended without commit");
        Ok(())
    }

    pub fn is_active(&self, transaction_id: &str) -> bool {
        self.transactions
            .lock()
            .unwrap()
            .get(transaction_id)
            .map(|t| t.state == TransactionState::Active)
            .unwrap_or(false)
    }

    /// Evict cancelled transactions past their retention grace period.
    /// Called from the periodic maintenance sweep, not at cancel time,
    /// so a client has a window to observe the cancellation.
    pub fn reap_cancelled(&self, grace: Duration) -> usize {
        let mut guard = self.transactions.lock().unwrap();
        let before = guard.len();
        guard.retain(|_, txn| {
            txn.state != TransactionState::Cancelled
                || txn.cancelled_at.map(|at| at.elapsed() < grace).unwrap_or(true)
        });
        before - guard.len()
    }
}

fn write_staged_file(dest: &PathBuf, mut content: impl Read) -> Result<(u64, String)> {
    use crate::hash::Hasher;
    use std::io::Write;

    let mut file = fs::File::create(dest)?;
    let mut hasher = Hasher::new();
    let mut buffer = [0u8; 8192];
    let mut size = 0u64;
    loop {
        let n = content.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        hasher.update(&buffer[..n]);
        size += n as u64;
    }
    file.sync_all()?;
    Ok((size, hasher.finalize()))
}

/// Run at startup, before the server accepts traffic. Any operation record
/// still `active`, `committing`, or `aborting` means the process died
/// mid-transaction; since there is no journal to replay, the only safe
/// recovery is to mark it rolled back and remove whatever it staged.
pub fn recover_incomplete(conn: &Connection, staging_root: &std::path::Path) -> Result<usize> {
    let incomplete = db::list_incomplete_operations(conn)?;
    for record in &incomplete {
        warn!(operation_id = %record.id, status = record.status.as_str(), "recovering incomplete transaction at startup");
        db::update_operation_status(conn, &record.id, db::OperationStatus::RolledBack, Some("recovered after restart"))?;
        let staging_dir = staging_root.join(&record.id);
        if staging_dir.exists() {
            let _ = fs::remove_dir_all(&staging_dir);
        }
    }
    Ok(incomplete.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::migrate;
    use std::io::Cursor;

    fn setup() -> (tempfile::TempDir, Connection, TransactionManager) {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let store = RevisionStore::new(dir.path().join("contemporary"), dir.path().join("traditional"));
        let manager = TransactionManager::new(dir.path().join("staging"), store);
        (dir, conn, manager)
    }

    #[test]
    fn commit_writes_revision_and_clears_staging() {
        let (_dir, mut conn, manager) = setup();
        let path = RelativePath::parse("songs/sermon.pro").unwrap();

        let id = manager.begin(&conn, Service::Contemporary, "push", "alice").unwrap();
        manager.stage_write(&id, &path, Cursor::new(b"verse one")).unwrap();
        let committed = manager.commit(&mut conn, &id, "alice").unwrap();
        assert_eq!(committed, vec![path.clone()]);

        let revision = db::current_revision(&conn, Service::Contemporary, path.as_str()).unwrap().unwrap();
        assert_eq!(revision.revision_number, 0);
        assert!(revision.changelist_id.is_some());
        assert!(!manager.is_active(&id));
    }

    #[test]
    fn commit_by_non_initiator_is_rejected() {
        let (_dir, mut conn, manager) = setup();
        let path = RelativePath::parse("songs/sermon.pro").unwrap();
        let id = manager.begin(&conn, Service::Contemporary, "push", "alice").unwrap();
        manager.stage_write(&id, &path, Cursor::new(b"verse one")).unwrap();
        assert!(manager.commit(&mut conn, &id, "mallory").is_err());
    }

    #[test]
    fn rollback_discards_staged_changes() {
        let (_dir, conn, manager) = setup();
        let path = RelativePath::parse("songs/sermon.pro").unwrap();

        let id = manager.begin(&conn, Service::Contemporary, "push", "alice").unwrap();
        manager.stage_write(&id, &path, Cursor::new(b"verse one")).unwrap();
        manager.rollback(&conn, &id, "alice").unwrap();

        assert!(db::current_revision(&conn, Service::Contemporary, path.as_str()).unwrap().is_none());
        assert!(!manager.is_active(&id));
    }

    #[test]
    fn commit_unknown_transaction_errors() {
        let (_dir, mut conn, manager) = setup();
        assert!(manager.commit(&mut conn, "bogus", "alice").is_err());
    }

    #[test]
    fn cancelled_transaction_is_retained_for_status_poll() {
        let (_dir, conn, manager) = setup();
        let id = manager.begin(&conn, Service::Contemporary, "push", "alice").unwrap();
        manager.cancel(&conn, &id, "maintenance window").unwrap();

        match manager.status(&id, "alice") {
            Err(Error::TransactionCancelled) => {}
            other => panic!("expected TransactionCancelled, got {other:?}"),
        }
    }

    #[test]
    fn reap_cancelled_evicts_after_grace_period() {
        let (_dir, conn, manager) = setup();
        let id = manager.begin(&conn, Service::Contemporary, "push", "alice").unwrap();
        manager.cancel(&conn, &id, "maintenance window").unwrap();

        assert_eq!(manager.reap_cancelled(Duration::from_secs(3600)), 0);
        assert_eq!(manager.reap_cancelled(Duration::from_secs(0)), 1);
        assert!(manager.status(&id, "alice").is_err());
    }

    #[test]
    fn recover_incomplete_marks_active_records_rolled_back() {
        let (dir, conn, manager) = setup();
        let id = manager.begin(&conn, Service::Contemporary, "push", "alice").unwrap();
        // Simulate a crash: the in-memory transaction is gone but the
        // operation record is still `active`.
        drop(manager);

        let recovered = recover_incomplete(&conn, &dir.path().join("staging")).unwrap();
        assert_eq!(recovered, 1);
        let record = db::get_operation_record(&conn, &id).unwrap().unwrap();
        assert_eq!(record.status, db::OperationStatus::RolledBack);
    }
}
