// src/db/models.rs

//! Typed access to the metadata index's tables.
//!
//! revkeep has far fewer entity kinds than the teacher's package
//! database, so they live in one file rather than one file per table.

use crate::auth::permissions::PermissionSet;
use crate::error::{Error, Result};
use crate::model::Service;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

// ---------------------------------------------------------------------
// Users & permissions
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    pub disabled: bool,
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let permissions_str: String = row.get("permissions")?;
    let created_at: String = row.get("created_at")?;
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        permissions: PermissionSet::parse(&permissions_str).unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
        disabled: row.get::<_, i64>("disabled")? != 0,
    })
}

pub fn create_user(conn: &Connection, username: &str, password_hash: &str, permissions: &PermissionSet) -> Result<User> {
    conn.execute(
        "INSERT INTO users (username, password_hash, permissions) VALUES (?1, ?2, ?3)",
        params![username, password_hash, permissions.to_store_string()],
    )?;
    get_user_by_username(conn, username)?.ok_or_else(|| Error::Internal("user vanished after insert".into()))
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, password_hash, permissions, created_at, disabled FROM users WHERE username = ?1",
        params![username],
        row_to_user,
    )
    .optional()
    .map_err(Error::from)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password_hash, permissions, created_at, disabled FROM users ORDER BY username",
    )?;
    let rows = stmt.query_map([], row_to_user)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

pub fn set_user_password(conn: &Connection, username: &str, password_hash: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE username = ?2",
        params![password_hash, username],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("user '{username}'")));
    }
    Ok(())
}

pub fn set_user_disabled(conn: &Connection, username: &str, disabled: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET disabled = ?1 WHERE username = ?2",
        params![disabled as i64, username],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("user '{username}'")));
    }
    Ok(())
}

pub fn set_user_permissions(conn: &Connection, username: &str, permissions: &PermissionSet) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET permissions = ?1 WHERE username = ?2",
        params![permissions.to_store_string(), username],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("user '{username}'")));
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |r| r.get(0))
        .optional()
        .map_err(Error::from)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn get_setting_u64(conn: &Connection, key: &str, default: u64) -> Result<u64> {
    Ok(get_setting(conn, key)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(default))
}

// ---------------------------------------------------------------------
// Changelists
// ---------------------------------------------------------------------

/// A group of revisions produced by one committed transaction. Pull-only
/// transactions create no revisions and so never create a changelist.
#[derive(Debug, Clone)]
pub struct Changelist {
    pub id: i64,
    pub author: String,
    pub op_type: String,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}

fn row_to_changelist(row: &Row) -> rusqlite::Result<Changelist> {
    let created_at: String = row.get("created_at")?;
    Ok(Changelist {
        id: row.get("id")?,
        author: row.get("author")?,
        op_type: row.get("op_type")?,
        created_at: parse_timestamp(&created_at),
        description: row.get("description")?,
    })
}

pub fn insert_changelist(conn: &Connection, author: &str, op_type: &str, description: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO changelists (author, op_type, description) VALUES (?1, ?2, ?3)",
        params![author, op_type, description],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_changelist(conn: &Connection, id: i64) -> Result<Option<Changelist>> {
    conn.query_row(
        "SELECT id, author, op_type, created_at, description FROM changelists WHERE id = ?1",
        params![id],
        row_to_changelist,
    )
    .optional()
    .map_err(Error::from)
}

/// Changelists authored by `author`, most recent first.
pub fn list_user_changelists(conn: &Connection, author: &str) -> Result<Vec<Changelist>> {
    let mut stmt = conn.prepare(
        "SELECT id, author, op_type, created_at, description FROM changelists WHERE author = ?1 ORDER BY id DESC",
    )?;
    let rows = stmt.query_map(params![author], row_to_changelist)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

/// The revisions linked to one changelist, in the order they were written.
pub fn changelist_revisions(conn: &Connection, changelist_id: i64) -> Result<Vec<Revision>> {
    let mut stmt = conn.prepare(
        "SELECT id, service, path, revision_number, content_hash, size, tombstone, created_at, created_by, operation_id, changelist_id
         FROM revisions WHERE changelist_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![changelist_id], row_to_revision)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

// ---------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Revision {
    pub id: i64,
    pub service: Service,
    pub path: String,
    pub revision_number: u64,
    pub content_hash: Option<String>,
    pub size: Option<u64>,
    pub tombstone: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub operation_id: Option<String>,
    pub changelist_id: Option<i64>,
}

fn row_to_revision(row: &Row) -> rusqlite::Result<Revision> {
    let service_str: String = row.get("service")?;
    let created_at: String = row.get("created_at")?;
    Ok(Revision {
        id: row.get("id")?,
        service: Service::parse(&service_str).unwrap_or(Service::Contemporary),
        path: row.get("path")?,
        revision_number: row.get::<_, i64>("revision_number")? as u64,
        content_hash: row.get("content_hash")?,
        size: row.get::<_, Option<i64>>("size")?.map(|v| v as u64),
        tombstone: row.get::<_, i64>("tombstone")? != 0,
        created_at: parse_timestamp(&created_at),
        created_by: row.get("created_by")?,
        operation_id: row.get("operation_id")?,
        changelist_id: row.get("changelist_id")?,
    })
}

/// Fields for a new revision row. Built with `Default` plus field-update
/// syntax at call sites that only need a handful of fields set — see
/// `transaction::mod` and `restore`.
pub struct NewRevision<'a> {
    pub service: Service,
    pub path: &'a str,
    pub revision_number: u64,
    pub content_hash: Option<&'a str>,
    pub size: Option<u64>,
    pub tombstone: bool,
    pub created_by: &'a str,
    pub operation_id: Option<&'a str>,
    pub changelist_id: Option<i64>,
    /// Override `created_at`; `None` leaves it to SQLite's `CURRENT_TIMESTAMP`
    /// default. Used by `restore_revision` to preserve the archived
    /// revision's original timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

pub fn insert_revision(conn: &Connection, new: NewRevision) -> Result<Revision> {
    match new.created_at {
        Some(created_at) => {
            conn.execute(
                "INSERT INTO revisions (service, path, revision_number, content_hash, size, tombstone, created_by, operation_id, changelist_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    new.service.as_str(),
                    new.path,
                    new.revision_number as i64,
                    new.content_hash,
                    new.size.map(|s| s as i64),
                    new.tombstone as i64,
                    new.created_by,
                    new.operation_id,
                    new.changelist_id,
                    created_at.to_rfc3339(),
                ],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO revisions (service, path, revision_number, content_hash, size, tombstone, created_by, operation_id, changelist_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    new.service.as_str(),
                    new.path,
                    new.revision_number as i64,
                    new.content_hash,
                    new.size.map(|s| s as i64),
                    new.tombstone as i64,
                    new.created_by,
                    new.operation_id,
                    new.changelist_id,
                ],
            )?;
        }
    }
    get_revision(conn, new.service, new.path, new.revision_number)?
        .ok_or_else(|| Error::Internal("revision vanished after insert".into()))
}

/// The highest-numbered revision row for a (service, path) pair, if any.
pub fn current_revision(conn: &Connection, service: Service, path: &str) -> Result<Option<Revision>> {
    conn.query_row(
        "SELECT id, service, path, revision_number, content_hash, size, tombstone, created_at, created_by, operation_id, changelist_id
         FROM revisions WHERE service = ?1 AND path = ?2 ORDER BY revision_number DESC LIMIT 1",
        params![service.as_str(), path],
        row_to_revision,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_revision(conn: &Connection, service: Service, path: &str, revision_number: u64) -> Result<Option<Revision>> {
    conn.query_row(
        "SELECT id, service, path, revision_number, content_hash, size, tombstone, created_at, created_by, operation_id, changelist_id
         FROM revisions WHERE service = ?1 AND path = ?2 AND revision_number = ?3",
        params![service.as_str(), path, revision_number as i64],
        row_to_revision,
    )
    .optional()
    .map_err(Error::from)
}

/// Every retained revision of `path`, most recent first — backs the
/// `/files/revisions` history endpoint.
pub fn list_revisions(conn: &Connection, service: Service, path: &str) -> Result<Vec<Revision>> {
    let mut stmt = conn.prepare(
        "SELECT id, service, path, revision_number, content_hash, size, tombstone, created_at, created_by, operation_id, changelist_id
         FROM revisions WHERE service = ?1 AND path = ?2 ORDER BY revision_number DESC",
    )?;
    let rows = stmt.query_map(params![service.as_str(), path], row_to_revision)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

/// `max(existing revision numbers) + 1`, or `0` if `path` has no revision
/// yet — revision numbers start at 0 for the first upload.
pub fn next_revision_number(conn: &Connection, service: Service, path: &str) -> Result<u64> {
    Ok(current_revision(conn, service, path)?.map(|r| r.revision_number + 1).unwrap_or(0))
}

/// All non-tombstoned paths and their current revision, for a full listing
/// or a reconcile scan.
pub fn list_current_paths(conn: &Connection, service: Service) -> Result<Vec<Revision>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.service, r.path, r.revision_number, r.content_hash, r.size, r.tombstone, r.created_at, r.created_by, r.operation_id, r.changelist_id
         FROM revisions r
         INNER JOIN (
             SELECT path, MAX(revision_number) AS max_rev FROM revisions WHERE service = ?1 GROUP BY path
         ) latest ON r.path = latest.path AND r.revision_number = latest.max_rev
         WHERE r.service = ?1
         ORDER BY r.path",
    )?;
    let rows = stmt.query_map(params![service.as_str()], row_to_revision)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

/// Revision numbers for `path` older than the `keep` most recent, oldest
/// first — callers delete the on-disk blob for each, then the rows.
pub fn prunable_revisions(conn: &Connection, service: Service, path: &str, keep: u64) -> Result<Vec<u64>> {
    let mut stmt = conn.prepare(
        "SELECT revision_number FROM revisions WHERE service = ?1 AND path = ?2
         ORDER BY revision_number DESC LIMIT -1 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![service.as_str(), path, keep as i64], |r| {
        r.get::<_, i64>(0).map(|v| v as u64)
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

pub fn delete_revision_row(conn: &Connection, service: Service, path: &str, revision_number: u64) -> Result<()> {
    conn.execute(
        "DELETE FROM revisions WHERE service = ?1 AND path = ?2 AND revision_number = ?3",
        params![service.as_str(), path, revision_number as i64],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------
// Last-operation summary
// ---------------------------------------------------------------------

/// Single-row summary of the most recently completed operation, across
/// both services — backs `GET /status/last_operation`. Updated at each
/// successful commit.
#[derive(Debug, Clone)]
pub struct LastOperation {
    pub service: Service,
    pub op_type: String,
    pub initiator: String,
    pub completed_at: DateTime<Utc>,
    pub files_total: u64,
    pub files_pulled: Option<u64>,
    pub files_pushed: Option<u64>,
}

pub fn update_last_operation(conn: &Connection, summary: &LastOperation) -> Result<()> {
    conn.execute(
        "INSERT INTO last_operation (id, service, op_type, initiator, completed_at, files_total, files_pulled, files_pushed)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             service = excluded.service,
             op_type = excluded.op_type,
             initiator = excluded.initiator,
             completed_at = excluded.completed_at,
             files_total = excluded.files_total,
             files_pulled = excluded.files_pulled,
             files_pushed = excluded.files_pushed",
        params![
            summary.service.as_str(),
            summary.op_type,
            summary.initiator,
            summary.completed_at.to_rfc3339(),
            summary.files_total as i64,
            summary.files_pulled.map(|v| v as i64),
            summary.files_pushed.map(|v| v as i64),
        ],
    )?;
    Ok(())
}

pub fn get_last_operation(conn: &Connection) -> Result<Option<LastOperation>> {
    conn.query_row(
        "SELECT service, op_type, initiator, completed_at, files_total, files_pulled, files_pushed
         FROM last_operation WHERE id = 1",
        [],
        |row| {
            let service_str: String = row.get("service")?;
            let completed_at: String = row.get("completed_at")?;
            Ok(LastOperation {
                service: Service::parse(&service_str).unwrap_or(Service::Contemporary),
                op_type: row.get("op_type")?,
                initiator: row.get("initiator")?,
                completed_at: parse_timestamp(&completed_at),
                files_total: row.get::<_, i64>("files_total")? as u64,
                files_pulled: row.get::<_, Option<i64>>("files_pulled")?.map(|v| v as u64),
                files_pushed: row.get::<_, Option<i64>>("files_pushed")?.map(|v| v as u64),
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

// ---------------------------------------------------------------------
// Operation records (durable half of the transaction manager)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Active,
    Committing,
    Committed,
    Aborting,
    RolledBack,
    Cancelled,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Active => "active",
            OperationStatus::Committing => "committing",
            OperationStatus::Committed => "committed",
            OperationStatus::Aborting => "aborting",
            OperationStatus::RolledBack => "rolled_back",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "active" => OperationStatus::Active,
            "committing" => OperationStatus::Committing,
            "committed" => OperationStatus::Committed,
            "aborting" => OperationStatus::Aborting,
            "rolled_back" => OperationStatus::RolledBack,
            "cancelled" => OperationStatus::Cancelled,
            other => return Err(Error::Validation(format!("unknown operation status '{other}'"))),
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Committed | OperationStatus::RolledBack | OperationStatus::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub id: String,
    pub service: Service,
    pub op_type: String,
    pub status: OperationStatus,
    pub initiator: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

fn row_to_operation(row: &Row) -> rusqlite::Result<OperationRecord> {
    let service_str: String = row.get("service")?;
    let status_str: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    Ok(OperationRecord {
        id: row.get("id")?,
        service: Service::parse(&service_str).unwrap_or(Service::Contemporary),
        op_type: row.get("op_type")?,
        status: OperationStatus::parse(&status_str).unwrap_or(OperationStatus::Active),
        initiator: row.get("initiator")?,
        started_at: parse_timestamp(&started_at),
        completed_at: completed_at.map(|s| parse_timestamp(&s)),
        cancel_reason: row.get("cancel_reason")?,
    })
}

pub fn insert_operation_record(
    conn: &Connection,
    id: &str,
    service: Service,
    op_type: &str,
    initiator: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO operation_records (id, service, op_type, status, initiator) VALUES (?1, ?2, ?3, 'active', ?4)",
        params![id, service.as_str(), op_type, initiator],
    )?;
    Ok(())
}

pub fn update_operation_status(
    conn: &Connection,
    id: &str,
    status: OperationStatus,
    cancel_reason: Option<&str>,
) -> Result<()> {
    let completed_at = status.is_terminal().then(|| Utc::now().to_rfc3339());
    conn.execute(
        "UPDATE operation_records SET status = ?1, completed_at = COALESCE(?2, completed_at), cancel_reason = COALESCE(?3, cancel_reason)
         WHERE id = ?4",
        params![status.as_str(), completed_at, cancel_reason, id],
    )?;
    Ok(())
}

pub fn get_operation_record(conn: &Connection, id: &str) -> Result<Option<OperationRecord>> {
    conn.query_row(
        "SELECT id, service, op_type, status, initiator, started_at, completed_at, cancel_reason
         FROM operation_records WHERE id = ?1",
        params![id],
        row_to_operation,
    )
    .optional()
    .map_err(Error::from)
}

/// Operations left `active` or `aborting` — used at startup to mark any
/// operation that never reached a terminal state as rolled back, since
/// revkeep keeps no durable per-transaction journal to replay.
pub fn list_incomplete_operations(conn: &Connection) -> Result<Vec<OperationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, service, op_type, status, initiator, started_at, completed_at, cancel_reason
         FROM operation_records WHERE status IN ('active', 'committing', 'aborting')",
    )?;
    let rows = stmt.query_map([], row_to_operation)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

pub fn insert_operation_entry(conn: &Connection, operation_id: &str, path: &str, action: &str, revision_number: Option<u64>) -> Result<()> {
    conn.execute(
        "INSERT INTO operation_entries (operation_id, path, action, revision_number) VALUES (?1, ?2, ?3, ?4)",
        params![operation_id, path, action, revision_number.map(|v| v as i64)],
    )?;
    Ok(())
}

pub fn list_operation_entries(conn: &Connection, operation_id: &str) -> Result<Vec<(String, String, Option<u64>)>> {
    let mut stmt = conn.prepare(
        "SELECT path, action, revision_number FROM operation_entries WHERE operation_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![operation_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<i64>>(2)?.map(|v| v as u64),
        ))
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

// ---------------------------------------------------------------------
// Ignore patterns
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IgnorePatternRow {
    pub pattern: String,
    pub position: i64,
}

pub fn list_ignore_patterns(conn: &Connection, service: Service) -> Result<Vec<IgnorePatternRow>> {
    let mut stmt = conn.prepare(
        "SELECT pattern, position FROM ignore_patterns WHERE service = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![service.as_str()], |row| {
        Ok(IgnorePatternRow {
            pattern: row.get(0)?,
            position: row.get(1)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

/// Replace the entire ignore-pattern list for a service, in one transaction.
pub fn replace_ignore_patterns(conn: &mut Connection, service: Service, patterns: &[String]) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM ignore_patterns WHERE service = ?1", params![service.as_str()])?;
    for (position, pattern) in patterns.iter().enumerate() {
        tx.execute(
            "INSERT INTO ignore_patterns (service, pattern, position) VALUES (?1, ?2, ?3)",
            params![service.as_str(), pattern, position as i64],
        )?;
    }
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------
// Admin audit log
// ---------------------------------------------------------------------

pub fn record_audit_event(conn: &Connection, actor: &str, action: &str, detail: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT INTO admin_audit_log (actor, action, detail) VALUES (?1, ?2, ?3)",
        params![actor, action, detail],
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn list_audit_log(conn: &Connection, limit: u64) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT actor, action, detail, created_at FROM admin_audit_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        let created_at: String = row.get("created_at")?;
        Ok(AuditEntry {
            actor: row.get("actor")?,
            action: row.get("action")?,
            detail: row.get("detail")?,
            created_at: parse_timestamp(&created_at),
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite's CURRENT_TIMESTAMP default is "YYYY-MM-DD HH:MM:SS" (UTC, no offset).
            DateTime::parse_from_str(&format!("{s} +0000"), "%Y-%m-%d %H:%M:%S %z")
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::Permission;
    use crate::db::schema::migrate;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    fn new_revision(service: Service, path: &str, revision_number: u64, hash: &str) -> NewRevision<'_> {
        NewRevision {
            service,
            path,
            revision_number,
            content_hash: Some(hash),
            size: Some(1),
            tombstone: false,
            created_by: "alice",
            operation_id: Some("op-1"),
            changelist_id: None,
            created_at: None,
        }
    }

    #[test]
    fn user_round_trip() {
        let conn = test_conn();
        let permissions = PermissionSet::new([Permission::CanPush, Permission::CanPull]);
        create_user(&conn, "alice", "hash", &permissions).unwrap();
        let user = get_user_by_username(&conn, "alice").unwrap().unwrap();
        assert!(user.permissions.has(Permission::CanPush));
        assert!(!user.permissions.has(Permission::Admin));
        assert!(!user.disabled);
    }

    #[test]
    fn revision_numbering_starts_at_zero() {
        let conn = test_conn();
        assert_eq!(next_revision_number(&conn, Service::Contemporary, "songs/a.pro").unwrap(), 0);
        insert_revision(&conn, new_revision(Service::Contemporary, "songs/a.pro", 0, "h1")).unwrap();
        assert_eq!(next_revision_number(&conn, Service::Contemporary, "songs/a.pro").unwrap(), 1);
    }

    #[test]
    fn prunable_revisions_keeps_most_recent() {
        let conn = test_conn();
        for n in 0..5u64 {
            insert_revision(&conn, new_revision(Service::Contemporary, "songs/a.pro", n, "h")).unwrap();
        }
        let prunable = prunable_revisions(&conn, Service::Contemporary, "songs/a.pro", 3).unwrap();
        assert_eq!(prunable, vec![1, 0]);
    }

    #[test]
    fn settings_round_trip_with_default() {
        let conn = test_conn();
        assert_eq!(get_setting_u64(&conn, "lock_timeout_seconds", 300).unwrap(), 300);
        set_setting(&conn, "lock_timeout_seconds", "600").unwrap();
        assert_eq!(get_setting_u64(&conn, "lock_timeout_seconds", 300).unwrap(), 600);
    }

    #[test]
    fn operation_lifecycle() {
        let conn = test_conn();
        insert_operation_record(&conn, "op-1", Service::Contemporary, "push", "alice").unwrap();
        let rec = get_operation_record(&conn, "op-1").unwrap().unwrap();
        assert_eq!(rec.status, OperationStatus::Active);

        update_operation_status(&conn, "op-1", OperationStatus::Committed, None).unwrap();
        let rec = get_operation_record(&conn, "op-1").unwrap().unwrap();
        assert_eq!(rec.status, OperationStatus::Committed);
        assert!(rec.completed_at.is_some());
    }

    #[test]
    fn changelist_links_its_revisions() {
        let conn = test_conn();
        let changelist_id = insert_changelist(&conn, "alice", "push", Some("weekly update")).unwrap();
        let mut new = new_revision(Service::Contemporary, "songs/a.pro", 0, "h1");
        new.changelist_id = Some(changelist_id);
        insert_revision(&conn, new).unwrap();

        let revisions = changelist_revisions(&conn, changelist_id).unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].changelist_id, Some(changelist_id));

        let listed = list_user_changelists(&conn, "alice").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description.as_deref(), Some("weekly update"));
    }

    #[test]
    fn last_operation_round_trip() {
        let conn = test_conn();
        assert!(get_last_operation(&conn).unwrap().is_none());
        update_last_operation(
            &conn,
            &LastOperation {
                service: Service::Traditional,
                op_type: "reconcile".to_string(),
                initiator: "bob".to_string(),
                completed_at: Utc::now(),
                files_total: 5,
                files_pulled: Some(3),
                files_pushed: Some(2),
            },
        )
        .unwrap();
        let summary = get_last_operation(&conn).unwrap().unwrap();
        assert_eq!(summary.initiator, "bob");
        assert_eq!(summary.files_pulled, Some(3));
    }
}
