// src/db/schema.rs

//! Database schema definitions and migrations for revkeep.
//!
//! This module defines the SQLite schema for the metadata index and
//! provides a migration system to evolve the schema over time.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    info!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        info!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema — Version 1
///
/// - users: accounts and their bcrypt password hashes, with an
///   independently-grantable permission set (see `crate::auth::permissions`)
/// - settings: key/value runtime configuration (lock timeout, retention, ...)
/// - changelists: one row per committed transaction that wrote at least one
///   revision; groups the revisions it produced
/// - revisions: every retained revision of every path, per service
/// - last_operation: single-row summary of the most recently completed
///   operation, across both services
/// - operation_records: transaction history (durable half of the in-memory
///   transaction manager — see `crate::transaction`)
/// - operation_entries: per-path actions within an operation record
/// - ignore_patterns: gitignore-style filter rules, per service
/// - admin_audit_log: admin control-plane actions (cancel, user/permission edits)
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            permissions TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            disabled INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- One row per committed transaction that produced at least one
        -- revision. A pull-only transaction never creates one.
        CREATE TABLE changelists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            author TEXT NOT NULL,
            op_type TEXT NOT NULL CHECK(op_type IN ('push', 'reconcile', 'admin')),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            description TEXT
        );

        CREATE INDEX idx_changelists_author ON changelists(author);

        -- Every retained revision of every path, per service. The current
        -- revision for a (service, path) pair is the row with the highest
        -- revision_number; older rows are retained up to max_revisions.
        CREATE TABLE revisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service TEXT NOT NULL CHECK(service IN ('contemporary', 'traditional')),
            path TEXT NOT NULL,
            revision_number INTEGER NOT NULL,
            content_hash TEXT,
            size INTEGER,
            tombstone INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            created_by TEXT NOT NULL,
            operation_id TEXT,
            changelist_id INTEGER REFERENCES changelists(id),
            UNIQUE(service, path, revision_number)
        );

        CREATE INDEX idx_revisions_current ON revisions(service, path, revision_number DESC);
        CREATE INDEX idx_revisions_operation_id ON revisions(operation_id);
        CREATE INDEX idx_revisions_changelist_id ON revisions(changelist_id);

        -- Single-row summary of the most recently completed operation.
        -- Updated at each commit; read by GET /status/last_operation.
        CREATE TABLE last_operation (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            service TEXT NOT NULL CHECK(service IN ('contemporary', 'traditional')),
            op_type TEXT NOT NULL,
            initiator TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            files_total INTEGER NOT NULL,
            files_pulled INTEGER,
            files_pushed INTEGER
        );

        -- Durable record of a committed or rolled-back transaction. The
        -- transaction manager itself is in-memory; this row is what survives
        -- a restart so a reconnecting client can learn what happened to a
        -- transaction it started.
        CREATE TABLE operation_records (
            id TEXT PRIMARY KEY,
            service TEXT NOT NULL CHECK(service IN ('contemporary', 'traditional')),
            op_type TEXT NOT NULL CHECK(op_type IN ('push', 'pull', 'reconcile', 'admin')),
            status TEXT NOT NULL CHECK(status IN ('active', 'committing', 'committed', 'aborting', 'rolled_back', 'cancelled')),
            initiator TEXT NOT NULL,
            started_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            completed_at TEXT,
            cancel_reason TEXT
        );

        CREATE INDEX idx_operation_records_status ON operation_records(status);

        CREATE TABLE operation_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation_id TEXT NOT NULL,
            path TEXT NOT NULL,
            action TEXT NOT NULL CHECK(action IN ('write', 'delete')),
            revision_number INTEGER,
            FOREIGN KEY (operation_id) REFERENCES operation_records(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_operation_entries_operation_id ON operation_entries(operation_id);

        -- gitignore-style filter, evaluated in position order with
        -- last-match-wins semantics within a service.
        CREATE TABLE ignore_patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service TEXT NOT NULL CHECK(service IN ('contemporary', 'traditional')),
            pattern TEXT NOT NULL,
            position INTEGER NOT NULL,
            UNIQUE(service, position)
        );

        CREATE TABLE admin_audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_schema_version_tracking() {
        let (_temp, conn) = create_test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
        set_schema_version(&conn, 1).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_migrate_creates_all_tables() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "users",
            "settings",
            "changelists",
            "revisions",
            "last_operation",
            "operation_records",
            "operation_entries",
            "ignore_patterns",
            "admin_audit_log",
            "schema_version",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();
        let v1 = get_schema_version(&conn).unwrap();
        migrate(&conn).unwrap();
        let v2 = get_schema_version(&conn).unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1, SCHEMA_VERSION);
    }

    #[test]
    fn test_revisions_unique_constraint() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO revisions (service, path, revision_number, content_hash, size, created_by)
             VALUES ('contemporary', 'songs/sermon.pro', 1, 'abc', 10, 'alice')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO revisions (service, path, revision_number, content_hash, size, created_by)
             VALUES ('contemporary', 'songs/sermon.pro', 1, 'def', 20, 'bob')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_operation_entries_foreign_key() {
        let (_temp, conn) = create_test_db();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        migrate(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO operation_entries (operation_id, path, action) VALUES (?1, ?2, ?3)",
            ["missing-op", "songs/sermon.pro", "write"],
        );
        assert!(result.is_err());
    }
}
