// src/server/handlers/transaction.rs
//! Transaction lifecycle endpoints: begin (acquires the process-wide write
//! lock), commit, rollback, status. The lock is released by whichever of
//! commit or rollback runs, whether or not it succeeds.

use crate::auth::permissions::Permission;
use crate::db;
use crate::error::{Error, Result};
use crate::model::{RelativePath, Service};
use crate::reconcile::{self, ClientEntry, ReconcileAction, TombstonePolicy};
use crate::server::handlers::extract::AuthUser;
use crate::server::ServerState;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

fn require(user: &AuthUser, permission: Permission) -> Result<()> {
    if !user.permissions.has(permission) {
        return Err(Error::PermissionDenied(permission.as_str()));
    }
    Ok(())
}

/// Permission gating per `op_type`. Pull needs nothing beyond a valid
/// credential — it only takes the lock to keep from racing a concurrent
/// commit.
fn required_permission(op_type: &str) -> Option<Permission> {
    match op_type {
        "push" => Some(Permission::CanPush),
        "reconcile" => Some(Permission::CanReconcile),
        _ => None,
    }
}

#[derive(Deserialize)]
pub struct ClientFileEntry {
    pub path: String,
    pub size: u64,
    pub content_hash: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct BeginRequest {
    /// "push", "pull", or "reconcile".
    pub op_type: String,
    /// Only meaningful for `op_type: "reconcile"` — the client's current
    /// file listing, compared against the server's current revisions.
    #[serde(default)]
    pub client_files: Vec<ClientFileEntry>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct BeginResponse {
    pub transaction_id: String,
    pub lock_token: String,
    pub timeout_seconds: u64,
    /// Reconcile only: paths the client should upload.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_to_push: Vec<String>,
    /// Reconcile only: paths the client should download.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_to_pull: Vec<String>,
    /// Reconcile only: paths the client should remove locally.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_to_delete_locally: Vec<String>,
}

/// A reconcile lock needs to outlast the push/pull it plans, which scales
/// with how much data and how many files are in play — a fixed timeout
/// tuned for a single push is too short for a reconcile over a large
/// library. `min_lock_timeout_seconds` is a floor, not the whole formula.
fn reconcile_timeout_seconds(min_timeout: u64, client_files: &[ClientFileEntry]) -> u64 {
    let total_size_mb = client_files.iter().map(|f| f.size).sum::<u64>() / (1024 * 1024);
    let total_file_count = client_files.len() as u64;
    std::cmp::max(min_timeout, total_size_mb + 2 * total_file_count)
}

/// POST /v1/:service/transactions
pub async fn begin(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path(service): Path<String>,
    Json(req): Json<BeginRequest>,
) -> Result<Response> {
    if let Some(permission) = required_permission(&req.op_type) {
        require(&auth, permission)?;
    }
    let service = Service::parse(&service)?;

    let conn = state.db.lock().unwrap();
    let min_timeout = db::get_setting_u64(&conn, "min_lock_timeout_seconds", 300)?;
    let timeout_secs = if req.op_type == "reconcile" {
        reconcile_timeout_seconds(min_timeout, &req.client_files)
    } else {
        min_timeout
    };

    let lock_token = state
        .locks
        .acquire(&auth.username, &req.op_type, Duration::from_secs(timeout_secs))
        .map_err(|busy| {
            state.metrics.record_lock_contention();
            Error::LockBusy {
                holder: busy.holder,
                op_type: busy.op_type,
                elapsed_secs: busy.elapsed_secs,
            }
        })?;

    let transaction_id = match state.transactions.begin(&conn, service, &req.op_type, &auth.username) {
        Ok(id) => id,
        Err(e) => {
            state.locks.release(&lock_token);
            return Err(e);
        }
    };

    let (files_to_push, files_to_pull, files_to_delete_locally) = if req.op_type == "reconcile" {
        match plan_reconcile(&conn, service, &req.client_files) {
            Ok(plan) => plan,
            Err(e) => {
                state.locks.release(&lock_token);
                return Err(e);
            }
        }
    } else {
        (Vec::new(), Vec::new(), Vec::new())
    };

    Ok(axum::Json(BeginResponse {
        transaction_id,
        lock_token,
        timeout_seconds: timeout_secs,
        files_to_push,
        files_to_pull,
        files_to_delete_locally,
    })
    .into_response())
}

type ReconcilePlanLists = (Vec<String>, Vec<String>, Vec<String>);

fn plan_reconcile(conn: &rusqlite::Connection, service: Service, client_files: &[ClientFileEntry]) -> Result<ReconcilePlanLists> {
    let mut entries = Vec::with_capacity(client_files.len());
    for f in client_files {
        entries.push(ClientEntry {
            path: RelativePath::parse(&f.path)?,
            size: f.size,
            content_hash: f.content_hash.clone(),
            modified_at: f.modified_at,
        });
    }
    let server_revisions = db::list_current_paths(conn, service)?;
    let tombstone_as_absent = db::get_setting(conn, "tombstone_as_absent")?.as_deref() != Some("false");
    let policy = if tombstone_as_absent {
        TombstonePolicy::TreatAsAbsent
    } else {
        TombstonePolicy::DeleteOnClient
    };

    let plan = reconcile::plan(&entries, &server_revisions, policy);
    let mut to_push = Vec::new();
    let mut to_pull = Vec::new();
    let mut to_delete = Vec::new();
    for entry in plan {
        match entry.action {
            ReconcileAction::Push => to_push.push(entry.path.as_str().to_string()),
            ReconcileAction::Pull => to_pull.push(entry.path.as_str().to_string()),
            ReconcileAction::DeleteLocal => to_delete.push(entry.path.as_str().to_string()),
            ReconcileAction::NoOp => {}
        }
    }
    Ok((to_push, to_pull, to_delete))
}

#[derive(Deserialize)]
pub struct EndRequest {
    pub lock_token: String,
}

/// POST /v1/:service/transactions/:transaction_id/commit
pub async fn commit(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((_service, transaction_id)): Path<(String, String)>,
    Json(req): Json<EndRequest>,
) -> Result<Response> {
    let mut conn = state.db.lock().unwrap();
    let result = state.transactions.commit(&mut conn, &transaction_id, &auth.username);

    let (committed, service) = match result {
        Ok(paths) => {
            let record = db::get_operation_record(&conn, &transaction_id)?;
            let service = record.map(|r| r.service).unwrap_or(Service::Contemporary);
            (paths, service)
        }
        Err(e) => {
            state.locks.release(&req.lock_token);
            return Err(e);
        }
    };

    let keep = db::get_setting_u64(&conn, "retained_revisions", 10).unwrap_or(10);
    for path in &committed {
        if let Err(e) = crate::retention::prune_excess(&conn, &state.store, service, path.as_str(), keep) {
            tracing::warn!(path = %path, error = %e, "failed to prune excess revisions after commit");
        }
    }
    drop(conn);

    state.locks.release(&req.lock_token);
    Ok(axum::Json(serde_json::json!({ "committed": committed.iter().map(|p| p.as_str()).collect::<Vec<_>>() })).into_response())
}

/// POST /v1/:service/transactions/:transaction_id/rollback
pub async fn rollback(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((_service, transaction_id)): Path<(String, String)>,
    Json(req): Json<EndRequest>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    let result = state.transactions.rollback(&conn, &transaction_id, &auth.username);
    drop(conn);

    state.locks.release(&req.lock_token);
    state.metrics.record_rollback();
    result?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

/// GET /v1/:service/transactions/:transaction_id/status
///
/// Lets a client poll a transaction it is holding the lock for — in
/// particular, to notice an admin cancellation (`409
/// transaction_cancelled_by_admin`) rather than discovering it only when
/// commit fails.
pub async fn status(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((_service, transaction_id)): Path<(String, String)>,
) -> Result<Response> {
    state.transactions.status(&transaction_id, &auth.username)?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}
