// src/server/handlers/files.rs
//! The sync protocol's file surface: pull (download) and push (upload,
//! staged within a transaction the client already holds).

use crate::auth::Permission;
use crate::db;
use crate::error::{Error, Result};
use crate::model::{RelativePath, Service};
use crate::restore;
use crate::server::handlers::extract::AuthUser;
use crate::server::ServerState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn require(user: &AuthUser, permission: Permission) -> Result<()> {
    if !user.permissions.has(permission) {
        return Err(Error::PermissionDenied(permission.as_str()));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct PullQuery {
    /// Specific revision to fetch; defaults to the current one.
    pub revision: Option<u64>,
}

/// GET /v1/:service/files/*path
pub async fn pull(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((service, path)): Path<(String, String)>,
    Query(query): Query<PullQuery>,
) -> Result<Response> {
    require(&auth, Permission::CanPull)?;
    let service = Service::parse(&service)?;
    let rel = RelativePath::parse(&path)?;

    let conn = state.db.lock().unwrap();
    let revision = match query.revision {
        Some(n) => db::get_revision(&conn, service, rel.as_str(), n)?,
        None => db::current_revision(&conn, service, rel.as_str())?,
    }
    .ok_or_else(|| Error::NotFound(format!("{service}/{rel}")))?;
    drop(conn);

    if revision.tombstone {
        return Err(Error::NotFound(format!("{service}/{rel} has been deleted")));
    }

    let file = state.store.read_revision(service, &rel, revision.revision_number)?;
    let stream = tokio_util::io::ReaderStream::new(tokio::fs::File::from_std(file));
    state.metrics.record_download(revision.size.unwrap_or(0));

    let content_hash = revision.content_hash.clone().unwrap_or_default();
    Ok((
        [
            ("X-Revkeep-Revision", revision.revision_number.to_string()),
            ("X-Revkeep-Content-Hash", content_hash),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// GET /v1/:service/files — current-revision listing, for a client's
/// initial reconcile scan.
pub async fn list_current(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path(service): Path<String>,
) -> Result<Response> {
    require(&auth, Permission::CanViewFiles)?;
    let service = Service::parse(&service)?;
    let conn = state.db.lock().unwrap();
    let revisions = db::list_current_paths(&conn, service)?;
    Ok(axum::Json(revisions.into_iter().map(ListedEntry::from).collect::<Vec<_>>()).into_response())
}

#[derive(serde::Serialize)]
struct ListedEntry {
    path: String,
    revision: u64,
    content_hash: Option<String>,
    size: Option<u64>,
    tombstone: bool,
}

impl From<db::Revision> for ListedEntry {
    fn from(r: db::Revision) -> Self {
        Self {
            path: r.path,
            revision: r.revision_number,
            content_hash: r.content_hash,
            size: r.size,
            tombstone: r.tombstone,
        }
    }
}

/// PUT /v1/:service/transactions/:transaction_id/files/*path — stage a
/// write within an already-begun transaction. The body is the file's
/// entire contents.
pub async fn stage_write(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((service, transaction_id, path)): Path<(String, String, String)>,
    body: Body,
) -> Result<Response> {
    require(&auth, Permission::CanPush)?;
    let _service = Service::parse(&service)?;
    let rel = RelativePath::parse(&path)?;

    let bytes = axum::body::to_bytes(body, 512 * 1024 * 1024)
        .await
        .map_err(|e| Error::Validation(format!("failed to read request body: {e}")))?;
    let size = bytes.len() as u64;
    let cursor = std::io::Cursor::new(bytes);
    let (written, content_hash) = state.transactions.stage_write(&transaction_id, &rel, cursor)?;
    state.metrics.record_upload(size);

    Ok(axum::Json(serde_json::json!({
        "path": rel.as_str(),
        "size": written,
        "content_hash": content_hash,
    }))
    .into_response())
}

/// DELETE /v1/:service/transactions/:transaction_id/files/*path — stage a
/// tombstone within an already-begun transaction.
pub async fn stage_delete(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((service, transaction_id, path)): Path<(String, String, String)>,
) -> Result<Response> {
    require(&auth, Permission::CanPush)?;
    let _service = Service::parse(&service)?;
    let rel = RelativePath::parse(&path)?;
    state.transactions.stage_delete(&transaction_id, &rel)?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

#[derive(Serialize)]
struct RevisionEntry {
    revision: u64,
    content_hash: Option<String>,
    size: Option<u64>,
    tombstone: bool,
    created_at: String,
    created_by: String,
}

impl From<db::Revision> for RevisionEntry {
    fn from(r: db::Revision) -> Self {
        Self {
            revision: r.revision_number,
            content_hash: r.content_hash,
            size: r.size,
            tombstone: r.tombstone,
            created_at: r.created_at.to_rfc3339(),
            created_by: r.created_by,
        }
    }
}

/// GET /v1/:service/files/revisions/*path — every retained revision of a
/// path, most recent first.
pub async fn revisions(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((service, path)): Path<(String, String)>,
) -> Result<Response> {
    require(&auth, Permission::CanViewFiles)?;
    let service = Service::parse(&service)?;
    let rel = RelativePath::parse(&path)?;
    let conn = state.db.lock().unwrap();
    let revisions = db::list_revisions(&conn, service, rel.as_str())?;
    Ok(axum::Json(revisions.into_iter().map(RevisionEntry::from).collect::<Vec<_>>()).into_response())
}

#[derive(Deserialize)]
pub struct DownloadRevisionQuery {
    pub revision: u64,
}

/// GET /v1/:service/files/download_revision/*path?revision=N — download a
/// specific, possibly non-current, revision. Distinct from `pull`'s
/// optional `?revision=` so that fetching history always names a
/// revision explicitly rather than silently falling back to current.
pub async fn download_revision(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((service, path)): Path<(String, String)>,
    Query(query): Query<DownloadRevisionQuery>,
) -> Result<Response> {
    require(&auth, Permission::CanPull)?;
    let service = Service::parse(&service)?;
    let rel = RelativePath::parse(&path)?;

    let conn = state.db.lock().unwrap();
    let revision = db::get_revision(&conn, service, rel.as_str(), query.revision)?
        .ok_or_else(|| Error::NotFound(format!("{service}/{rel}#{}", query.revision)))?;
    drop(conn);

    if revision.tombstone {
        return Err(Error::NotFound(format!("{service}/{rel}#{} has been deleted", query.revision)));
    }

    let file = state.store.read_revision(service, &rel, revision.revision_number)?;
    let stream = tokio_util::io::ReaderStream::new(tokio::fs::File::from_std(file));
    state.metrics.record_download(revision.size.unwrap_or(0));

    let content_hash = revision.content_hash.clone().unwrap_or_default();
    Ok((
        [
            ("X-Revkeep-Revision", revision.revision_number.to_string()),
            ("X-Revkeep-Content-Hash", content_hash),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct RestoreRevisionRequest {
    pub revision: u64,
}

/// POST /v1/:service/files/restore_revision/*path — make an older
/// revision current again. Runs outside the transaction system: no lock
/// is held, since it is a single metadata write plus at most one blob
/// copy rather than a batch of client-staged changes.
pub async fn restore_revision(
    State(state): State<Arc<ServerState>>,
    auth: AuthUser,
    Path((service, path)): Path<(String, String)>,
    axum::Json(req): axum::Json<RestoreRevisionRequest>,
) -> Result<Response> {
    require(&auth, Permission::CanPush)?;
    let service = Service::parse(&service)?;
    let rel = RelativePath::parse(&path)?;

    let conn = state.db.lock().unwrap();
    let outcome = restore::restore_revision(&conn, &state.store, service, &rel, req.revision, &auth.username)?;

    Ok(axum::Json(serde_json::json!({
        "archived_revision": outcome.archived_revision,
        "restored_revision": outcome.restored_revision.revision_number,
        "content_hash": outcome.restored_revision.content_hash,
        "size": outcome.restored_revision.size,
    }))
    .into_response())
}
