// src/server/handlers/admin.rs
//! The admin control plane: user management, ignore patterns, settings,
//! transaction cancellation, and the audit log. Every mutating endpoint
//! here records an `admin_audit_log` row.

use crate::auth::permissions::PermissionSet;
use crate::auth::{hash_password, Permission};
use crate::db;
use crate::error::{Error, Result};
use crate::model::Service;
use crate::server::handlers::extract::AdminUser;
use crate::server::ServerState;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Every admin-control-plane endpoint gates on the single `admin`
/// permission — there is no finer-grained split within the control plane
/// itself, unlike the sync protocol surface's independently-grantable set.
fn require_admin(conn: &rusqlite::Connection, admin: &AdminUser) -> Result<()> {
    let user = db::get_user_by_username(conn, &admin.username)?.ok_or(Error::Unauthenticated)?;
    if !user.permissions.has(Permission::Admin) {
        return Err(Error::PermissionDenied("admin"));
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------

#[derive(Serialize)]
pub struct UserView {
    pub username: String,
    pub permissions: Vec<String>,
    pub disabled: bool,
}

impl From<db::User> for UserView {
    fn from(u: db::User) -> Self {
        Self {
            username: u.username,
            permissions: u.permissions.iter().map(|p| p.as_str().to_string()).collect(),
            disabled: u.disabled,
        }
    }
}

/// GET /v1/admin/users
pub async fn list_users(State(state): State<Arc<ServerState>>, admin: AdminUser) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let users = db::list_users(&conn)?;
    Ok(Json(users.into_iter().map(UserView::from).collect::<Vec<_>>()).into_response())
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub permissions: Vec<String>,
}

/// POST /v1/admin/users
pub async fn create_user(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let permissions = PermissionSet::new(
        req.permissions
            .iter()
            .map(|p| Permission::parse(p))
            .collect::<Result<Vec<_>>>()?,
    );
    let hash = hash_password(&req.password)?;
    let user = db::create_user(&conn, &req.username, &hash, &permissions)?;
    db::record_audit_event(&conn, &admin.username, "create_user", Some(&user.username))?;
    Ok(Json(UserView::from(user)).into_response())
}

#[derive(Deserialize)]
pub struct SetPermissionsRequest {
    pub permissions: Vec<String>,
}

/// PUT /v1/admin/users/:username/permissions
pub async fn set_user_permissions(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<SetPermissionsRequest>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let permissions = PermissionSet::new(
        req.permissions
            .iter()
            .map(|p| Permission::parse(p))
            .collect::<Result<Vec<_>>>()?,
    );
    db::set_user_permissions(&conn, &username, &permissions)?;
    db::record_audit_event(&conn, &admin.username, "set_user_permissions", Some(&username))?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

#[derive(Deserialize)]
pub struct SetDisabledRequest {
    pub disabled: bool,
}

/// POST /v1/admin/users/:username/disabled
pub async fn set_user_disabled(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<SetDisabledRequest>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    db::set_user_disabled(&conn, &username, req.disabled)?;
    db::record_audit_event(
        &conn,
        &admin.username,
        if req.disabled { "disable_user" } else { "enable_user" },
        Some(&username),
    )?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

/// POST /v1/admin/users/:username/password
pub async fn reset_password(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let hash = hash_password(&req.new_password)?;
    db::set_user_password(&conn, &username, &hash)?;
    db::record_audit_event(&conn, &admin.username, "reset_password", Some(&username))?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------
// Ignore patterns
// ---------------------------------------------------------------------

/// GET /v1/admin/:service/ignore-patterns
pub async fn list_ignore_patterns(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Path(service): Path<String>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let service = Service::parse(&service)?;
    let patterns = db::list_ignore_patterns(&conn, service)?
        .into_iter()
        .map(|p| p.pattern)
        .collect::<Vec<_>>();
    Ok(Json(patterns).into_response())
}

/// PUT /v1/admin/:service/ignore-patterns
pub async fn replace_ignore_patterns(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Path(service): Path<String>,
    Json(patterns): Json<Vec<String>>,
) -> Result<Response> {
    let mut conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let service = Service::parse(&service)?;
    db::replace_ignore_patterns(&mut conn, service, &patterns)?;
    db::record_audit_event(&conn, &admin.username, "replace_ignore_patterns", Some(service.as_str()))?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------

/// GET /v1/admin/settings/:key
pub async fn get_setting(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Path(key): Path<String>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let value = db::get_setting(&conn, &key)?;
    Ok(Json(serde_json::json!({ "key": key, "value": value })).into_response())
}

#[derive(Deserialize)]
pub struct SetSettingRequest {
    pub value: String,
}

/// PUT /v1/admin/settings/:key
pub async fn set_setting(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Path(key): Path<String>,
    Json(req): Json<SetSettingRequest>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    db::set_setting(&conn, &key, &req.value)?;
    db::record_audit_event(&conn, &admin.username, "set_setting", Some(&key))?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------
// Transaction cancellation
// ---------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
    pub lock_token: String,
}

/// POST /v1/admin/:service/transactions/:transaction_id/cancel
pub async fn cancel_transaction(
    State(state): State<Arc<ServerState>>,
    admin: AdminUser,
    Path((service, transaction_id)): Path<(String, String)>,
    Json(req): Json<CancelRequest>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let _service = Service::parse(&service)?;

    state.transactions.cancel(&conn, &transaction_id, &req.reason)?;
    state.locks.release(&req.lock_token);
    db::record_audit_event(&conn, &admin.username, "cancel_transaction", Some(&transaction_id))?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------

#[derive(Serialize)]
pub struct AuditEntryView {
    pub actor: String,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: String,
}

impl From<db::AuditEntry> for AuditEntryView {
    fn from(e: db::AuditEntry) -> Self {
        Self {
            actor: e.actor,
            action: e.action,
            detail: e.detail,
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

/// GET /v1/admin/audit-log
pub async fn audit_log(State(state): State<Arc<ServerState>>, admin: AdminUser) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    require_admin(&conn, &admin)?;
    let entries = db::list_audit_log(&conn, 200)?;
    Ok(Json(entries.into_iter().map(AuditEntryView::from).collect::<Vec<_>>()).into_response())
}
