// src/server/handlers/auth.rs
//! Login endpoints: bearer JWTs for the sync protocol surface, and
//! cookie sessions for the admin control plane.

use crate::auth::permissions::Permission;
use crate::auth::session::SESSION_COOKIE_NAME;
use crate::auth::{hash_password, issue_token, verify_password};
use crate::db;
use crate::error::{Error, Result};
use crate::server::handlers::extract::AdminUser;
use crate::server::ServerState;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in_hours: u64,
}

fn authenticate(conn: &rusqlite::Connection, username: &str, password: &str) -> Result<db::User> {
    let user = db::get_user_by_username(conn, username)?.ok_or(Error::Unauthenticated)?;
    if user.disabled {
        return Err(Error::Unauthenticated);
    }
    if !verify_password(password, &user.password_hash)? {
        return Err(Error::Unauthenticated);
    }
    Ok(user)
}

/// POST /v1/auth/login
pub async fn login(State(state): State<Arc<ServerState>>, Json(req): Json<LoginRequest>) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    let user = authenticate(&conn, &req.username, &req.password)?;
    let expiration_hours = db::get_setting_u64(&conn, "jwt_expiration_hours", 12)?;
    drop(conn);

    let secret = state.config.jwt_secret_bytes()?;
    let token = issue_token(&secret, &user.username, &user.permissions, expiration_hours)?;
    Ok(Json(TokenResponse {
        token,
        expires_in_hours: expiration_hours,
    })
    .into_response())
}

/// POST /v1/admin/login
pub async fn admin_login(State(state): State<Arc<ServerState>>, Json(req): Json<LoginRequest>) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    let user = authenticate(&conn, &req.username, &req.password)?;
    drop(conn);

    if !user.permissions.has(Permission::Admin) {
        return Err(Error::PermissionDenied("admin"));
    }

    let token = state.sessions.create(&user.username);
    let cookie = format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict");
    Ok((
        [(SET_COOKIE, cookie)],
        Json(serde_json::json!({ "username": user.username })),
    )
        .into_response())
}

/// POST /v1/admin/logout
pub async fn admin_logout(State(state): State<Arc<ServerState>>, admin: AdminUser) -> Response {
    state.sessions.revoke(&admin.session_token);
    let cleared = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; Max-Age=0");
    ([(SET_COOKIE, cleared)], axum::http::StatusCode::NO_CONTENT).into_response()
}

/// POST /v1/auth/change-password — self-service, any authenticated user.
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<Arc<ServerState>>,
    auth: crate::server::handlers::extract::AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    authenticate(&conn, &auth.username, &req.current_password)?;
    let new_hash = hash_password(&req.new_password)?;
    db::set_user_password(&conn, &auth.username, &new_hash)?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}
