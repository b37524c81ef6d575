// src/server/routes.rs
//! Axum router configuration for the revkeep server.

use crate::server::handlers::{admin, auth, files, status, transaction};
use crate::server::ServerState;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

/// Rejects requests from banned IPs, rate-limits the rest, and records a
/// failure against the source IP when a login attempt comes back
/// unauthorized — the same token-bucket-plus-ban-list pair the teacher
/// applies ahead of its package-upload endpoints.
async fn guard_login(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let ip = addr.ip().to_string();
    if state.ban_list.is_banned(&ip).await {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    if !state.rate_limiter.check(&ip).await {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    let response = next.run(request).await;
    if response.status() == StatusCode::UNAUTHORIZED {
        state.ban_list.record_failure(&ip).await;
    }
    response
}

/// Build the main application router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(status::health))
        .route("/status/metrics", get(status::metrics))
        .route("/status/lock", get(status::lock_status))
        .route("/status/last_operation", get(status::last_operation))
        // Sync protocol: auth
        .route(
            "/v1/auth/login",
            post(auth::login).route_layer(middleware::from_fn_with_state(state.clone(), guard_login)),
        )
        .route(
            "/v1/admin/login",
            post(auth::admin_login).route_layer(middleware::from_fn_with_state(state.clone(), guard_login)),
        )
        .route("/v1/auth/change-password", post(auth::change_password))
        // Sync protocol: files
        .route("/v1/:service/files", get(files::list_current))
        .route("/v1/:service/files/*path", get(files::pull))
        .route("/v1/:service/revisions/*path", get(files::revisions))
        .route("/v1/:service/download_revision/*path", get(files::download_revision))
        .route("/v1/:service/restore_revision/*path", post(files::restore_revision))
        // Sync protocol: transactions
        .route("/v1/:service/transactions", post(transaction::begin))
        .route("/v1/:service/transactions/:transaction_id/commit", post(transaction::commit))
        .route("/v1/:service/transactions/:transaction_id/rollback", post(transaction::rollback))
        .route("/v1/:service/transactions/:transaction_id/status", get(transaction::status))
        .route(
            "/v1/:service/transactions/:transaction_id/files/*path",
            put(files::stage_write).delete(files::stage_delete),
        )
        // Admin control plane
        .route("/v1/admin/logout", post(auth::admin_logout))
        .route("/v1/admin/users", get(admin::list_users).post(admin::create_user))
        .route("/v1/admin/users/:username/disabled", post(admin::set_user_disabled))
        .route("/v1/admin/users/:username/password", post(admin::reset_password))
        .route("/v1/admin/users/:username/permissions", put(admin::set_user_permissions))
        .route(
            "/v1/admin/:service/ignore-patterns",
            get(admin::list_ignore_patterns).put(admin::replace_ignore_patterns),
        )
        .route("/v1/admin/settings/:key", get(admin::get_setting).put(admin::set_setting))
        .route(
            "/v1/admin/:service/transactions/:transaction_id/cancel",
            post(admin::cancel_transaction),
        )
        .route("/v1/admin/audit-log", get(admin::audit_log))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
