// src/server/handlers/status.rs
//! Health check and metrics exposure. Unauthenticated — both are meant to
//! be scraped by infrastructure, not called by sync clients.

use crate::db;
use crate::error::Result;
use crate::server::ServerState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

/// GET /healthz
pub async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

/// GET /status/metrics
pub async fn metrics(State(state): State<Arc<ServerState>>) -> Response {
    Json(state.metrics.snapshot()).into_response()
}

/// GET /status/lock — whether the process-wide lock is currently held,
/// and by whom.
pub async fn lock_status(State(state): State<Arc<ServerState>>) -> Response {
    match state.locks.current() {
        Some(lock) => Json(serde_json::json!({
            "held": true,
            "holder": lock.holder,
            "op_type": lock.op_type,
            "elapsed_seconds": lock.elapsed_secs(),
        }))
        .into_response(),
        None => Json(serde_json::json!({ "held": false })).into_response(),
    }
}

/// GET /status/last_operation — summary of the most recently completed
/// operation, across both services.
pub async fn last_operation(State(state): State<Arc<ServerState>>) -> Result<Response> {
    let conn = state.db.lock().unwrap();
    let summary = db::get_last_operation(&conn)?;
    Ok(Json(summary.map(|s| {
        serde_json::json!({
            "service": s.service.as_str(),
            "op_type": s.op_type,
            "initiator": s.initiator,
            "completed_at": s.completed_at.to_rfc3339(),
            "files_total": s.files_total,
            "files_pulled": s.files_pulled,
            "files_pushed": s.files_pushed,
        })
    }))
    .into_response())
}
