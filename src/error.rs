// src/error.rs

//! Crate-wide error type.
//!
//! Every fallible operation in revkeep returns this `Error` (via the
//! `Result` alias below). The HTTP edge (`server::handlers`) is the single
//! place that translates a variant into a status code and `{"detail": ...}`
//! body — internal code never constructs an HTTP response directly.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("path escapes root: {0:?}")]
    PathTraversal(PathBuf),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed")]
    Unauthenticated,

    #[error("permission denied: missing '{0}'")]
    PermissionDenied(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("lock busy: held by {holder} ({op_type}) for {elapsed_secs}s")]
    LockBusy {
        holder: String,
        op_type: String,
        elapsed_secs: u64,
    },

    #[error("transaction cancelled by admin")]
    TransactionCancelled,

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("content hash or size missing for current revision")]
    MissingContent,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code this error maps to at the edge.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::Validation(_) | Error::InvalidPath { .. } | Error::PathTraversal(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) | Error::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Error::LockBusy { .. } | Error::TransactionCancelled => StatusCode::CONFLICT,
            Error::HashMismatch { .. } => StatusCode::BAD_REQUEST,
            Error::MissingContent => StatusCode::NOT_FOUND,
            Error::Io(_) | Error::Database(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to expose to external clients. Never leaks internals.
    pub fn public_detail(&self) -> String {
        match self {
            Error::Unauthenticated => "invalid credentials".to_string(),
            Error::Io(_) | Error::Database(_) | Error::Internal(_) => {
                "internal server error".to_string()
            }
            Error::TransactionCancelled => "transaction cancelled by admin".to_string(),
            other => other.to_string(),
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status == axum::http::StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error serving request");
        }
        // A cancelled transaction gets a distinguished body so a polling
        // client can recognize it by `error` code rather than parsing
        // `detail` text.
        if matches!(self, Error::TransactionCancelled) {
            return (
                status,
                axum::Json(serde_json::json!({
                    "error": "transaction_cancelled_by_admin",
                    "message": self.public_detail(),
                })),
            )
                .into_response();
        }
        (status, axum::Json(serde_json::json!({ "detail": self.public_detail() }))).into_response()
    }
}
