// src/server/mod.rs
//! revkeep sync server
//!
//! An HTTP server exposing the sync protocol surface (auth, file
//! push/pull, transaction lifecycle) and the admin control plane (users,
//! ignore patterns, settings, transaction cancellation) over one axum
//! router, backed by the metadata index, revision store, lock manager,
//! and transaction manager.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod security;

pub use config::RevkeepConfig;
pub use metrics::ServerMetrics;
pub use routes::create_router;

use crate::auth::SessionStore;
use crate::db::schema::migrate;
use crate::filesystem::RevisionStore;
use crate::lock::LockManager;
use crate::transaction::{recover_incomplete, TransactionManager};
use anyhow::Result;
use rusqlite::Connection;
use security::{BanList, RateLimiter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared server state, held behind an `Arc` and handed to every handler
/// through axum's `State` extractor.
pub struct ServerState {
    pub config: RevkeepConfig,
    pub db: Mutex<Connection>,
    pub db_path: PathBuf,
    pub staging_root: PathBuf,
    pub store: RevisionStore,
    pub locks: LockManager,
    pub transactions: Arc<TransactionManager>,
    pub sessions: Arc<SessionStore>,
    pub metrics: ServerMetrics,
    pub rate_limiter: RateLimiter,
    pub ban_list: BanList,
}

impl ServerState {
    pub fn new(config: RevkeepConfig) -> Result<Self> {
        let db_path = config.db_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrate(&conn)?;

        let contemporary_root = crate::db::paths::contemporary_root(&config.db_path);
        let traditional_root = crate::db::paths::traditional_root(&config.db_path);
        let staging_root = crate::db::paths::staging_dir(&config.db_path);
        std::fs::create_dir_all(&staging_root)?;

        let recovered = recover_incomplete(&conn, &staging_root)?;
        if recovered > 0 {
            tracing::warn!(count = recovered, "recovered incomplete transactions at startup");
        }

        let store = RevisionStore::new(contemporary_root, traditional_root);
        let transactions = Arc::new(TransactionManager::new(staging_root.clone(), store.clone()));

        Ok(Self {
            config,
            db: Mutex::new(conn),
            db_path,
            staging_root,
            store,
            locks: LockManager::new(),
            transactions,
            sessions: Arc::new(SessionStore::new(Duration::from_secs(8 * 3600))),
            metrics: ServerMetrics::new(),
            rate_limiter: RateLimiter::new(50, 100),
            ban_list: BanList::new(300, 10),
        })
    }
}

/// Start the revkeep server.
pub async fn run_server(config: RevkeepConfig) -> Result<()> {
    tracing::info!(bind_addr = %config.bind_addr, db_path = %config.db_path, "starting revkeep server");

    let maintenance_interval = Duration::from_secs(config.maintenance_interval_secs);
    let state = Arc::new(ServerState::new(config)?);
    let app = create_router(state.clone());

    crate::retention::spawn_background_sweep(
        state.db_path.clone(),
        state.staging_root.clone(),
        state.sessions.clone(),
        state.transactions.clone(),
        maintenance_interval,
    );

    let addr = state.config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("revkeep is ready to serve");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
