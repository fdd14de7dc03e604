//! Streaming Gateway Module
//!
//! HTTP surface over the engine: an SSE event stream per run and a
//! side-channel endpoint that writes input into a running program.

pub mod handlers;
pub mod routes;

use log::{error, info};
use std::sync::Arc;

use crate::config::RunnerConfig;
use crate::engine::ExecutionEngine;
use crate::session::SessionManager;

pub use routes::{create_router, AppState};

/// Bind the gateway and serve until Ctrl-C
pub async fn serve(config: RunnerConfig) -> anyhow::Result<()> {
    let sessions = Arc::new(SessionManager::with_limits(
        config.sessions.max_sessions,
        std::time::Duration::from_secs(config.sessions.finished_retention_secs),
    ));
    let bind = config.server.bind.clone();
    let engine = ExecutionEngine::new(Arc::new(config), sessions.clone());
    let app = create_router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Code runner listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            sessions.shutdown_all();
        })
        .await?;

    info!("Code runner stopped");
    Ok(())
}
