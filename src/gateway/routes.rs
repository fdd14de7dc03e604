//! Gateway Routes

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use crate::engine::ExecutionEngine;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: ExecutionEngine,
}

impl AppState {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self { engine }
    }
}

/// Build the HTTP router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/run", post(handlers::start_run))
        .route("/api/run/input", post(handlers::send_input))
        .route("/api/sessions", get(handlers::list_sessions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
