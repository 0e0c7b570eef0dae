//! Local viewer HTTP API over the run store.
//!
//! Serves GET /api/runs, GET /api/runs/{run_id}, and
//! GET /api/runs/{run_id}/events for the browser timeline. Local only; no
//! CORS by default and no remote export.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use agentdbg_store::RunStore;

/// Shared server state.
pub struct ServerState {
    pub store: RunStore,
}

/// Builds the application router.
pub fn create_app(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/runs", get(handlers::runs::list))
        .route("/api/runs/{run_id}", get(handlers::runs::get))
        .route("/api/runs/{run_id}/events", get(handlers::runs::events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
