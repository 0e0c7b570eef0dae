//! Run observability API handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use agentdbg_core::{Event, RunMeta, FORMAT_VERSION};
use agentdbg_store::StoreError;

use crate::error::AppError;
use crate::ServerState;

/// Query parameters for listing runs.
#[derive(Debug, Deserialize, Default)]
pub struct ListRunsQuery {
    pub limit: Option<usize>,
}

/// Response for listing runs.
#[derive(Serialize)]
pub struct RunsListResponse {
    pub version: u32,
    pub runs: Vec<RunMeta>,
}

/// Response for a run's events.
#[derive(Serialize)]
pub struct RunEventsResponse {
    pub version: u32,
    pub run_id: String,
    pub events: Vec<Event>,
}

/// GET /api/runs - List recent runs, newest first.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ListRunsQuery>,
) -> Result<Json<RunsListResponse>, AppError> {
    let limit = params.limit.unwrap_or(50);
    let runs = state.store.list_runs(limit).map_err(|e| {
        tracing::error!("failed to list runs: {}", e);
        AppError::Internal("failed to list runs".into())
    })?;
    Ok(Json(RunsListResponse { version: FORMAT_VERSION, runs }))
}

/// GET /api/runs/{run_id} - Return the run summary.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunMeta>, AppError> {
    let meta = state.store.load_run(&run_id).map_err(map_store_error)?;
    Ok(Json(meta))
}

/// GET /api/runs/{run_id}/events - Return the run's events in order.
pub async fn events(
    State(state): State<Arc<ServerState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunEventsResponse>, AppError> {
    state.store.load_run(&run_id).map_err(map_store_error)?;
    let events = state.store.load_events(&run_id).map_err(map_store_error)?;
    Ok(Json(RunEventsResponse { version: FORMAT_VERSION, run_id, events }))
}

fn map_store_error(e: StoreError) -> AppError {
    match e {
        StoreError::InvalidRunId { .. } => AppError::BadRequest("invalid run id".into()),
        StoreError::RunNotFound { .. } => AppError::NotFound("run not found".into()),
        other => {
            tracing::error!("run store error: {}", other);
            AppError::Internal("run store error".into())
        }
    }
}
