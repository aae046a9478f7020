//! Orchestration API handlers: run the pipeline, read the audit log.

use crate::api::ApiError;
use crate::AppState;
use axum::extract::{Extension, Json, Query};
use poros_db::logs::{self, LogFilter};
use poros_orchestrator::OrchestrateError;
use poros_types::{OrchestrateRequest, OrchestrateResponse, OrchestrationLog};
use serde::Deserialize;
use std::sync::Arc;

/// Handler for `POST /api/orchestrator/orchestrate`.
///
/// Discovers, ranks, and fans the query out; per-agent failures come back
/// inside the response as error outcomes, so the only client-visible
/// errors here are an empty discovery and store failures.
pub async fn orchestrate_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<OrchestrateRequest>,
) -> Result<Json<OrchestrateResponse>, ApiError> {
    let response = state
        .orchestrator
        .orchestrate(request)
        .await
        .map_err(|e| match e {
            OrchestrateError::NoAgentsFound => ApiError::NotFound(e.to_string()),
            other => ApiError::InternalServerError(other.to_string()),
        })?;
    Ok(Json(response))
}

/// Query parameters for reading the orchestration log.
#[derive(Debug, Deserialize)]
pub struct LogsParams {
    /// Maximum records returned (default 50, capped at 200).
    pub limit: Option<i64>,
    /// Keep only fully-successful orchestrations.
    #[serde(rename = "successOnly")]
    pub success_only: Option<bool>,
    /// Keep only records created at or after this RFC3339 timestamp.
    pub since: Option<String>,
}

/// Handler for `GET /api/orchestrator/logs`. Newest first.
pub async fn get_logs_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<LogsParams>,
) -> Result<Json<Vec<OrchestrationLog>>, ApiError> {
    let filter = LogFilter {
        success_only: params.success_only.unwrap_or(false),
        since: params.since,
        limit: Some(params.limit.unwrap_or(50).clamp(1, 200)),
    };

    let records = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        Ok::<_, ApiError>(logs::query_logs(&conn, &filter)?)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    Ok(Json(records))
}
