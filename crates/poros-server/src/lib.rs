//! Poros server library: shared state and the HTTP surface.
//!
//! Routes fall into four groups: the agent registry (`/api/registry`),
//! identity tooling (`/api/identity`), the orchestration pipeline
//! (`/api/orchestrator`), and the interop verb relays (`/orchestrate`).

pub mod api;
pub mod api_identity;
pub mod api_orchestrator;
pub mod api_verbs;
pub mod config;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use middleware::RateLimiter;
use poros_db::DbPool;
use poros_orchestrator::Orchestrator;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// The orchestration pipeline.
    pub orchestrator: Arc<Orchestrator>,
    /// HTTP client used by the verb relays.
    pub http: reqwest::Client,
    /// Isolated timeout for relayed agent calls.
    pub relay_timeout: Duration,
    /// Rate limiter state.
    pub rate_limiter: RateLimiter,
    /// Per-window request limits.
    pub rate_limits: config::RateLimitConfig,
}

/// Maximum request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/registry/agents",
            post(api::register_agent_handler).get(api::list_agents_handler),
        )
        .route(
            "/api/registry/agents/{agentId}",
            get(api::get_agent_handler).delete(api::delete_agent_handler),
        )
        .route(
            "/api/identity/generate-did",
            post(api_identity::generate_did_handler),
        )
        .route(
            "/api/identity/sign-agent-card",
            post(api_identity::sign_agent_card_handler),
        )
        .route(
            "/api/identity/verify-agent-card",
            post(api_identity::verify_agent_card_handler),
        )
        .route(
            "/api/orchestrator/orchestrate",
            post(api_orchestrator::orchestrate_handler),
        )
        .route(
            "/api/orchestrator/logs",
            get(api_orchestrator::get_logs_handler),
        )
        .route("/orchestrate/discover", post(api_verbs::discover_handler))
        .route("/orchestrate/query", post(api_verbs::query_handler))
        .route("/orchestrate/propose", post(api_verbs::propose_handler))
        .route("/orchestrate/commit", post(api_verbs::commit_handler))
        .route("/orchestrate/cancel", post(api_verbs::cancel_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(axum::middleware::from_fn(middleware::rate_limit_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
