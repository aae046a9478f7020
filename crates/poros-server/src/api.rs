//! Registry API handlers: agent registration, listing, lookup, removal.

use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use poros_db::agents::{self, AgentFilter, NewAgent};
use poros_db::StoreError;
use poros_identity::verify_card;
use poros_types::{AgentCard, CardError, RegisteredAgent};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad gateway: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateAgent(id) => {
                ApiError::Conflict(format!("Agent ID '{id}' already registered"))
            }
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

/// Request body for agent registration.
#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    /// The AgentCard to publish, as submitted JSON.
    #[serde(rename = "agentCard")]
    pub agent_card: Value,
}

/// Query parameters for agent listing.
#[derive(Debug, Deserialize)]
pub struct ListAgentsParams {
    /// Keep only agents advertising this skill tag.
    #[serde(rename = "skillTag")]
    pub skill_tag: Option<String>,
    /// Case-insensitive needle matched against names and descriptions.
    #[serde(rename = "nameSearch")]
    pub name_search: Option<String>,
    /// Drop inactive agents. Defaults to true.
    #[serde(rename = "activeOnly")]
    pub active_only: Option<bool>,
    /// Maximum records returned (default 50, capped at 100).
    pub limit: Option<usize>,
}

fn card_rejection(e: CardError) -> ApiError {
    match e {
        CardError::MissingField(field) => {
            ApiError::BadRequest(format!("AgentCard missing required field: {field}"))
        }
        other => ApiError::BadRequest(format!("Invalid AgentCard: {other}")),
    }
}

/// Directory id for a card that did not bring its own: a slug of the agent
/// name plus a short random suffix so re-registrations stay distinct.
fn derive_agent_id(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug, &suffix[..8])
}

/// Handler for `POST /api/registry/agents`.
///
/// Validates the submitted card, verifies its signature when the card
/// carries both a `did` and a `signature`, and stores it active with
/// fresh metrics. Returns the stored record.
pub async fn register_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RegisterAgentRequest>,
) -> Result<(StatusCode, Json<RegisteredAgent>), ApiError> {
    let card_value = payload.agent_card;
    let card = AgentCard::from_value(&card_value).map_err(card_rejection)?;

    // A card claiming an identity must prove it.
    if let (Some(did), Some(signature)) = (card.did.as_deref(), card.signature.as_deref()) {
        if !verify_card(&card_value, signature, did) {
            return Err(ApiError::BadRequest(
                "AgentCard signature verification failed".to_string(),
            ));
        }
    }

    let agent_id = card
        .id
        .clone()
        .unwrap_or_else(|| derive_agent_id(&card.name));
    let new_agent = NewAgent {
        agent_id,
        did: card.did.clone(),
        name: card.name.clone(),
        description: card.description.clone(),
        url: card.url.clone(),
        preferred_transport: card.preferred_transport.clone(),
        skills_tags: card.skill_tags(),
        card: card_value,
    };

    let stored = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        Ok::<_, ApiError>(agents::insert_agent(&conn, &new_agent)?)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    tracing::info!(agent_id = %stored.agent_id, name = %stored.name, "Registered agent");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Handler for `GET /api/registry/agents`.
pub async fn list_agents_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListAgentsParams>,
) -> Result<Json<Vec<RegisteredAgent>>, ApiError> {
    let filter = AgentFilter {
        skill_tag: params.skill_tag,
        name_search: params.name_search,
        active_only: params.active_only.unwrap_or(true),
        limit: Some(params.limit.unwrap_or(50).clamp(1, 100)),
    };

    let agents = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        Ok::<_, ApiError>(agents::list_agents(&conn, &filter)?)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    Ok(Json(agents))
}

/// Handler for `GET /api/registry/agents/{agentId}`.
pub async fn get_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<RegisteredAgent>, ApiError> {
    let lookup_id = agent_id.clone();
    let agent = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        Ok::<_, ApiError>(agents::get_agent(&conn, &lookup_id)?)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    agent
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Agent '{agent_id}' not found")))
}

/// Handler for `DELETE /api/registry/agents/{agentId}`.
///
/// Returns `204 No Content` on success.
pub async fn delete_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let delete_id = agent_id.clone();
    let removed = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        Ok::<_, ApiError>(agents::delete_agent(&conn, &delete_id)?)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    if !removed {
        return Err(ApiError::NotFound(format!("Agent '{agent_id}' not found")));
    }

    tracing::info!(agent_id = %agent_id, "Deleted agent");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_slug_the_name_and_stay_distinct() {
        let id = derive_agent_id("Weather Agent 2.0");
        let (slug, suffix) = id.rsplit_once('-').unwrap();
        assert_eq!(slug, "weather-agent-2-0");
        assert_eq!(suffix.len(), 8);

        assert_ne!(derive_agent_id("Echo"), derive_agent_id("Echo"));
    }

    #[test]
    fn missing_field_rejection_names_the_field() {
        let err = card_rejection(CardError::MissingField("url"));
        match err {
            ApiError::BadRequest(msg) => {
                assert_eq!(msg, "AgentCard missing required field: url");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_store_error_becomes_a_conflict() {
        let err: ApiError = StoreError::DuplicateAgent("echo".to_string()).into();
        match err {
            ApiError::Conflict(msg) => assert_eq!(msg, "Agent ID 'echo' already registered"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
