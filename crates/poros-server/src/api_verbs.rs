//! Verb relay handlers: discover, query, propose, commit, cancel.
//!
//! These endpoints let external callers work the directory through the
//! interop verbs. Apart from `discover`, every verb resolves an agent by
//! DID and relays the request to the matching endpoint on the agent's
//! registered URL; the agent's JSON answer passes through unmodified.

use crate::api::ApiError;
use crate::AppState;
use axum::extract::{Extension, Json};
use poros_db::agents;
use poros_orchestrator::{query_url, verb_url};
use poros_types::RegisteredAgent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// DID prefix that discovery fabricates for agents registered without a
/// signed card. Relays resolve it back to the directory id.
const LEGACY_DID_PREFIX: &str = "did:poros:legacy:";

/// Request body for the discover verb.
#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    /// Capability to search for: a skill tag, a capability name, or a
    /// skill id.
    pub capability: String,
    /// Optional narrowing filters.
    #[serde(default)]
    pub filters: Option<DiscoverFilters>,
}

/// Narrowing filters for discovery.
#[derive(Debug, Deserialize)]
pub struct DiscoverFilters {
    /// Keep only agents whose advertised price is at most this.
    #[serde(rename = "maxPrice")]
    pub max_price: Option<f64>,
    /// Keep only agents whose metadata location contains this
    /// (case-insensitive).
    pub location: Option<String>,
}

/// One discovered agent.
#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoveredAgent {
    /// The agent's DID, or a fabricated legacy DID for unsigned agents.
    pub did: String,
    /// Directory id.
    #[serde(rename = "agentId")]
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Rolling success rate, reported as reputation.
    #[serde(rename = "reputationScore")]
    pub reputation_score: f64,
    /// Pricing terms from the card; a free tier when the card has none.
    pub pricing: Value,
}

/// Response body for the discover verb.
#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub agents: Vec<DiscoveredAgent>,
}

/// Request body for the query verb.
#[derive(Debug, Deserialize)]
pub struct QueryVerbRequest {
    /// DID of the agent to query.
    #[serde(rename = "agentDid")]
    pub agent_did: String,
    /// Query payload, forwarded to the agent verbatim.
    pub query: Value,
}

/// Response body for the query verb.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryVerbResponse {
    /// DID the query was addressed to.
    #[serde(rename = "agentDid")]
    pub agent_did: String,
    /// The agent's JSON answer, unmodified.
    pub response: Value,
    /// Signature lifted from the answer, when the agent signs responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Request body for the propose verb.
#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    #[serde(rename = "agentDid")]
    pub agent_did: String,
    /// Proposal payload, forwarded to the agent verbatim.
    pub proposal: Value,
}

/// Request body for the commit verb.
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    #[serde(rename = "agentDid")]
    pub agent_did: String,
    /// Id of the accepted proposal being finalized.
    #[serde(rename = "proposalId")]
    pub proposal_id: String,
    /// Proof-of-payment token, relayed untouched.
    #[serde(rename = "paymentProof")]
    pub payment_proof: Option<String>,
}

/// Request body for the cancel verb.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(rename = "agentDid")]
    pub agent_did: String,
    /// Id of the commitment being cancelled.
    #[serde(rename = "commitmentId")]
    pub commitment_id: String,
    /// Caller-supplied cancellation reason.
    pub reason: Option<String>,
    /// Whether the caller asks for a refund.
    #[serde(rename = "refundRequested", default)]
    pub refund_requested: bool,
}

/// `true` when the capability appears in the flattened skill tags, as a
/// capability name, or as a skill id on the stored card.
fn matches_capability(agent: &RegisteredAgent, capability: &str) -> bool {
    if agent.skills_tags.iter().any(|tag| tag == capability) {
        return true;
    }
    let as_capability_name = agent
        .card
        .get("capabilities")
        .and_then(Value::as_array)
        .is_some_and(|caps| {
            caps.iter()
                .any(|c| c.get("name").and_then(Value::as_str) == Some(capability))
        });
    if as_capability_name {
        return true;
    }
    agent
        .card
        .get("skills")
        .and_then(Value::as_array)
        .is_some_and(|skills| {
            skills
                .iter()
                .any(|s| s.get("id").and_then(Value::as_str) == Some(capability))
        })
}

fn passes_filters(agent: &RegisteredAgent, filters: Option<&DiscoverFilters>) -> bool {
    let Some(filters) = filters else { return true };

    if let Some(max_price) = filters.max_price {
        let amount = agent
            .card
            .get("pricing")
            .and_then(|p| p.get("amount"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if amount > max_price {
            return false;
        }
    }

    if let Some(ref location) = filters.location {
        let agent_location = agent
            .card
            .get("metadata")
            .and_then(|m| m.get("location"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if !agent_location
            .to_lowercase()
            .contains(&location.to_lowercase())
        {
            return false;
        }
    }

    true
}

fn describe(agent: &RegisteredAgent) -> DiscoveredAgent {
    DiscoveredAgent {
        did: agent
            .did
            .clone()
            .unwrap_or_else(|| format!("{LEGACY_DID_PREFIX}{}", agent.agent_id)),
        agent_id: agent.agent_id.clone(),
        name: agent.name.clone(),
        reputation_score: agent.success_rate,
        pricing: agent
            .card
            .get("pricing")
            .cloned()
            .unwrap_or_else(|| json!({"model": "free", "amount": 0})),
    }
}

/// Resolves a DID to an active directory record.
///
/// Legacy DIDs are resolved by directory id; everything else by the `did`
/// column. Unknown DIDs are a 404, inactive agents a 400.
async fn resolve_agent(state: Arc<AppState>, did: String) -> Result<RegisteredAgent, ApiError> {
    let lookup = did.clone();
    let agent = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        let found = if let Some(agent_id) = lookup.strip_prefix(LEGACY_DID_PREFIX) {
            agents::get_agent(&conn, agent_id)?
        } else {
            agents::get_agent_by_did(&conn, &lookup)?
        };
        Ok::<_, ApiError>(found)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    let agent = agent.ok_or_else(|| ApiError::NotFound(format!("Agent with DID {did} not found")))?;
    if !agent.is_active {
        return Err(ApiError::BadRequest("Agent is not active".to_string()));
    }
    Ok(agent)
}

fn relay_failure(e: reqwest::Error) -> ApiError {
    ApiError::BadGateway(format!("Failed to communicate with agent: {e}"))
}

/// POSTs `body` to the agent endpoint and returns the JSON answer.
///
/// Transport errors, timeouts, non-2xx statuses, and non-JSON bodies all
/// come back as a 502, keeping relay failures distinguishable from error
/// payloads the agent itself produced.
async fn relay(state: &AppState, url: &str, body: &Value) -> Result<Value, ApiError> {
    let response = state
        .http
        .post(url)
        .json(body)
        .timeout(state.relay_timeout)
        .send()
        .await
        .map_err(relay_failure)?
        .error_for_status()
        .map_err(relay_failure)?;

    response.json::<Value>().await.map_err(relay_failure)
}

/// Handler for `POST /orchestrate/discover`.
pub async fn discover_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    let candidates = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        Ok::<_, ApiError>(agents::list_active(&conn, &[])?)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    let agents: Vec<DiscoveredAgent> = candidates
        .iter()
        .filter(|agent| matches_capability(agent, &request.capability))
        .filter(|agent| passes_filters(agent, request.filters.as_ref()))
        .map(describe)
        .collect();

    tracing::debug!(
        capability = %request.capability,
        matches = agents.len(),
        "Capability discovery"
    );
    Ok(Json(DiscoverResponse { agents }))
}

/// Handler for `POST /orchestrate/query`.
pub async fn query_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<QueryVerbRequest>,
) -> Result<Json<QueryVerbResponse>, ApiError> {
    let agent = resolve_agent(state.clone(), request.agent_did.clone()).await?;
    let url = query_url(&agent.url);
    let body = relay(&state, &url, &request.query).await?;

    let signature = body
        .get("signature")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Json(QueryVerbResponse {
        agent_did: request.agent_did,
        response: body,
        signature,
    }))
}

/// Handler for `POST /orchestrate/propose`.
pub async fn propose_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ProposeRequest>,
) -> Result<Json<Value>, ApiError> {
    let agent = resolve_agent(state.clone(), request.agent_did).await?;
    let url = verb_url(&agent.url, "propose");
    let body = relay(&state, &url, &request.proposal).await?;
    Ok(Json(body))
}

/// Handler for `POST /orchestrate/commit`.
pub async fn commit_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CommitRequest>,
) -> Result<Json<Value>, ApiError> {
    let agent = resolve_agent(state.clone(), request.agent_did).await?;
    let url = verb_url(&agent.url, "commit");
    let forward = json!({
        "proposalId": request.proposal_id,
        "paymentProof": request.payment_proof,
    });
    let body = relay(&state, &url, &forward).await?;
    Ok(Json(body))
}

/// Handler for `POST /orchestrate/cancel`.
pub async fn cancel_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>, ApiError> {
    let agent = resolve_agent(state.clone(), request.agent_did).await?;
    let url = verb_url(&agent.url, "cancel");
    let forward = json!({
        "commitmentId": request.commitment_id,
        "reason": request.reason,
        "refundRequested": request.refund_requested,
    });
    let body = relay(&state, &url, &forward).await?;
    Ok(Json(body))
}
