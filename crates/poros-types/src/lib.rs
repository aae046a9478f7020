//! Shared types for the Poros agent registry and orchestrator.
//!
//! This crate provides the foundational types used across all Poros crates:
//! the `AgentCard` document model, the `RegisteredAgent` directory record,
//! normalized dispatch outcomes, the ranking-strategy selector, and the
//! orchestration audit-log record.
//!
//! No crate in the workspace depends on anything *except* `poros-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

mod agent;
mod api;
mod card;

pub use agent::{AgentMetrics, RegisteredAgent};
pub use api::{OrchestrateRequest, OrchestrateResponse, SelectedAgent};
pub use card::{AgentCard, Capability, CardError, Pricing, Skill};

/// Ranking strategy selector for the orchestrator.
///
/// Parsed case-insensitively from the wire (`"hybrid"`, `"performance"`,
/// `"semantic"`, `"revenue"`); `Hybrid` is the default when a request does
/// not name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankStrategy {
    /// Rank on rolling success rate, latency, and call volume.
    Performance,
    /// Rank on textual relevance of the query to the agent document.
    Semantic,
    /// Rank on pricing tier weighted by success rate.
    Revenue,
    /// Weighted blend of skill match, performance, semantic fit, revenue,
    /// and freshness.
    #[default]
    Hybrid,
}

/// Error returned when a request names a ranking strategy that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ranking strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for RankStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "performance" => Ok(Self::Performance),
            "semantic" => Ok(Self::Semantic),
            "revenue" => Ok(Self::Revenue),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for RankStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Performance => "performance",
            Self::Semantic => "semantic",
            Self::Revenue => "revenue",
            Self::Hybrid => "hybrid",
        };
        f.write_str(label)
    }
}

/// Outcome class of a single dispatched agent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// The agent answered with 2xx and a JSON body.
    Success,
    /// The call failed: connection error, timeout, non-2xx, or a body that
    /// was not JSON.
    Error,
}

impl CallStatus {
    /// `true` for [`CallStatus::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Normalized result of one agent call inside an orchestration.
///
/// Exactly one of `result` / `error` is populated, matching `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCallResult {
    /// Directory id of the agent that was called.
    #[serde(rename = "agentId")]
    pub agent_id: String,
    /// Display name of the agent at dispatch time.
    #[serde(rename = "agentName")]
    pub agent_name: String,
    /// Success or error.
    pub status: CallStatus,
    /// Wall time of the call in milliseconds (0 when the call never
    /// produced a measurable response).
    #[serde(rename = "latencyMs")]
    pub latency_ms: f64,
    /// The agent's JSON response body, passed through unmodified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentCallResult {
    /// Builds a success outcome.
    pub fn success(agent_id: &str, agent_name: &str, latency_ms: f64, result: Value) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            status: CallStatus::Success,
            latency_ms,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error outcome.
    pub fn error(agent_id: &str, agent_name: &str, latency_ms: f64, error: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            status: CallStatus::Error,
            latency_ms,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// One append-only orchestration audit record.
///
/// Written after every orchestration, successful or not; used purely for
/// audit and analytics, never read back by the pipeline itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationLog {
    /// Monotonic record id assigned by the store.
    pub id: i64,
    /// The client query as submitted (free text plus any skill tags).
    pub query: Value,
    /// Comma-joined skill filter, if one was applied.
    #[serde(rename = "skillFilter")]
    pub skill_filter: Option<String>,
    /// Ids of the agents selected for dispatch, in dispatch order.
    #[serde(rename = "selectedAgentIds")]
    pub selected_agent_ids: Vec<String>,
    /// Normalized per-agent outcomes.
    pub results: Vec<AgentCallResult>,
    /// `true` only when every dispatched agent succeeded.
    pub success: bool,
    /// Total pipeline wall time in milliseconds.
    #[serde(rename = "latencyMs")]
    pub latency_ms: f64,
    /// RFC3339 creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: String,
}
