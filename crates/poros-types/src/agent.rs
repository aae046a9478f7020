//! Directory records for registered agents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An agent as stored in the directory.
///
/// Carries the submitted card verbatim plus the derived/denormalized fields
/// the orchestrator works with: flattened skill tags, liveness, and the
/// rolling quality metrics updated after every dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    /// Directory id, unique across the registry.
    #[serde(rename = "agentId")]
    pub agent_id: String,
    /// Owner identity, when the card was signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    /// Display name, copied from the card.
    pub name: String,
    /// Description, copied from the card.
    pub description: String,
    /// Dispatch base URL, copied from the card.
    pub url: String,
    /// Transport hint, copied from the card.
    #[serde(rename = "preferredTransport")]
    pub preferred_transport: String,
    /// Flattened skill tags used for filtering.
    #[serde(rename = "skillsTags")]
    pub skills_tags: Vec<String>,
    /// The submitted card, verbatim.
    #[serde(rename = "agentCard")]
    pub card: Value,
    /// Inactive agents are never discovered or dispatched to.
    #[serde(rename = "isActive")]
    pub is_active: bool,
    /// Number of orchestrated calls ever dispatched to this agent.
    #[serde(rename = "totalCalls")]
    pub total_calls: i64,
    /// Exponential moving average of call success, in [0,1]. New agents
    /// start at 1.0.
    #[serde(rename = "successRate")]
    pub success_rate: f64,
    /// Exponential moving average of call latency in milliseconds. 0 until
    /// the first measured call.
    #[serde(rename = "avgLatencyMs")]
    pub avg_latency_ms: f64,
    /// RFC3339 registration timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: String,
    /// RFC3339 timestamp of the last record update.
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

impl RegisteredAgent {
    /// `true` when the agent advertises at least one of `tags` (exact
    /// match). An empty `tags` slice matches nothing.
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.skills_tags.contains(t))
    }

    /// Service tier label from the stored card, `"free"` when absent.
    pub fn tier(&self) -> &str {
        if let Some(tier) = self
            .card
            .get("metadata")
            .and_then(|m| m.get("tier"))
            .and_then(Value::as_str)
        {
            return tier;
        }
        if let Some(tier) = self
            .card
            .get("pricing")
            .and_then(|p| p.get("tier"))
            .and_then(Value::as_str)
        {
            return tier;
        }
        "free"
    }

    /// Skill names from the stored card, in card order.
    pub fn skill_names(&self) -> Vec<String> {
        self.card
            .get("skills")
            .and_then(Value::as_array)
            .map(|skills| {
                skills
                    .iter()
                    .filter_map(|s| s.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The current rolling metrics as one value.
    pub fn metrics(&self) -> AgentMetrics {
        AgentMetrics {
            total_calls: self.total_calls,
            success_rate: self.success_rate,
            avg_latency_ms: self.avg_latency_ms,
        }
    }
}

/// The rolling quality metrics the directory keeps per agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Total orchestrated calls dispatched to the agent.
    #[serde(rename = "totalCalls")]
    pub total_calls: i64,
    /// Success EMA in [0,1].
    #[serde(rename = "successRate")]
    pub success_rate: f64,
    /// Latency EMA in milliseconds.
    #[serde(rename = "avgLatencyMs")]
    pub avg_latency_ms: f64,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            total_calls: 0,
            success_rate: 1.0,
            avg_latency_ms: 0.0,
        }
    }
}
