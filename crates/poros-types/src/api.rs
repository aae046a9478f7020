//! Wire types for the orchestration API, shared by the server and the
//! client SDK.

use crate::{AgentCallResult, RankStrategy, RegisteredAgent};
use serde::{Deserialize, Serialize};

/// A client request to orchestrate a query across registered agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrateRequest {
    /// Free-text query forwarded verbatim to every selected agent.
    pub query: String,
    /// Restrict discovery to agents advertising at least one of these tags.
    #[serde(rename = "skillTags", default, skip_serializing_if = "Vec::is_empty")]
    pub skill_tags: Vec<String>,
    /// Agents to place at the front of the selection, in the order given.
    #[serde(rename = "preferAgentIds", default, skip_serializing_if = "Vec::is_empty")]
    pub prefer_agent_ids: Vec<String>,
    /// How many agents to dispatch to; the server applies its default and
    /// upper bound when absent or out of range.
    #[serde(rename = "maxAgents", skip_serializing_if = "Option::is_none")]
    pub max_agents: Option<usize>,
    /// Ranking strategy; hybrid when omitted.
    #[serde(default)]
    pub strategy: RankStrategy,
    /// Session handle for sticky agent selection across requests.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl OrchestrateRequest {
    /// A request carrying only the query, every other knob at its default.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            skill_tags: Vec::new(),
            prefer_agent_ids: Vec::new(),
            max_agents: None,
            strategy: RankStrategy::default(),
            session_id: None,
        }
    }
}

/// The orchestrator's public view of one selected agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAgent {
    /// Directory id.
    #[serde(rename = "agentId")]
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Registered base URL.
    pub url: String,
    /// Skill names from the agent's card.
    #[serde(default)]
    pub skills: Vec<String>,
}

impl From<&RegisteredAgent> for SelectedAgent {
    fn from(agent: &RegisteredAgent) -> Self {
        Self {
            agent_id: agent.agent_id.clone(),
            name: agent.name.clone(),
            url: agent.url.clone(),
            skills: agent.skill_names(),
        }
    }
}

/// The aggregated outcome of one orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrateResponse {
    /// The query as submitted.
    pub query: String,
    /// Agents the query was dispatched to, in dispatch order.
    #[serde(rename = "selectedAgents")]
    pub selected_agents: Vec<SelectedAgent>,
    /// Per-agent outcomes, index-aligned with `selectedAgents`.
    pub results: Vec<AgentCallResult>,
    /// Human-readable aggregation of the successful results.
    pub summary: String,
    /// Total pipeline wall time in milliseconds.
    #[serde(rename = "latencyMs")]
    pub latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults_fill_in() {
        let req: OrchestrateRequest =
            serde_json::from_value(json!({"query": "book a hotel"})).unwrap();
        assert_eq!(req.query, "book a hotel");
        assert!(req.skill_tags.is_empty());
        assert!(req.prefer_agent_ids.is_empty());
        assert_eq!(req.max_agents, None);
        assert_eq!(req.strategy, RankStrategy::Hybrid);
        assert_eq!(req.session_id, None);
    }

    #[test]
    fn request_round_trips_camel_case() {
        let req: OrchestrateRequest = serde_json::from_value(json!({
            "query": "weather in paris",
            "skillTags": ["weather"],
            "preferAgentIds": ["weather-1"],
            "maxAgents": 2,
            "strategy": "performance",
            "sessionId": "s-9"
        }))
        .unwrap();
        assert_eq!(req.skill_tags, vec!["weather"]);
        assert_eq!(req.prefer_agent_ids, vec!["weather-1"]);
        assert_eq!(req.max_agents, Some(2));
        assert_eq!(req.strategy, RankStrategy::Performance);
        assert_eq!(req.session_id.as_deref(), Some("s-9"));

        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["skillTags"][0], "weather");
        assert_eq!(v["maxAgents"], 2);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let res: Result<OrchestrateRequest, _> =
            serde_json::from_value(json!({"query": "q", "strategy": "wealth"}));
        assert!(res.is_err());
    }
}
