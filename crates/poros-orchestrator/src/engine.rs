//! The orchestration pipeline: discover, rank, select, dispatch,
//! aggregate, log, respond.

use crate::dispatch::call_agent;
use crate::metrics::apply_outcome;
use crate::session::SessionStore;
use futures_util::future::join_all;
use poros_db::logs::NewOrchestrationLog;
use poros_db::{agents, logs, DbPool, StoreError};
use poros_ranking::Ranker;
use poros_types::{
    AgentCallResult, AgentMetrics, OrchestrateRequest, OrchestrateResponse, RegisteredAgent,
    SelectedAgent,
};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Pipeline tunables, filled from the server configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    /// Isolated timeout for each dispatched agent call.
    pub dispatch_timeout: Duration,
    /// Selection size when a request does not carry `maxAgents`.
    pub default_max_agents: usize,
    /// Upper bound on the selection size.
    pub max_agents_cap: usize,
    /// Decay of the rolling metric EMAs, in (0,1).
    pub ema_decay: f64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(30),
            default_max_agents: 3,
            max_agents_cap: 10,
            ema_decay: 0.9,
        }
    }
}

/// Terminal failures of an orchestration request.
///
/// Per-agent dispatch failures are not errors; they surface as `error`
/// outcomes inside the response.
#[derive(Debug, Error)]
pub enum OrchestrateError {
    /// Discovery produced no candidates.
    #[error("No agents found matching criteria")]
    NoAgentsFound,

    /// The directory could not be read.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A blocking database task was cancelled or panicked.
    #[error("directory worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Runs queries across the registered agents.
///
/// Construct one per process and share it; the HTTP client, ranker, and
/// session store are all reused across requests.
pub struct Orchestrator {
    pool: DbPool,
    ranker: Ranker,
    http: reqwest::Client,
    sessions: SessionStore,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        pool: DbPool,
        ranker: Ranker,
        http: reqwest::Client,
        sessions: SessionStore,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            pool,
            ranker,
            http,
            sessions,
            settings,
        }
    }

    /// The session store this orchestrator records successes into.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Runs the full pipeline for one request.
    ///
    /// Discovery failures are terminal. Everything after selection is
    /// best-effort per agent: the response always reports one outcome per
    /// selected agent, and metric or audit-log persistence failures are
    /// logged and swallowed.
    ///
    /// # Errors
    ///
    /// [`OrchestrateError::NoAgentsFound`] when no active agent matches the
    /// requested skill tags; [`OrchestrateError::Store`] when the directory
    /// cannot be read.
    pub async fn orchestrate(
        &self,
        request: OrchestrateRequest,
    ) -> Result<OrchestrateResponse, OrchestrateError> {
        let started = Instant::now();

        let candidates = self.discover(request.skill_tags.clone()).await?;
        debug!(
            candidates = candidates.len(),
            tags = ?request.skill_tags,
            strategy = %request.strategy,
            "Discovered candidate agents"
        );

        let ranked = self
            .ranker
            .rank(&candidates, &request.query, &request.skill_tags, request.strategy);
        let selected = self.select(ranked, &request);

        let results: Vec<AgentCallResult> = join_all(selected.iter().map(|agent| {
            call_agent(&self.http, agent, &request.query, self.settings.dispatch_timeout)
        }))
        .await;

        self.record_metrics(&selected, &results).await;

        let success = results.iter().all(|r| r.status.is_success());
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.append_log(&request, &selected, &results, success, latency_ms)
            .await;

        if let Some(ref session_id) = request.session_id {
            let winners: Vec<String> = results
                .iter()
                .filter(|r| r.status.is_success())
                .map(|r| r.agent_id.clone())
                .collect();
            self.sessions.remember_success(session_id, &winners);
        }

        let summary = summarize(&request.query, &results);
        Ok(OrchestrateResponse {
            query: request.query,
            selected_agents: selected.iter().map(SelectedAgent::from).collect(),
            results,
            summary,
            latency_ms,
        })
    }

    /// Loads the active agents matching the requested tags.
    async fn discover(&self, tags: Vec<String>) -> Result<Vec<RegisteredAgent>, OrchestrateError> {
        let pool = self.pool.clone();
        let candidates = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
            let conn = pool.get()?;
            agents::list_active(&conn, &tags)
        })
        .await??;

        if candidates.is_empty() {
            return Err(OrchestrateError::NoAgentsFound);
        }
        Ok(candidates)
    }

    /// Cuts the ranked list down to the dispatch set.
    ///
    /// Preferences go first: explicitly requested agent ids in the order
    /// the caller gave them, then ids remembered for the session, then the
    /// ranked order. Duplicates are dropped and the result is truncated to
    /// the effective `maxAgents`.
    fn select(&self, ranked: Vec<RegisteredAgent>, request: &OrchestrateRequest) -> Vec<RegisteredAgent> {
        let max_agents = request
            .max_agents
            .unwrap_or(self.settings.default_max_agents)
            .clamp(1, self.settings.max_agents_cap);

        let mut preferred_ids = request.prefer_agent_ids.clone();
        if let Some(ref session_id) = request.session_id {
            for id in self.sessions.preferred_agents(session_id) {
                if !preferred_ids.contains(&id) {
                    preferred_ids.push(id);
                }
            }
        }

        let mut selected: Vec<RegisteredAgent> = Vec::new();
        for id in &preferred_ids {
            if selected.iter().any(|a| &a.agent_id == id) {
                continue;
            }
            // Preferences only apply to agents that passed discovery.
            if let Some(agent) = ranked.iter().find(|a| &a.agent_id == id) {
                selected.push(agent.clone());
            }
        }
        for agent in ranked {
            if selected.len() >= max_agents {
                break;
            }
            if selected.iter().all(|a| a.agent_id != agent.agent_id) {
                selected.push(agent);
            }
        }
        selected.truncate(max_agents);
        selected
    }

    /// Folds every outcome into its agent's rolling metrics and persists
    /// them. Best-effort: failures are logged, never surfaced.
    async fn record_metrics(&self, selected: &[RegisteredAgent], results: &[AgentCallResult]) {
        let decay = self.settings.ema_decay;
        let updates: Vec<(String, AgentMetrics)> = selected
            .iter()
            .zip(results)
            .map(|(agent, outcome)| {
                (agent.agent_id.clone(), apply_outcome(&agent.metrics(), outcome, decay))
            })
            .collect();
        if updates.is_empty() {
            return;
        }

        let pool = self.pool.clone();
        let written = tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = pool.get()?;
            for (agent_id, metrics) in &updates {
                if !agents::update_metrics(&conn, agent_id, metrics)? {
                    debug!(agent_id = %agent_id, "Metrics not updated, agent no longer registered");
                }
            }
            Ok(())
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist agent metrics"),
            Err(e) => warn!(error = %e, "Agent metrics task failed"),
        }
    }

    /// Appends the audit record. Best-effort: failures are logged, never
    /// surfaced.
    async fn append_log(
        &self,
        request: &OrchestrateRequest,
        selected: &[RegisteredAgent],
        results: &[AgentCallResult],
        success: bool,
        latency_ms: f64,
    ) {
        let record = NewOrchestrationLog {
            query: json!({"query": request.query, "skillTags": request.skill_tags}),
            skill_filter: if request.skill_tags.is_empty() {
                None
            } else {
                Some(request.skill_tags.join(","))
            },
            selected_agent_ids: selected.iter().map(|a| a.agent_id.clone()).collect(),
            results: results.to_vec(),
            success,
            latency_ms,
        };

        let pool = self.pool.clone();
        let written = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
            let conn = pool.get()?;
            logs::append_log(&conn, &record)
        })
        .await;

        match written {
            Ok(Ok(entry)) => debug!(log_id = entry.id, success, "Orchestration logged"),
            Ok(Err(e)) => warn!(error = %e, "Failed to append orchestration log"),
            Err(e) => warn!(error = %e, "Orchestration log task failed"),
        }
    }
}

/// Renders the human-readable aggregation of the per-agent outcomes.
///
/// Lists each responding agent by name, followed by any `text` artifacts
/// the agent attached to its response body.
pub fn summarize(query: &str, results: &[AgentCallResult]) -> String {
    let successful: Vec<&AgentCallResult> =
        results.iter().filter(|r| r.status.is_success()).collect();
    if successful.is_empty() {
        return "No agents successfully responded to your query.".to_string();
    }

    let mut parts = vec![
        format!("Query: {query}\n"),
        format!("Agents responded: {}/{}\n", successful.len(), results.len()),
    ];
    for outcome in successful {
        parts.push(format!("\n{}:", outcome.agent_name));
        let artifacts = outcome
            .result
            .as_ref()
            .and_then(|body| body.get("artifacts"))
            .and_then(Value::as_array);
        if let Some(artifacts) = artifacts {
            for artifact in artifacts {
                if artifact.get("type").and_then(Value::as_str) != Some("text") {
                    continue;
                }
                if let Some(content) = artifact.get("content").and_then(Value::as_str) {
                    parts.push(format!("  {content}"));
                }
            }
        }
    }
    parts.join("\n")
}
