//! Fan-out calls to agent query endpoints.

use poros_types::{AgentCallResult, RegisteredAgent};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

/// The endpoint for one verb on a registered base URL.
///
/// Owners usually register the service root; `/<verb>` is appended unless
/// the registered URL already ends with it.
pub fn verb_url(base: &str, verb: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    let suffix = format!("/{verb}");
    if trimmed.ends_with(&suffix) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{suffix}")
    }
}

/// The dispatch endpoint for a registered base URL.
pub fn query_url(base: &str) -> String {
    verb_url(base, "query")
}

/// Calls one agent and normalizes whatever happens into an
/// [`AgentCallResult`].
///
/// This function never fails: timeouts, transport errors, non-2xx statuses,
/// and non-JSON bodies all become error outcomes for this agent alone, so
/// one bad agent cannot disturb its siblings in a concurrent fan-out.
/// Error outcomes report a latency of 0.
pub async fn call_agent(
    client: &reqwest::Client,
    agent: &RegisteredAgent,
    query: &str,
    timeout: Duration,
) -> AgentCallResult {
    let url = query_url(&agent.url);
    let started = Instant::now();

    let sent = client
        .post(&url)
        .json(&json!({ "query": query }))
        .timeout(timeout)
        .send()
        .await;

    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            debug!(agent_id = %agent.agent_id, url = %url, error = %e, "Agent call failed");
            let reason = if e.is_timeout() {
                format!("agent timed out after {:.1}s", timeout.as_secs_f64())
            } else {
                format!("agent unreachable: {e}")
            };
            return AgentCallResult::error(&agent.agent_id, &agent.name, 0.0, reason);
        }
    };

    let status = response.status();
    if !status.is_success() {
        debug!(agent_id = %agent.agent_id, url = %url, %status, "Agent returned an error status");
        return AgentCallResult::error(
            &agent.agent_id,
            &agent.name,
            0.0,
            format!("agent returned HTTP {status}"),
        );
    }

    match response.json::<serde_json::Value>().await {
        Ok(body) => {
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            AgentCallResult::success(&agent.agent_id, &agent.name, latency_ms, body)
        }
        Err(e) => {
            debug!(agent_id = %agent.agent_id, url = %url, error = %e, "Agent response was not JSON");
            AgentCallResult::error(
                &agent.agent_id,
                &agent.name,
                0.0,
                format!("agent response was not valid JSON: {e}"),
            )
        }
    }
}
