//! Store functions for the agent directory.
//!
//! All functions take a plain `&Connection`; callers are responsible for
//! checking one out of the pool (under `spawn_blocking` on async paths).

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::StoreError;
use poros_types::{AgentMetrics, RegisteredAgent};

/// A validated agent ready for insertion.
#[derive(Debug, Clone)]
pub struct NewAgent {
    /// Directory id; must be unique.
    pub agent_id: String,
    /// Owner DID when the card was signed.
    pub did: Option<String>,
    pub name: String,
    pub description: String,
    pub url: String,
    pub preferred_transport: String,
    /// Flattened card tags.
    pub skills_tags: Vec<String>,
    /// The submitted card, verbatim.
    pub card: Value,
}

/// Listing filters for the registry API.
#[derive(Debug, Clone)]
pub struct AgentFilter {
    /// Keep only agents advertising this tag.
    pub skill_tag: Option<String>,
    /// Keep only agents whose name or description contains this
    /// (case-insensitive).
    pub name_search: Option<String>,
    /// Drop inactive agents. On by default.
    pub active_only: bool,
    /// Maximum rows returned (default 100).
    pub limit: Option<usize>,
}

impl Default for AgentFilter {
    fn default() -> Self {
        Self {
            skill_tag: None,
            name_search: None,
            active_only: true,
            limit: None,
        }
    }
}

fn map_agent(row: &Row<'_>) -> rusqlite::Result<RegisteredAgent> {
    let tags_json: String = row.get(6)?;
    let card_json: String = row.get(7)?;
    Ok(RegisteredAgent {
        agent_id: row.get(0)?,
        did: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        url: row.get(4)?,
        preferred_transport: row.get(5)?,
        skills_tags: parse_json_col(6, &tags_json)?,
        card: parse_json_col(7, &card_json)?,
        is_active: row.get(8)?,
        total_calls: row.get(9)?,
        success_rate: row.get(10)?,
        avg_latency_ms: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn parse_json_col<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

const AGENT_COLUMNS: &str = "agent_id, did, name, description, url, preferred_transport, \
     skills_tags, card_json, is_active, total_calls, success_rate, avg_latency_ms, \
     created_at, updated_at";

/// Inserts a new agent with fresh metrics and returns the stored record.
///
/// # Errors
///
/// Returns [`StoreError::DuplicateAgent`] when the id is already taken.
pub fn insert_agent(conn: &Connection, agent: &NewAgent) -> Result<RegisteredAgent, StoreError> {
    let now = Utc::now().to_rfc3339();
    let tags_json = serde_json::to_string(&agent.skills_tags)?;
    let card_json = serde_json::to_string(&agent.card)?;

    let result = conn.execute(
        "INSERT INTO agents
            (agent_id, did, name, description, url, preferred_transport,
             skills_tags, card_json, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
        params![
            agent.agent_id,
            agent.did,
            agent.name,
            agent.description,
            agent.url,
            agent.preferred_transport,
            tags_json,
            card_json,
            now,
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(StoreError::DuplicateAgent(agent.agent_id.clone()));
        }
        Err(e) => return Err(e.into()),
    }

    let defaults = AgentMetrics::default();
    Ok(RegisteredAgent {
        agent_id: agent.agent_id.clone(),
        did: agent.did.clone(),
        name: agent.name.clone(),
        description: agent.description.clone(),
        url: agent.url.clone(),
        preferred_transport: agent.preferred_transport.clone(),
        skills_tags: agent.skills_tags.clone(),
        card: agent.card.clone(),
        is_active: true,
        total_calls: defaults.total_calls,
        success_rate: defaults.success_rate,
        avg_latency_ms: defaults.avg_latency_ms,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Looks up a single agent by directory id.
pub fn get_agent(conn: &Connection, agent_id: &str) -> Result<Option<RegisteredAgent>, StoreError> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = ?1");
    Ok(conn
        .query_row(&sql, [agent_id], map_agent)
        .optional()?)
}

/// Looks up a single agent by owner DID.
pub fn get_agent_by_did(conn: &Connection, did: &str) -> Result<Option<RegisteredAgent>, StoreError> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE did = ?1");
    Ok(conn.query_row(&sql, [did], map_agent).optional()?)
}

/// Loads all active agents, optionally narrowed to those advertising at
/// least one of `skill_tags`. An empty slice applies no tag filter.
///
/// This is the orchestrator's discovery boundary.
pub fn list_active(conn: &Connection, skill_tags: &[String]) -> Result<Vec<RegisteredAgent>, StoreError> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE is_active = 1 ORDER BY id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_agent)?;

    let mut agents = Vec::new();
    for row in rows {
        let agent = row?;
        if skill_tags.is_empty() || agent.has_any_tag(skill_tags) {
            agents.push(agent);
        }
    }
    Ok(agents)
}

/// Lists agents for the registry API with the given filters, in
/// registration order.
pub fn list_agents(conn: &Connection, filter: &AgentFilter) -> Result<Vec<RegisteredAgent>, StoreError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if filter.active_only {
        clauses.push("is_active = 1".to_string());
    }
    if let Some(ref needle) = filter.name_search {
        let n = params.len() + 1;
        clauses.push(format!("(name LIKE ?{n} OR description LIKE ?{n})"));
        params.push(Box::new(format!("%{needle}%")));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents {where_clause} ORDER BY id ASC");

    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| &**p).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), map_agent)?;

    // Tag membership lives in a JSON column, so it is filtered after the
    // row mapping rather than in SQL.
    let limit = filter.limit.unwrap_or(100);
    let mut agents = Vec::new();
    for row in rows {
        let agent = row?;
        if let Some(ref tag) = filter.skill_tag {
            if !agent.skills_tags.contains(tag) {
                continue;
            }
        }
        agents.push(agent);
        if agents.len() >= limit {
            break;
        }
    }
    Ok(agents)
}

/// Removes an agent. Returns `false` when no such agent existed.
pub fn delete_agent(conn: &Connection, agent_id: &str) -> Result<bool, StoreError> {
    let n = conn.execute("DELETE FROM agents WHERE agent_id = ?1", [agent_id])?;
    Ok(n > 0)
}

/// Overwrites an agent's rolling metrics. Returns `false` when the agent
/// no longer exists (it may have been deleted mid-orchestration).
pub fn update_metrics(
    conn: &Connection,
    agent_id: &str,
    metrics: &AgentMetrics,
) -> Result<bool, StoreError> {
    let n = conn.execute(
        "UPDATE agents
         SET total_calls = ?1, success_rate = ?2, avg_latency_ms = ?3, updated_at = ?4
         WHERE agent_id = ?5",
        params![
            metrics.total_calls,
            metrics.success_rate,
            metrics.avg_latency_ms,
            Utc::now().to_rfc3339(),
            agent_id,
        ],
    )?;
    Ok(n > 0)
}
