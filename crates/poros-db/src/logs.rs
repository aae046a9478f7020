//! Store functions for the append-only orchestration log.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::StoreError;
use poros_types::{AgentCallResult, OrchestrationLog};

/// A finished orchestration ready to be recorded.
#[derive(Debug, Clone)]
pub struct NewOrchestrationLog {
    /// The client query as submitted (free text plus any skill tags).
    pub query: Value,
    /// Comma-joined skill filter, when one was applied.
    pub skill_filter: Option<String>,
    /// Agents selected for dispatch, in dispatch order.
    pub selected_agent_ids: Vec<String>,
    /// Normalized per-agent outcomes.
    pub results: Vec<AgentCallResult>,
    /// `true` only when every dispatched agent succeeded.
    pub success: bool,
    /// Total pipeline wall time in milliseconds.
    pub latency_ms: f64,
}

/// Appends one record and returns it with its assigned id and timestamp.
pub fn append_log(conn: &Connection, log: &NewOrchestrationLog) -> Result<OrchestrationLog, StoreError> {
    let query_json = serde_json::to_string(&log.query)?;
    let selected_json = serde_json::to_string(&log.selected_agent_ids)?;
    let results_json = serde_json::to_string(&log.results)?;
    let now = Utc::now().to_rfc3339();

    let id: i64 = conn.query_row(
        "INSERT INTO orchestration_log
            (query_json, skill_filter, selected_agents_json, results_json,
             success, latency_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id",
        params![
            query_json,
            log.skill_filter,
            selected_json,
            results_json,
            log.success,
            log.latency_ms,
            now,
        ],
        |row| row.get(0),
    )?;

    Ok(OrchestrationLog {
        id,
        query: log.query.clone(),
        skill_filter: log.skill_filter.clone(),
        selected_agent_ids: log.selected_agent_ids.clone(),
        results: log.results.clone(),
        success: log.success,
        latency_ms: log.latency_ms,
        created_at: now,
    })
}

/// Filter criteria for reading the log.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Keep only fully-successful orchestrations.
    pub success_only: bool,
    /// Records created at or after this RFC3339 timestamp.
    pub since: Option<String>,
    /// Maximum records returned (default 50).
    pub limit: Option<i64>,
}

/// Reads recent records, newest first.
pub fn query_logs(conn: &Connection, filter: &LogFilter) -> Result<Vec<OrchestrationLog>, StoreError> {
    // Collect WHERE clauses and bind parameters separately so nothing is
    // interpolated into the SQL.
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if filter.success_only {
        clauses.push("success = 1".to_string());
    }
    if let Some(ref since) = filter.since {
        clauses.push(format!("created_at >= ?{}", params.len() + 1));
        params.push(Box::new(since.clone()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, query_json, skill_filter, selected_agents_json, results_json,
                success, latency_ms, created_at
         FROM orchestration_log
         {where_clause}
         ORDER BY id DESC
         LIMIT ?{}",
        params.len() + 1
    );
    params.push(Box::new(filter.limit.unwrap_or(50)));

    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| &**p).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, bool>(5)?,
            row.get::<_, f64>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut logs = Vec::new();
    for row in rows {
        let (id, query_json, skill_filter, selected_json, results_json, success, latency_ms, created_at) = row?;
        logs.push(OrchestrationLog {
            id,
            query: serde_json::from_str(&query_json)?,
            skill_filter,
            selected_agent_ids: serde_json::from_str(&selected_json)?,
            results: serde_json::from_str(&results_json)?,
            success,
            latency_ms,
            created_at,
        });
    }
    Ok(logs)
}
