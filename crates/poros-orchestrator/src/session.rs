//! Per-session selection memory.
//!
//! When a client supplies a session id, the orchestrator remembers which
//! agents answered that session successfully and treats them as preferred
//! on follow-up requests. The store is bounded in both directions: entries
//! expire after a TTL and the map never grows past a fixed entry count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Retention tunables for the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Idle lifetime of a session entry; reads and writes both refresh it.
    pub ttl: Duration,
    /// Hard cap on concurrently tracked sessions.
    pub max_entries: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(1800),
            max_entries: 10_000,
        }
    }
}

// Per-session list cap; matches the orchestrator's selection ceiling.
const MAX_REMEMBERED: usize = 10;

#[derive(Debug, Clone)]
struct SessionEntry {
    /// Most recent successes first.
    agent_ids: Vec<String>,
    touched: Instant,
}

/// Bounded, TTL-evicting map from session id to remembered agent ids.
///
/// Cheap to clone; clones share the underlying map.
#[derive(Clone)]
pub struct SessionStore {
    settings: SessionSettings,
    entries: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl SessionStore {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            // A panicked writer cannot leave a partially updated entry;
            // the map is always safe to reuse.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Agent ids previously remembered for `session_id`, most recent
    /// successes first. Reading refreshes the entry's TTL; an expired
    /// entry is dropped and yields nothing.
    pub fn preferred_agents(&self, session_id: &str) -> Vec<String> {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get_mut(session_id) {
            Some(entry) if now.duration_since(entry.touched) < self.settings.ttl => {
                entry.touched = now;
                entry.agent_ids.clone()
            }
            Some(_) => {
                entries.remove(session_id);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Records agents that answered this session successfully. The new ids
    /// move to the front; previously remembered ids follow, deduplicated,
    /// capped at a small fixed length.
    pub fn remember_success(&self, session_id: &str, agent_ids: &[String]) {
        if agent_ids.is_empty() {
            return;
        }
        let now = Instant::now();
        let ttl = self.settings.ttl;
        let mut entries = self.lock();

        if !entries.contains_key(session_id) && entries.len() >= self.settings.max_entries {
            entries.retain(|_, entry| now.duration_since(entry.touched) < ttl);
            if entries.len() >= self.settings.max_entries {
                debug!(session_id, "session store full, not tracking session");
                return;
            }
        }

        let entry = entries.entry(session_id.to_string()).or_insert_with(|| SessionEntry {
            agent_ids: Vec::new(),
            touched: now,
        });

        let mut merged: Vec<String> = Vec::new();
        for id in agent_ids.iter().chain(entry.agent_ids.iter()) {
            if !merged.contains(id) {
                merged.push(id.clone());
            }
        }
        merged.truncate(MAX_REMEMBERED);

        entry.agent_ids = merged;
        entry.touched = now;
    }

    /// Drops every expired entry and returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.settings.ttl;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.touched) < ttl);
        before - entries.len()
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background loop evicting expired sessions on an interval.
///
/// Spawn once at server startup; runs until the process exits.
pub async fn start_session_sweeper(store: SessionStore, interval_secs: u64) {
    let interval_secs = interval_secs.max(1);
    info!(interval_secs, "Session sweeper started");

    loop {
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        let evicted = store.sweep();
        if evicted > 0 {
            debug!(evicted, "Session sweeper evicted expired sessions");
        }
    }
}
