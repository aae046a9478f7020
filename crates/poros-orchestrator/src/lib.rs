//! Query orchestration across registered agents.
//!
//! One [`Orchestrator`] per process runs the pipeline: discover active
//! agents by skill tag, rank them (`poros-ranking`), select the top N
//! honoring caller and session preferences, fan the query out concurrently
//! with isolated per-call timeouts, fold each outcome into the agent's
//! rolling metrics, append an audit record, and respond with the
//! aggregated results.
//!
//! Partial failure is the normal case, not an error: a timed-out or
//! unreachable agent yields an `error` outcome in the response while its
//! siblings complete undisturbed.

mod dispatch;
mod engine;
mod metrics;
mod session;

pub use dispatch::{call_agent, query_url, verb_url};
pub use engine::{summarize, OrchestrateError, Orchestrator, OrchestratorSettings};
pub use metrics::{apply_outcome, ema_update};
pub use session::{start_session_sweeper, SessionSettings, SessionStore};
