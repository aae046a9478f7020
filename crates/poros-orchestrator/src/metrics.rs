//! Rolling metric updates applied after every dispatch.

use poros_types::{AgentCallResult, AgentMetrics};

/// One exponential-moving-average step: `old * decay + sample * (1 - decay)`.
pub fn ema_update(old: f64, sample: f64, decay: f64) -> f64 {
    old * decay + sample * (1.0 - decay)
}

/// Folds one call outcome into an agent's rolling metrics.
///
/// The success EMA absorbs every outcome (1.0 for success, 0.0 for error).
/// The latency EMA only absorbs positive samples; failed calls report 0 ms
/// and are skipped. The first positive sample replaces a zero average
/// outright rather than being averaged against it.
pub fn apply_outcome(metrics: &AgentMetrics, outcome: &AgentCallResult, decay: f64) -> AgentMetrics {
    let sample = if outcome.status.is_success() { 1.0 } else { 0.0 };
    let success_rate = ema_update(metrics.success_rate, sample, decay);

    let avg_latency_ms = if outcome.latency_ms > 0.0 {
        if metrics.avg_latency_ms > 0.0 {
            ema_update(metrics.avg_latency_ms, outcome.latency_ms, decay)
        } else {
            outcome.latency_ms
        }
    } else {
        metrics.avg_latency_ms
    };

    AgentMetrics {
        total_calls: metrics.total_calls + 1,
        success_rate,
        avg_latency_ms,
    }
}
