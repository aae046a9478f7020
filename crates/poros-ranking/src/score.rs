//! Metric-driven strategy scores.

use poros_types::RegisteredAgent;

/// Performance score: success rate (up to 60 points), latency (up to 30,
/// linearly down to 0 at 5000 ms), and call-volume popularity (up to 10,
/// logarithmic).
pub fn performance_score(agent: &RegisteredAgent) -> f64 {
    let success = agent.success_rate * 60.0;
    let latency = (30.0 - (agent.avg_latency_ms / 5000.0) * 30.0).max(0.0);
    let popularity = ((agent.total_calls as f64 + 1.0).log10() * 2.0).min(10.0);
    (success + latency + popularity).clamp(0.0, 100.0)
}

/// Revenue score: pricing tier points weighted by delivery reliability.
///
/// Tier labels are matched exactly; anything unrecognized scores as free.
pub fn revenue_score(agent: &RegisteredAgent) -> f64 {
    let tier_points = match agent.tier() {
        "enterprise" => 100.0,
        "premium" => 70.0,
        "pro" => 40.0,
        _ => 0.0,
    };
    (tier_points + agent.success_rate * 10.0).clamp(0.0, 100.0)
}
