//! Agent ranking for the Poros orchestrator.
//!
//! Four strategies, all scoring on a 0-100 scale: `performance` (rolling
//! quality metrics), `semantic` (query relevance), `revenue` (pricing tier),
//! and the default `hybrid` blend. A [`Ranker`] is constructed once at
//! startup with its weights and semantic backend resolved up front; ranking
//! itself is pure and deterministic.

use poros_types::{RankStrategy, RegisteredAgent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

mod score;
mod semantic;

pub use score::{performance_score, revenue_score};
pub use semantic::{keyword_score, EmbedError, MockEmbedder, SemanticScorer, TextEmbedder};

/// Component weights for the hybrid strategy.
///
/// These are configuration defaults, overridable from the server config;
/// they do not need to sum to 1 but the shipped defaults do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankWeights {
    /// Weight of the requested-tag Jaccard overlap.
    #[serde(default = "default_skill_match")]
    pub skill_match: f64,
    /// Weight of the performance score.
    #[serde(default = "default_performance")]
    pub performance: f64,
    /// Weight of the semantic relevance score.
    #[serde(default = "default_semantic")]
    pub semantic: f64,
    /// Weight of the revenue score.
    #[serde(default = "default_revenue")]
    pub revenue: f64,
    /// Weight of the freshness score.
    #[serde(default = "default_freshness")]
    pub freshness: f64,
}

fn default_skill_match() -> f64 {
    0.40
}
fn default_performance() -> f64 {
    0.25
}
fn default_semantic() -> f64 {
    0.20
}
fn default_revenue() -> f64 {
    0.10
}
fn default_freshness() -> f64 {
    0.05
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            skill_match: default_skill_match(),
            performance: default_performance(),
            semantic: default_semantic(),
            revenue: default_revenue(),
            freshness: default_freshness(),
        }
    }
}

// Freshness is a fixed neutral score until a registration-age boost exists.
const FRESHNESS_NEUTRAL: f64 = 50.0;

/// Scores and orders agents for dispatch.
///
/// Construct one per process: the semantic backend is resolved here, never
/// per request.
pub struct Ranker {
    weights: RankWeights,
    semantic: SemanticScorer,
}

impl Ranker {
    pub fn new(weights: RankWeights, semantic: SemanticScorer) -> Self {
        Self { weights, semantic }
    }

    /// The default production configuration: keyword semantic matching and
    /// the shipped weights.
    pub fn keyword_only() -> Self {
        Self::new(RankWeights::default(), SemanticScorer::keyword())
    }

    /// Scores one agent under a strategy. All strategies return values in
    /// [0,100].
    pub fn score(
        &self,
        agent: &RegisteredAgent,
        query: &str,
        requested_tags: &[String],
        strategy: RankStrategy,
    ) -> f64 {
        match strategy {
            RankStrategy::Performance => performance_score(agent),
            RankStrategy::Semantic => self.semantic.score(query, agent),
            RankStrategy::Revenue => revenue_score(agent),
            RankStrategy::Hybrid => self.hybrid_score(agent, query, requested_tags),
        }
    }

    fn hybrid_score(&self, agent: &RegisteredAgent, query: &str, requested_tags: &[String]) -> f64 {
        let w = &self.weights;
        skill_match_score(agent, requested_tags) * w.skill_match
            + performance_score(agent) * w.performance
            + self.semantic.score(query, agent) * w.semantic
            + revenue_score(agent) * w.revenue
            + FRESHNESS_NEUTRAL * w.freshness
    }

    /// Returns the agents reordered best-first under `strategy`.
    ///
    /// The sort is stable and descending: equal scores keep their input
    /// order. The input is never mutated.
    pub fn rank(
        &self,
        agents: &[RegisteredAgent],
        query: &str,
        requested_tags: &[String],
        strategy: RankStrategy,
    ) -> Vec<RegisteredAgent> {
        let mut scored: Vec<(f64, &RegisteredAgent)> = agents
            .iter()
            .map(|agent| (self.score(agent, query, requested_tags, strategy), agent))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().map(|(_, agent)| agent.clone()).collect()
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::keyword_only()
    }
}

/// Jaccard overlap of requested tags vs the agent's tags, times 100.
///
/// 50 (neutral) when the request carries no tags, so untagged queries do
/// not penalize or privilege anyone on this component.
pub fn skill_match_score(agent: &RegisteredAgent, requested_tags: &[String]) -> f64 {
    if requested_tags.is_empty() {
        return 50.0;
    }
    let agent_tags: HashSet<&str> = agent.skills_tags.iter().map(String::as_str).collect();
    let requested: HashSet<&str> = requested_tags.iter().map(String::as_str).collect();
    let union = agent_tags.union(&requested).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = agent_tags.intersection(&requested).count();
    intersection as f64 / union as f64 * 100.0
}
