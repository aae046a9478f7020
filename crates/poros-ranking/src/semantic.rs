//! Semantic relevance scoring: keyword overlap by default, with a
//! pluggable embedding backend behind [`TextEmbedder`].

use poros_types::RegisteredAgent;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Error from an embedding backend.
#[derive(Debug, thiserror::Error)]
#[error("embedding failed: {0}")]
pub struct EmbedError(pub String);

/// A text embedding model.
pub trait TextEmbedder: Send + Sync {
    /// Embeds a text string into a dense vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// A mock embedder for tests: maps known strings to fixed vectors.
pub struct MockEmbedder {
    embeddings: HashMap<String, Vec<f32>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            embeddings: HashMap::new(),
        }
    }

    pub fn insert(&mut self, text: &str, vector: Vec<f32>) {
        self.embeddings.insert(text.to_string(), vector);
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEmbedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embeddings
            .get(text)
            .cloned()
            .ok_or_else(|| EmbedError(format!("no embedding for: {text}")))
    }
}

/// Query-relevance scorer with its backend chosen at construction time.
///
/// Production deployments without an embedding model run keyword-only; a
/// backend error at scoring time falls back to the keyword score so one
/// flaky model call cannot zero out a strategy.
pub struct SemanticScorer {
    backend: Option<Arc<dyn TextEmbedder>>,
}

impl SemanticScorer {
    /// Keyword-overlap scoring only.
    pub fn keyword() -> Self {
        Self { backend: None }
    }

    /// Embedding-based scoring with `backend`.
    pub fn with_embedder(backend: Arc<dyn TextEmbedder>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Scores how well `query` matches the agent, 0-100.
    pub fn score(&self, query: &str, agent: &RegisteredAgent) -> f64 {
        let Some(backend) = &self.backend else {
            return keyword_score(query, agent);
        };
        match embedding_score(backend.as_ref(), query, &document_text(agent)) {
            Ok(score) => score,
            Err(err) => {
                tracing::debug!(error = %err, agent = %agent.agent_id, "embedding backend failed, using keyword match");
                keyword_score(query, agent)
            }
        }
    }
}

/// Keyword relevance: the share of query words found in the agent document
/// (70 points) plus a 30-point bonus when any query word appears inside the
/// agent name. Capped at 100; an empty query scores 0.
pub fn keyword_score(query: &str, agent: &RegisteredAgent) -> f64 {
    let query_lower = query.to_lowercase();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.0;
    }

    let doc = document_text(agent).to_lowercase();
    let doc_words: HashSet<&str> = doc.split_whitespace().collect();
    let overlap = query_words.intersection(&doc_words).count();
    let mut score = overlap as f64 / query_words.len() as f64 * 70.0;

    let name_lower = agent.name.to_lowercase();
    if query_words.iter().any(|w| name_lower.contains(w)) {
        score += 30.0;
    }
    score.min(100.0)
}

/// The text an agent is matched against: name, description, tags, and the
/// names/descriptions of every skill on the card.
pub(crate) fn document_text(agent: &RegisteredAgent) -> String {
    let mut parts: Vec<String> = vec![agent.name.clone(), agent.description.clone()];
    parts.extend(agent.skills_tags.iter().cloned());
    if let Some(skills) = agent.card.get("skills").and_then(Value::as_array) {
        for skill in skills {
            for key in ["name", "description"] {
                if let Some(text) = skill.get(key).and_then(Value::as_str) {
                    parts.push(text.to_string());
                }
            }
        }
    }
    parts.join(" ")
}

fn embedding_score(backend: &dyn TextEmbedder, query: &str, doc: &str) -> Result<f64, EmbedError> {
    let q = backend.embed(query)?;
    let d = backend.embed(doc)?;
    Ok((f64::from(cosine_similarity(&q, &d)) * 100.0).clamp(0.0, 100.0))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
