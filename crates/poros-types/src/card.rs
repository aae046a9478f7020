//! The AgentCard document model and submission validation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

fn default_transport() -> String {
    "JSONRPC".to_string()
}

/// A self-describing agent document authored by the agent owner.
///
/// Cards travel as JSON and may carry fields beyond the ones modeled here;
/// signing and storage always operate on the submitted JSON value, so this
/// struct is a typed *view* used for validation and SDK construction, not
/// the canonical representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    /// Stable id chosen by the owner; the registry derives one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human-readable agent name.
    pub name: String,
    /// What the agent does, in prose.
    pub description: String,
    /// Base URL the orchestrator dispatches to.
    pub url: String,
    /// Transport hint for callers.
    #[serde(rename = "preferredTransport", default = "default_transport")]
    pub preferred_transport: String,
    /// Poros protocol version the agent speaks.
    #[serde(rename = "protocolVersion", skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Owner identity, `did:poros:ed25519:<key>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    /// Base64 Ed25519 signature over the canonicalized card.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Skills the agent advertises. At least one is required.
    #[serde(default)]
    pub skills: Vec<Skill>,
    /// Verb-level capabilities, used by interop discovery.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
    /// Pricing terms, if the agent charges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    /// Free-form owner metadata (service tier, location, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// One advertised skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Skill {
    /// Skill identifier, e.g. `"weather-lookup"`.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Prose description.
    #[serde(default)]
    pub description: String,
    /// Match tags; the orchestrator filters on these.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A verb-level capability advertised for interop discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Capability {
    /// Capability name, matched by `/orchestrate/discover`.
    #[serde(default)]
    pub name: String,
    /// Poros verbs the capability answers to.
    #[serde(default)]
    pub verbs: Vec<String>,
    /// Prose description.
    #[serde(default)]
    pub description: String,
}

/// Pricing terms advertised on a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Pricing {
    /// Billing model, e.g. `"per_call"`.
    #[serde(default)]
    pub model: String,
    /// Price per unit of the billing model.
    #[serde(default)]
    pub amount: f64,
    /// ISO currency code.
    #[serde(default)]
    pub currency: String,
    /// Service tier label, consulted by revenue ranking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// Rejection reasons for a submitted card.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CardError {
    #[error("agent card must be a JSON object")]
    NotAnObject,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field may not be empty: {0}")]
    EmptyField(&'static str),
    #[error("invalid agent url: {0}")]
    InvalidUrl(String),
    #[error("at least one skill is required")]
    NoSkills,
    #[error("malformed agent card: {0}")]
    Malformed(String),
}

impl AgentCard {
    /// Parses and validates a submitted card.
    ///
    /// Checks the required fields up front so rejections name the field that
    /// is missing rather than surfacing a deserializer message.
    pub fn from_value(value: &Value) -> Result<Self, CardError> {
        let obj = value.as_object().ok_or(CardError::NotAnObject)?;
        for field in ["name", "description", "url", "skills"] {
            if !obj.contains_key(field) {
                return Err(CardError::MissingField(field));
            }
        }
        let card: AgentCard = serde_json::from_value(value.clone())
            .map_err(|e| CardError::Malformed(e.to_string()))?;
        card.validate()?;
        Ok(card)
    }

    /// Validates field contents beyond shape: non-empty name and
    /// description, a parseable absolute URL with a host, and at least
    /// one skill.
    pub fn validate(&self) -> Result<(), CardError> {
        if self.name.trim().is_empty() {
            return Err(CardError::EmptyField("name"));
        }
        if self.description.trim().is_empty() {
            return Err(CardError::EmptyField("description"));
        }
        let parsed = Url::parse(&self.url).map_err(|_| CardError::InvalidUrl(self.url.clone()))?;
        if parsed.host_str().is_none() {
            return Err(CardError::InvalidUrl(self.url.clone()));
        }
        if self.skills.is_empty() {
            return Err(CardError::NoSkills);
        }
        Ok(())
    }

    /// Flattens the card's skill tags into one deduplicated list,
    /// preserving first-seen order.
    pub fn skill_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for skill in &self.skills {
            for tag in &skill.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }

    /// Service tier label for revenue ranking.
    ///
    /// Looks at `metadata.tier` first, then `pricing.tier`; `"free"` when
    /// neither is present.
    pub fn tier(&self) -> &str {
        if let Some(tier) = self.metadata.get("tier").and_then(Value::as_str) {
            return tier;
        }
        if let Some(tier) = self.pricing.as_ref().and_then(|p| p.tier.as_deref()) {
            return tier;
        }
        "free"
    }
}
