//! The HTTP client and its request/response views.

use poros_identity::{sign_card, IdentityError, KeyPair};
use poros_types::{OrchestrateRequest, OrchestrateResponse, OrchestrationLog, RegisteredAgent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors returned by [`PorosClient`] calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure: connection refused, DNS, timeout, or a
    /// response body that could not be decoded.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with an error status. `message` carries the
    /// server's own description when it sent one.
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
    /// A card passed to a local helper was not usable.
    #[error("invalid card: {0}")]
    Card(String),
    /// Local key handling failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl ClientError {
    /// `true` when a retry could plausibly succeed: transport failures
    /// and 5xx answers. Client-side mistakes (4xx, bad keys) are final.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::Card(_) | ClientError::Identity(_) => false,
        }
    }
}

/// Response of the health endpoint.
#[derive(Debug, Deserialize)]
pub struct ServerHealth {
    pub status: String,
    pub version: String,
}

/// A freshly generated server-side identity.
///
/// The private key is returned once and never stored by the server.
#[derive(Debug, Deserialize)]
pub struct GeneratedIdentity {
    pub did: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Response of the sign endpoint.
#[derive(Debug, Deserialize)]
pub struct SignedCard {
    /// Detached signature over the canonical card.
    pub signature: String,
    /// The submitted card with `signature` and `did` attached.
    #[serde(rename = "signedAgentCard")]
    pub signed_agent_card: Value,
}

/// Verdict of the verify endpoint.
#[derive(Debug, Deserialize)]
pub struct VerifyOutcome {
    pub valid: bool,
    pub message: String,
}

/// Filters for [`PorosClient::list_agents`]. The default lists active
/// agents with the server's default page size.
#[derive(Debug, Default, Serialize)]
pub struct AgentQuery {
    /// Keep only agents advertising this skill tag.
    #[serde(rename = "skillTag", skip_serializing_if = "Option::is_none")]
    pub skill_tag: Option<String>,
    /// Case-insensitive needle matched against names and descriptions.
    #[serde(rename = "nameSearch", skip_serializing_if = "Option::is_none")]
    pub name_search: Option<String>,
    /// Include inactive agents by setting this to `false`.
    #[serde(rename = "activeOnly", skip_serializing_if = "Option::is_none")]
    pub active_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Filters for [`PorosClient::orchestration_logs`].
#[derive(Debug, Default, Serialize)]
pub struct LogQuery {
    /// Keep only fully successful runs.
    #[serde(rename = "successOnly", skip_serializing_if = "Option::is_none")]
    pub success_only: Option<bool>,
    /// Keep only runs recorded at or after this RFC 3339 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// Narrowing filters for [`PorosClient::discover`].
#[derive(Debug, Default, Serialize)]
pub struct DiscoverFilters {
    /// Keep only agents whose advertised price is at most this.
    #[serde(rename = "maxPrice", skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    /// Keep only agents whose location contains this (case-insensitive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One agent found by capability discovery.
#[derive(Debug, Deserialize)]
pub struct Discovered {
    pub did: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub name: String,
    #[serde(rename = "reputationScore")]
    pub reputation_score: f64,
    pub pricing: Value,
}

/// A relayed agent answer from the query verb.
#[derive(Debug, Deserialize)]
pub struct AgentReply {
    #[serde(rename = "agentDid")]
    pub agent_did: String,
    /// The agent's JSON answer, unmodified.
    pub response: Value,
    /// Signature lifted from the answer, when the agent signs responses.
    pub signature: Option<String>,
}

#[derive(Deserialize)]
struct DiscoverEnvelope {
    agents: Vec<Discovered>,
}

#[derive(Serialize)]
struct DiscoverBody<'a> {
    capability: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<&'a DiscoverFilters>,
}

/// Client for a Poros server.
///
/// Cheap to clone indirectly: construct once and share, or hand each task
/// its own (the underlying connection pool is per [`reqwest::Client`]).
pub struct PorosClient {
    base_url: String,
    http: reqwest::Client,
}

impl PorosClient {
    /// Creates a client for the server at `base_url`. A trailing slash is
    /// tolerated.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Replaces the underlying HTTP client, e.g. to set timeouts or proxy
    /// settings.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Checks the server is up and returns its version.
    pub async fn health(&self) -> Result<ServerHealth, ClientError> {
        let url = self.endpoint("/health");
        decode(self.http.get(&url).send().await?).await
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Publishes an AgentCard and returns the stored directory record.
    pub async fn register_agent(&self, card: &Value) -> Result<RegisteredAgent, ClientError> {
        let url = self.endpoint("/api/registry/agents");
        let request = self.http.post(&url).json(&json!({ "agentCard": card }));
        decode(request.send().await?).await
    }

    /// Like [`register_agent`](Self::register_agent), but keeps trying
    /// through transient failures, doubling `delay` between attempts.
    ///
    /// Meant for agent startup, where the directory may still be coming
    /// up. Rejections that a retry cannot fix (duplicate id, invalid
    /// card) are returned immediately.
    pub async fn register_agent_with_retry(
        &self,
        card: &Value,
        attempts: u32,
        delay: Duration,
    ) -> Result<RegisteredAgent, ClientError> {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.register_agent(card).await {
                Ok(agent) => return Ok(agent),
                Err(e) if attempt < attempts && e.is_transient() => {
                    warn!(attempt, attempts, error = %e, "Registration failed, retrying");
                    tokio::time::sleep(delay * 2_u32.pow(attempt - 1)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Lists registered agents, newest first.
    pub async fn list_agents(&self, query: &AgentQuery) -> Result<Vec<RegisteredAgent>, ClientError> {
        let url = self.endpoint("/api/registry/agents");
        decode(self.http.get(&url).query(query).send().await?).await
    }

    /// Fetches one agent by directory id.
    pub async fn get_agent(&self, agent_id: &str) -> Result<RegisteredAgent, ClientError> {
        let url = self.endpoint(&format!("/api/registry/agents/{agent_id}"));
        decode(self.http.get(&url).send().await?).await
    }

    /// Removes an agent from the directory.
    pub async fn delete_agent(&self, agent_id: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&format!("/api/registry/agents/{agent_id}"));
        let response = self.http.delete(&url).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(api_error(response).await)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Asks the server to mint a fresh Ed25519 identity.
    ///
    /// For offline generation use [`KeyPair::generate`] instead; the
    /// private key then never crosses the network.
    pub async fn generate_did(&self) -> Result<GeneratedIdentity, ClientError> {
        let url = self.endpoint("/api/identity/generate-did");
        decode(self.http.post(&url).send().await?).await
    }

    /// Asks the server to sign a card with the submitted private key.
    pub async fn sign_agent_card(
        &self,
        card: &Value,
        private_key: &str,
    ) -> Result<SignedCard, ClientError> {
        let url = self.endpoint("/api/identity/sign-agent-card");
        let body = json!({ "agentCard": card, "privateKey": private_key });
        decode(self.http.post(&url).json(&body).send().await?).await
    }

    /// Checks a card signature against a DID.
    pub async fn verify_agent_card(
        &self,
        card: &Value,
        signature: &str,
        did: &str,
    ) -> Result<VerifyOutcome, ClientError> {
        let url = self.endpoint("/api/identity/verify-agent-card");
        let body = json!({ "agentCard": card, "signature": signature, "did": did });
        decode(self.http.post(&url).json(&body).send().await?).await
    }

    // ------------------------------------------------------------------
    // Orchestration
    // ------------------------------------------------------------------

    /// Runs one orchestration: match, rank, fan out, aggregate.
    pub async fn orchestrate(
        &self,
        request: &OrchestrateRequest,
    ) -> Result<OrchestrateResponse, ClientError> {
        let url = self.endpoint("/api/orchestrator/orchestrate");
        decode(self.http.post(&url).json(request).send().await?).await
    }

    /// Reads the orchestration audit log, newest first.
    pub async fn orchestration_logs(
        &self,
        query: &LogQuery,
    ) -> Result<Vec<OrchestrationLog>, ClientError> {
        let url = self.endpoint("/api/orchestrator/logs");
        decode(self.http.get(&url).query(query).send().await?).await
    }

    // ------------------------------------------------------------------
    // Interop verbs
    // ------------------------------------------------------------------

    /// Finds agents by capability: a skill tag, capability name, or
    /// skill id.
    pub async fn discover(
        &self,
        capability: &str,
        filters: Option<&DiscoverFilters>,
    ) -> Result<Vec<Discovered>, ClientError> {
        let url = self.endpoint("/orchestrate/discover");
        let body = DiscoverBody {
            capability,
            filters,
        };
        let envelope: DiscoverEnvelope =
            decode(self.http.post(&url).json(&body).send().await?).await?;
        Ok(envelope.agents)
    }

    /// Relays a free-form query to the agent behind `agent_did`.
    pub async fn query_agent(
        &self,
        agent_did: &str,
        query: &Value,
    ) -> Result<AgentReply, ClientError> {
        let url = self.endpoint("/orchestrate/query");
        let body = json!({ "agentDid": agent_did, "query": query });
        decode(self.http.post(&url).json(&body).send().await?).await
    }

    /// Sends a negotiation proposal; the agent's answer passes through
    /// unmodified.
    pub async fn propose(&self, agent_did: &str, proposal: &Value) -> Result<Value, ClientError> {
        let url = self.endpoint("/orchestrate/propose");
        let body = json!({ "agentDid": agent_did, "proposal": proposal });
        decode(self.http.post(&url).json(&body).send().await?).await
    }

    /// Finalizes an accepted proposal.
    pub async fn commit(
        &self,
        agent_did: &str,
        proposal_id: &str,
        payment_proof: Option<&str>,
    ) -> Result<Value, ClientError> {
        let url = self.endpoint("/orchestrate/commit");
        let body = json!({
            "agentDid": agent_did,
            "proposalId": proposal_id,
            "paymentProof": payment_proof,
        });
        decode(self.http.post(&url).json(&body).send().await?).await
    }

    /// Cancels a commitment.
    pub async fn cancel(
        &self,
        agent_did: &str,
        commitment_id: &str,
        reason: Option<&str>,
        refund_requested: bool,
    ) -> Result<Value, ClientError> {
        let url = self.endpoint("/orchestrate/cancel");
        let body = json!({
            "agentDid": agent_did,
            "commitmentId": commitment_id,
            "reason": reason,
            "refundRequested": refund_requested,
        });
        decode(self.http.post(&url).json(&body).send().await?).await
    }
}

/// Signs a card with a local [`KeyPair`] and returns the signed card,
/// `signature` and `did` attached. The private key never leaves the
/// process.
pub fn sign_card_locally(card: &Value, key: &KeyPair) -> Result<Value, ClientError> {
    if !card.is_object() {
        return Err(ClientError::Card("card must be a JSON object".to_string()));
    }
    let signature = sign_card(card, &key.export_private())?;
    let mut signed = card.clone();
    if let Some(obj) = signed.as_object_mut() {
        obj.insert("signature".to_string(), Value::String(signature));
        obj.entry("did")
            .or_insert_with(|| Value::String(key.did()));
    }
    Ok(signed)
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    if response.status().is_success() {
        return Ok(response.json().await?);
    }
    Err(api_error(response).await)
}

/// Extracts the server's `{"error": ...}` description; transport errors
/// while reading the body fall back to a generic message.
async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let message = match response.json::<Value>().await {
        Ok(body) => body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error")
            .to_string(),
        Err(_) => "unspecified error".to_string(),
    };
    ClientError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poros_identity::verify_card;

    #[test]
    fn endpoints_tolerate_a_trailing_slash() {
        let client = PorosClient::new("http://localhost:8000/");
        assert_eq!(client.endpoint("/health"), "http://localhost:8000/health");

        let client = PorosClient::new("http://localhost:8000");
        assert_eq!(client.endpoint("/health"), "http://localhost:8000/health");
    }

    #[test]
    fn only_server_side_failures_are_transient() {
        let transient = ClientError::Api {
            status: 503,
            message: "down".into(),
        };
        assert!(transient.is_transient());

        let conflict = ClientError::Api {
            status: 409,
            message: "already registered".into(),
        };
        assert!(!conflict.is_transient());

        assert!(!ClientError::Card("not an object".into()).is_transient());
    }

    #[test]
    fn local_signing_attaches_signature_and_did() {
        let key = KeyPair::generate();
        let card = json!({
            "name": "Echo",
            "description": "repeats things",
            "url": "http://localhost:9000",
            "skills": [{"id": "echo", "tags": ["echo"]}],
        });

        let signed = sign_card_locally(&card, &key).unwrap();
        assert_eq!(signed["did"], json!(key.did()));
        assert!(verify_card(
            &signed,
            signed["signature"].as_str().unwrap(),
            &key.did(),
        ));
    }

    #[test]
    fn local_signing_keeps_an_existing_did() {
        let key = KeyPair::generate();
        let card = json!({"name": "Echo", "did": "did:poros:ed25519:someoneelse"});

        let signed = sign_card_locally(&card, &key).unwrap();
        assert_eq!(signed["did"], "did:poros:ed25519:someoneelse");
    }

    #[test]
    fn local_signing_rejects_non_objects() {
        let key = KeyPair::generate();
        let err = sign_card_locally(&json!("just a string"), &key).unwrap_err();
        assert!(matches!(err, ClientError::Card(_)));
    }

    #[test]
    fn queries_serialize_camel_case_and_skip_unset() {
        let query = AgentQuery {
            skill_tag: Some("weather".into()),
            active_only: Some(false),
            ..AgentQuery::default()
        };
        let v = serde_json::to_value(&query).unwrap();
        assert_eq!(v["skillTag"], "weather");
        assert_eq!(v["activeOnly"], false);
        assert!(v.get("nameSearch").is_none());
        assert!(v.get("limit").is_none());
    }
}
