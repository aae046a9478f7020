//! Identity API handlers: DID generation and AgentCard signing.
//!
//! These endpoints exist for agent developers: mint a keypair, sign a card
//! before registration, and check a signature. All of the cryptography is
//! local and fast, so no handler touches the database or spawns blocking
//! work.

use crate::api::ApiError;
use axum::extract::Json;
use poros_identity::{sign_card, verify_card, KeyPair};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response body for DID generation.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateDidResponse {
    /// The new identity, `did:poros:ed25519:<key>`.
    pub did: String,
    /// Unpadded base64url seed. Returned once and never stored server-side;
    /// the owner needs it to sign cards.
    #[serde(rename = "privateKey")]
    pub private_key: String,
    /// Unpadded base64url public key, the same bytes embedded in the DID.
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Request body for card signing.
#[derive(Debug, Deserialize)]
pub struct SignCardRequest {
    /// The card to sign, as submitted JSON.
    #[serde(rename = "agentCard")]
    pub agent_card: Value,
    /// Private key export from `generate-did`.
    #[serde(rename = "privateKey")]
    pub private_key: String,
}

/// Response body for card signing.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignCardResponse {
    /// Standard base64 Ed25519 signature over the canonical card.
    pub signature: String,
    /// The submitted card with `signature` attached, and `did` attached
    /// when the card did not already carry one.
    #[serde(rename = "signedAgentCard")]
    pub signed_agent_card: Value,
}

/// Request body for signature verification.
#[derive(Debug, Deserialize)]
pub struct VerifyCardRequest {
    /// The card to verify.
    #[serde(rename = "agentCard")]
    pub agent_card: Value,
    /// Standard base64 signature.
    pub signature: String,
    /// The signer's DID.
    pub did: String,
}

/// Response body for signature verification.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyCardResponse {
    pub valid: bool,
    pub message: String,
}

/// Handler for `POST /api/identity/generate-did`.
pub async fn generate_did_handler() -> Json<GenerateDidResponse> {
    let key = KeyPair::generate();
    Json(GenerateDidResponse {
        did: key.did(),
        private_key: key.export_private(),
        public_key: key.public_key_b64(),
    })
}

/// Handler for `POST /api/identity/sign-agent-card`.
///
/// Signs the card over its canonical form (any existing `signature` field
/// is ignored) and returns both the bare signature and a card ready for
/// registration.
pub async fn sign_agent_card_handler(
    Json(payload): Json<SignCardRequest>,
) -> Result<Json<SignCardResponse>, ApiError> {
    let key = KeyPair::import_private(&payload.private_key)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if !payload.agent_card.is_object() {
        return Err(ApiError::BadRequest(
            "agentCard must be a JSON object".to_string(),
        ));
    }
    let signature = sign_card(&payload.agent_card, &payload.private_key)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut signed = payload.agent_card;
    if let Some(obj) = signed.as_object_mut() {
        obj.insert("signature".to_string(), Value::String(signature.clone()));
        obj.entry("did")
            .or_insert_with(|| Value::String(key.did()));
    }

    Ok(Json(SignCardResponse {
        signature,
        signed_agent_card: signed,
    }))
}

/// Handler for `POST /api/identity/verify-agent-card`.
///
/// Always answers 200; the `valid` boolean carries the outcome.
pub async fn verify_agent_card_handler(
    Json(payload): Json<VerifyCardRequest>,
) -> Json<VerifyCardResponse> {
    let valid = verify_card(&payload.agent_card, &payload.signature, &payload.did);
    let message = if valid {
        "Signature is valid. AgentCard is authentic and unmodified."
    } else {
        "Signature verification failed. Either the signature is invalid or the AgentCard has been tampered with."
    };
    Json(VerifyCardResponse {
        valid,
        message: message.to_string(),
    })
}
