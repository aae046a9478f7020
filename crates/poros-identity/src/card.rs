//! Card signing and fail-closed verification.

use crate::canonical::canonical_json;
use crate::did::public_key_from_did;
use crate::{IdentityError, KeyPair};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier};
use serde_json::Value;

/// The exact bytes a card signature covers: the canonical form of the card
/// with any top-level `signature` field removed. Signing and verifying a
/// card therefore commute with attaching the signature to it.
pub fn signing_payload(card: &Value) -> Vec<u8> {
    match card {
        Value::Object(map) => {
            let mut unsigned = map.clone();
            unsigned.remove("signature");
            canonical_json(&Value::Object(unsigned))
        }
        other => canonical_json(other),
    }
}

/// Signs a card with an exported private key, returning the signature as
/// standard (padded) base64.
///
/// # Errors
///
/// Returns [`IdentityError::KeyFormat`] when the key export cannot be
/// parsed.
pub fn sign_card(card: &Value, private_key: &str) -> Result<String, IdentityError> {
    let pair = KeyPair::import_private(private_key)?;
    let signature = pair.sign(&signing_payload(card));
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// Verifies a card signature against the DID's public key.
///
/// Fail closed: a malformed DID, bad base64, wrong signature length, or a
/// failed curve check all return `false`. This function never panics and
/// never errors.
pub fn verify_card(card: &Value, signature_b64: &str, did: &str) -> bool {
    let key = match public_key_from_did(did) {
        Ok(key) => key,
        Err(err) => {
            tracing::debug!(%did, error = %err, "card verification rejected: unparseable DID");
            return false;
        }
    };
    let raw = match STANDARD.decode(signature_b64.trim()) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(error = %err, "card verification rejected: signature is not base64");
            return false;
        }
    };
    let bytes: [u8; 64] = match raw.as_slice().try_into() {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::debug!(len = raw.len(), "card verification rejected: wrong signature length");
            return false;
        }
    };
    let signature = Signature::from_bytes(&bytes);
    key.verify(&signing_payload(card), &signature).is_ok()
}
