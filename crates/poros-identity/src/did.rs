//! DID rendering and parsing.

use crate::IdentityError;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::VerifyingKey;

/// Method prefix for every Poros DID.
pub const DID_PREFIX: &str = "did:poros:ed25519:";

/// Renders the DID for a public key:
/// `did:poros:ed25519:<base64url(key), unpadded>`.
pub fn did_for_key(key: &VerifyingKey) -> String {
    format!("{DID_PREFIX}{}", URL_SAFE_NO_PAD.encode(key.as_bytes()))
}

/// Parses a DID back to its public key.
///
/// The key segment is everything after the last `:`. Padding is restored
/// before decoding, so both padded and unpadded encodings are accepted.
///
/// # Errors
///
/// Returns [`IdentityError::InvalidDid`] when the prefix is missing, the
/// segment is not base64url, or the decoded key is not a valid 32-byte
/// Ed25519 public key.
pub fn public_key_from_did(did: &str) -> Result<VerifyingKey, IdentityError> {
    if !did.starts_with(DID_PREFIX) {
        return Err(IdentityError::InvalidDid(format!(
            "expected prefix {DID_PREFIX:?}"
        )));
    }
    let encoded = did.rsplit(':').next().unwrap_or_default();
    let mut padded = encoded.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    let raw = URL_SAFE
        .decode(padded)
        .map_err(|e| IdentityError::InvalidDid(format!("key segment is not base64url: {e}")))?;
    let bytes: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| IdentityError::InvalidDid(format!("expected 32-byte key, got {}", raw.len())))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| IdentityError::InvalidDid("not a valid ed25519 public key".to_string()))
}
