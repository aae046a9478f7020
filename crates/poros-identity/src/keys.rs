//! Ed25519 keypair generation, export, and import.

use crate::did::did_for_key;
use crate::IdentityError;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

/// An Ed25519 identity keypair.
///
/// The private half exports as unpadded base64url of the 32-byte seed, the
/// same alphabet as the DID key segment, so keys survive copy/paste through
/// JSON and env vars without padding surprises.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generates a fresh keypair from OS entropy.
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self {
            signing: SigningKey::generate(&mut rng),
        }
    }

    /// Builds a keypair from a raw 32-byte seed. Deterministic; used by
    /// tests and by owners restoring an exported key.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Restores a keypair from `export_private` output.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::KeyFormat`] when the input is not base64url
    /// or does not decode to 32 bytes.
    pub fn import_private(encoded: &str) -> Result<Self, IdentityError> {
        let mut padded = encoded.trim().to_string();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        let raw = URL_SAFE
            .decode(padded)
            .map_err(|e| IdentityError::KeyFormat(format!("not base64url: {e}")))?;
        let seed: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::KeyFormat(format!("expected 32-byte seed, got {}", raw.len())))?;
        Ok(Self::from_seed(seed))
    }

    /// Exports the private key as unpadded base64url of the seed.
    pub fn export_private(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.signing.to_bytes())
    }

    /// The public half.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// The public key as unpadded base64url, i.e. the DID key segment.
    pub fn public_key_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.verifying_key().as_bytes())
    }

    /// The DID for this keypair.
    pub fn did(&self) -> String {
        did_for_key(&self.verifying_key())
    }

    /// Signs an arbitrary byte payload.
    pub fn sign(&self, payload: &[u8]) -> Signature {
        self.signing.sign(payload)
    }
}

// Keep seeds out of logs; the DID is enough to identify a pair.
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("did", &self.did()).finish_non_exhaustive()
    }
}
