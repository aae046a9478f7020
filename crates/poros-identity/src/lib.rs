//! Identity primitives for the Poros registry: canonical JSON, DIDs,
//! Ed25519 keypairs, and AgentCard signing.
//!
//! Agent owners identify themselves with a `did:poros:ed25519:<key>` DID
//! whose final segment is the unpadded base64url encoding of the raw
//! 32-byte public key. Cards are signed over a canonical JSON form
//! (lexicographically sorted keys, no whitespace) with any existing
//! `signature` field removed, so verification is independent of key order,
//! formatting, and signing state.
//!
//! Verification never errors: every malformed input path returns `false`.

use thiserror::Error;

mod canonical;
mod card;
mod did;
mod keys;

pub use canonical::canonical_json;
pub use card::{sign_card, signing_payload, verify_card};
pub use did::{did_for_key, public_key_from_did, DID_PREFIX};
pub use keys::KeyPair;

/// Errors produced by identity operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The DID is missing the Poros prefix, is not valid base64url, or does
    /// not decode to a 32-byte Ed25519 public key.
    #[error("invalid DID: {0}")]
    InvalidDid(String),
    /// The private key export is not valid base64url or has the wrong
    /// length.
    #[error("invalid private key encoding: {0}")]
    KeyFormat(String),
}
