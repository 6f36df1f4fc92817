//! Generation and comparison of credential strings.
//!
//! Keys, secrets and verifiers are drawn from the OS random source and encoded
//! as URL-safe base64 without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{InfrastructureError, StoreResult};

/// Generate `bytes` random bytes and encode them.
///
/// # Errors
/// Returns [`InfrastructureError::Entropy`] if the OS random source fails. There is
/// no fallback generator.
pub fn generate(bytes: usize) -> StoreResult<String> {
    let mut buf = vec![0u8; bytes];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| {
        tracing::error!(error = %e, "OS random source failed, refusing to issue credentials");
        InfrastructureError::Entropy(e)
    })?;
    Ok(URL_SAFE_NO_PAD.encode(&buf))
}

/// Compare a supplied verifier against the stored one.
///
/// Both sides are hashed first so the comparison time does not depend on how
/// long a common prefix the caller guessed.
#[must_use]
pub fn verifier_matches(supplied: &str, stored: &str) -> bool {
    Sha256::digest(supplied.as_bytes()) == Sha256::digest(stored.as_bytes())
}

/// Key and secret pair for a new token.
pub struct KeyPair {
    pub key: String,
    pub secret: String,
}

impl KeyPair {
    pub fn generate(bytes: usize) -> StoreResult<Self> {
        Ok(Self {
            key: generate(bytes)?,
            secret: generate(bytes)?,
        })
    }
}
