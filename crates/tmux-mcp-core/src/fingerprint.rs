//! Content fingerprints used as optimistic-concurrency tokens.
//!
//! A fingerprint is the first 8 hex characters of the SHA-256 digest of a
//! pane capture. Callers persist it between a capture and a later mutating
//! call, so the derivation must stay stable across releases and restarts.
//!
//! At 32 bits a collision between two different captures is possible. The
//! fingerprint is a safety hint against acting on stale state, not a
//! cryptographic guarantee.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 8;

/// Short digest of a session's captured text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the exact bytes of a capture. No normalization is applied.
    pub fn of(content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        let mut hex = format!("{digest:x}");
        hex.truncate(FINGERPRINT_LEN);
        Self(hex)
    }

    /// Wrap a fingerprint presented by a caller.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// The textual form handed to callers.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty (callers sometimes omit it).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(token: &str) -> Self {
        Self::from_token(token)
    }
}

impl From<String> for Fingerprint {
    fn from(token: String) -> Self {
        Self::from_token(token)
    }
}

/// Fingerprint captured text.
pub fn fingerprint(content: &[u8]) -> Fingerprint {
    Fingerprint::of(content)
}
