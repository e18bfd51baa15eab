//! # Content Digest
//!
//! Defines [`ContentDigest`] and the SHA-256 digest path used for
//! signature computation and certificate fingerprints.
//!
//! ## Invariant
//!
//! [`sha256_digest()`] accepts only `&CanonicalBytes`, so every digest in
//! the system was computed over bytes that came through the canonical
//! serialization pipeline. There is no way to digest an ad-hoc rendering
//! of a manifest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// A SHA-256 content digest.
///
/// Produced from [`CanonicalBytes`] via [`sha256_digest()`]. Serializes
/// as a lowercase hex string for JSON interoperability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Create a digest from raw bytes.
    ///
    /// Prefer [`sha256_digest()`] for computing digests from canonical
    /// bytes; this constructor exists for deserialization and tests.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32-byte digest value.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a digest from a 64-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let hex = hex.trim().to_lowercase();
        if hex.len() != 64 {
            return Err(format!("digest hex must be 64 chars, got {}", hex.len()));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in bytes.iter_mut().enumerate() {
            let pos = i * 2;
            *chunk = u8::from_str_radix(&hex[pos..pos + 2], 16)
                .map_err(|e| format!("invalid hex at position {pos}: {e}"))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

/// Compute a SHA-256 content digest from canonical bytes.
///
/// The signature engine signs this digest's preimage; verification
/// recomputes it from the embedded canonical form. The `&CanonicalBytes`
/// parameter is what makes "digest of a non-canonical rendering"
/// impossible to express.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    let hash = Sha256::digest(data.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ContentDigest(bytes)
}

/// Compute a SHA-256 hex string from canonical bytes.
///
/// Convenience wrapper around [`sha256_digest()`] for contexts that need
/// the digest as a string (audit records, log fields).
pub fn sha256_hex(data: &CanonicalBytes) -> String {
    sha256_digest(data).to_hex()
}
