//! Content hashing of state snapshots.
//!
//! A node's identity is the BLAKE3 digest of a domain-separated canonical
//! serialization of its snapshot. The full 32-byte digest is what the ledger
//! is keyed by; the 8-hex-character short form is for display only.

use crate::state::StateSnapshot;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Prefix mixed into every snapshot digest.
const SNAPSHOT_DOMAIN: &[u8] = b"wargame:snapshot:v1\0";

/// Length of the display form of a hash.
pub const SHORT_HASH_LEN: usize = 8;

/// Length of the full hex form of a hash.
pub const FULL_HASH_LEN: usize = 64;

/// Errors from parsing a hash typed by a user or read from disk.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("Expected a full 64-character hash, got {found} characters")]
    WrongLength { found: usize },

    #[error("Hash contains non-hex characters: {0}")]
    NotHex(String),
}

/// Full digest identifying a ledger node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Display form: first [`SHORT_HASH_LEN`] hex characters.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_HASH_LEN);
        hex
    }

    /// Parse a full hex digest.
    ///
    /// Only the complete digest is accepted, so a truncated prefix can never
    /// address a node.
    pub fn from_hex(input: &str) -> Result<Self, HashError> {
        let input = input.trim();
        if input.len() != FULL_HASH_LEN {
            return Err(HashError::WrongLength {
                found: input.chars().count(),
            });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(input, &mut bytes)
            .map_err(|_| HashError::NotHex(input.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        ContentHash::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Bytes the snapshot digest is computed over.
pub fn canonical_bytes(snapshot: &StateSnapshot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(snapshot)
}

/// Digest of a snapshot. Pure: equal snapshots always hash equal.
pub fn hash_snapshot(snapshot: &StateSnapshot) -> Result<ContentHash, serde_json::Error> {
    let bytes = canonical_bytes(snapshot)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(SNAPSHOT_DOMAIN);
    hasher.update(&bytes);
    Ok(ContentHash(*hasher.finalize().as_bytes()))
}
