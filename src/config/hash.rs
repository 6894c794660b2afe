//! Configuration hashing for change detection.
//!
//! A server whose config hashes to the same value as the last applied one
//! needs no actions at all.

use sha2::{Digest, Sha256};

use super::spec::{Manifest, ServerConfig};

/// Hasher for configs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hashes a whole manifest.
    #[must_use]
    pub fn hash_manifest(&self, manifest: &Manifest) -> String {
        Self::hash_json(&serde_json::to_value(manifest).unwrap_or_default())
    }

    /// Hashes one server config.
    #[must_use]
    pub fn hash_server(&self, server: &ServerConfig) -> String {
        Self::hash_json(&serde_json::to_value(server).unwrap_or_default())
    }

    /// Returns the first 8 characters of a hash.
    #[must_use]
    pub fn short_hash<'a>(&self, hash: &'a str) -> &'a str {
        hash.get(..8).unwrap_or(hash)
    }

    fn hash_json(value: &serde_json::Value) -> String {
        // fields serialize in declaration order and sets are sorted
        let mut hasher = Sha256::new();
        hasher.update(value.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}
