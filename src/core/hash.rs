//! Delta Store Digests
//!
//! Deterministic SHA-256 digests over canonical export bytes, used to
//! confirm that two peers hold identical delta stores after a resync.

use sha2::{Digest, Sha256};

/// Digest output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for delta state.
///
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for a per-level delta store.
    pub fn for_delta_level() -> Self {
        Self::new(b"DUNGEON_SYNC_LEVEL_V1")
    }

    /// Create hasher for the session-global junk table.
    pub fn for_junk() -> Self {
        Self::new(b"DUNGEON_SYNC_JUNK_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = StateHasher::new(domain);
    hasher.update_bytes(data);
    hasher.finalize()
}

/// Short hex prefix of a digest for log lines.
pub fn short_hex(hash: &StateHash) -> String {
    hex::encode(&hash[..8])
}

// =============================================================================
// TESTS
// =============================================================================
