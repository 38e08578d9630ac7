//! Sync Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum players in a game.
    pub max_players: u8,
    /// Hard ceiling for one outbound frame (bytes).
    pub max_frame_bytes: usize,
    /// Largest delta or player-info chunk body (bytes).
    pub max_chunk_body: usize,
    /// Deadline for a whole resync (ms).
    pub resync_timeout_ms: u64,
    /// How long to wait for the authority's turns before taking chunks (ms).
    pub authority_wait_ms: u64,
    /// Sleep between resync polls (ms).
    pub poll_interval_ms: u64,
    /// zstd level for delta chunks.
    pub compression_level: i32,
    /// Compress delta chunks when it helps.
    pub compress_chunks: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            max_frame_bytes: 32000,
            max_chunk_body: 1024,
            resync_timeout_ms: 60_000,
            authority_wait_ms: 2_000,
            poll_interval_ms: 10,
            compression_level: 3,
            compress_chunks: true,
        }
    }
}

impl SyncConfig {
    /// Parse from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Resync deadline.
    pub fn resync_timeout(&self) -> Duration {
        Duration::from_millis(self.resync_timeout_ms)
    }

    /// Authority wait window.
    pub fn authority_wait(&self) -> Duration {
        Duration::from_millis(self.authority_wait_ms)
    }

    /// Poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// zstd level to pack chunks with, if compression is on.
    pub fn chunk_compression(&self) -> Option<i32> {
        self.compress_chunks.then_some(self.compression_level)
    }
}
