//! Delta Store
//!
//! Per-level records of how the world diverged from generation, plus the
//! session-global junk table. Stores are exported into compact chunks for
//! late-joining peers and imported entry by entry, resetting malformed
//! entries instead of failing the whole import.

pub mod export;
pub mod junk;
pub mod level;
pub mod registry;

use thiserror::Error;

use crate::protocol::CodecError;

pub use export::{pack_chunk, unpack_chunk, FLAG_COMPRESSED, FLAG_RAW, MAX_LEVEL_EXPORT, STAGING_CAPACITY};
pub use junk::{Junk, PortalDelta, QuestDelta};
pub use level::{
    DeltaLevel, ItemEvent, ItemOutcome, ItemState, LedgerEntry, MonsterDelta, MonsterEvent, ObjectAction,
    RestoreEvent, SpawnedMonster,
};
pub use registry::DeltaRegistry;

/// Delta store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    /// Export data ended early or carried an unreadable field.
    #[error("Malformed delta data: {0}")]
    Codec(#[from] CodecError),

    /// Bytes left over after a complete export.
    #[error("{extra} trailing bytes after delta data")]
    TrailingBytes {
        /// Unread byte count.
        extra: usize,
    },

    /// Object log longer than the object table.
    #[error("Object log holds {count} entries (max {max})")]
    TooManyObjects {
        /// Declared count.
        count: usize,
        /// Table capacity.
        max: usize,
    },

    /// Interaction at a new tile once the object log is full.
    #[error("Object log full at {max} entries")]
    ObjectLogFull {
        /// Table capacity.
        max: usize,
    },

    /// Spawn registry longer than the monster table.
    #[error("Spawn registry holds {count} entries (max {max})")]
    TooManySpawned {
        /// Declared count.
        count: usize,
        /// Table capacity.
        max: usize,
    },

    /// Level id outside the multiplayer range.
    #[error("Invalid level id {0}")]
    InvalidLevel(u8),

    /// Drop of an item the ledger still shows on the floor.
    #[error("Duplicate floor item seed {seed:#x} index {index} create_info {create_info:#06x}")]
    DuplicateFloorItem {
        /// Item seed.
        seed: u32,
        /// Catalog index.
        index: u16,
        /// Creation info.
        create_info: u16,
    },

    /// Chunk without a compression flag byte.
    #[error("Empty delta chunk")]
    EmptyChunk,

    /// Compression flag other than raw or compressed.
    #[error("Unknown compression flag {0}")]
    UnknownCompressionFlag(u8),

    /// zstd rejected the payload.
    #[error("Decompression failed for {payload_size}-byte payload")]
    Decompression {
        /// Compressed payload length.
        payload_size: usize,
    },
}
