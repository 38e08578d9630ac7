//! # Dungeon Sync
//!
//! Lockstep state synchronization for peer-to-peer dungeon sessions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       DUNGEON SYNC                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── tile.rs     - Tile positions and level ids              │
//! │  ├── slot.rs     - Fixed-capacity slot arena                 │
//! │  ├── limits.rs   - Table sizes and sentinels                 │
//! │  └── hash.rs     - Digests for delta stores                  │
//! │                                                              │
//! │  catalog/        - Read-only game tables                     │
//! │  protocol/       - Command tags, records, wire codec         │
//! │  validate/       - Field checks on inbound records           │
//! │                                                              │
//! │  delta/          - World divergence (deterministic)          │
//! │  ├── level.rs    - Per-level item/object/monster store       │
//! │  ├── junk.rs     - Portals and quests                        │
//! │  ├── export.rs   - Compact export and entry-wise import      │
//! │  └── registry.rs - Store per level plus junk                 │
//! │                                                              │
//! │  network/        - Session plumbing                          │
//! │  ├── dispatcher.rs - Tag-indexed handler table               │
//! │  ├── resync.rs   - Late-join chunk transfer                  │
//! │  ├── aggregator.rs - Outbound frames                         │
//! │  └── session.rs  - One peer's sync session                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Delta stores iterate in a fixed order (`BTreeMap`, slot order), so two
//! peers holding the same facts export identical bytes and identical
//! digests. Nothing in `delta/` reads the clock.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod core;
pub mod delta;
pub mod network;
pub mod protocol;
pub mod validate;

// Re-export commonly used types
pub use catalog::{CatalogProvider, StaticCatalog};
pub use crate::core::tile::{LevelId, TilePosition};
pub use delta::{DeltaError, DeltaLevel, DeltaRegistry};
pub use network::{LoopbackHub, ResyncError, SyncConfig, SyncSession};
pub use protocol::{decode, encode, CodecError, Command, CommandTag, Destination, PeerId};
pub use validate::{validate, Rejection};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
