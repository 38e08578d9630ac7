//! Core Primitives
//!
//! Tile coordinates, level ids, slot arenas and digests shared by every
//! other module. Nothing here touches the network.

pub mod hash;
pub mod limits;
pub mod slot;
pub mod tile;

pub use hash::{StateHash, StateHasher};
pub use slot::{Slot, SlotArena};
pub use tile::{LevelId, TilePosition, EMPTY_MARKER};
