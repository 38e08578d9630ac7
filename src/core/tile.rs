//! Tile Coordinates and Level Identifiers
//!
//! Dungeon tiles are addressed by a pair of `u8` coordinates. Every valid
//! coordinate is strictly below [`DUNGEON_WIDTH`]/[`DUNGEON_HEIGHT`], which
//! keeps `0xFF` free to act as the empty-slot marker on the wire.

use serde::{Deserialize, Serialize};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Dungeon width in tiles.
pub const DUNGEON_WIDTH: u8 = 112;

/// Dungeon height in tiles.
pub const DUNGEON_HEIGHT: u8 = 112;

/// Reserved byte marking an empty slot in exported tables.
pub const EMPTY_MARKER: u8 = 0xFF;

/// Number of regular dungeon levels (level 0 is town).
pub const NUM_LEVELS: u8 = 25;

/// Highest set (quest) level id. Set levels are numbered `1..=MAX_SET_LEVEL`.
pub const MAX_SET_LEVEL: u8 = 10;

/// Highest multiplayer level id. Set levels are mapped above regular levels.
pub const MAX_MULTIPLAYER_LEVEL: u8 = NUM_LEVELS + MAX_SET_LEVEL;

/// Town level id.
pub const TOWN_LEVEL: LevelId = LevelId(0);

// =============================================================================
// TILE POSITION
// =============================================================================

/// A tile coordinate inside the dungeon grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TilePosition {
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
}

impl TilePosition {
    /// Create a new tile position.
    #[inline]
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Check if the tile lies inside the dungeon grid.
    #[inline]
    pub fn in_dungeon_bounds(self) -> bool {
        self.x < DUNGEON_WIDTH && self.y < DUNGEON_HEIGHT
    }
}

impl std::fmt::Display for TilePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// LEVEL IDS
// =============================================================================

/// Multiplayer level identifier.
///
/// Regular levels keep their depth (`0..NUM_LEVELS`); set levels are shifted
/// up by [`NUM_LEVELS`] so both kinds share one key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LevelId(pub u8);

impl LevelId {
    /// Map a (level, is_set_level) pair to a multiplayer id.
    ///
    /// Returns `None` when the pair does not name an existing level.
    pub fn for_multiplayer(level: u8, is_set_level: bool) -> Option<Self> {
        if is_set_level {
            (1..=MAX_SET_LEVEL).contains(&level).then(|| Self(level + NUM_LEVELS))
        } else {
            (level < NUM_LEVELS).then_some(Self(level))
        }
    }

    /// Check if the raw id is a valid multiplayer level.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 <= MAX_MULTIPLAYER_LEVEL
    }

    /// Check if this id names a set level.
    #[inline]
    pub fn is_set_level(self) -> bool {
        self.0 >= NUM_LEVELS
    }

    /// Level number within its own kind (depth, or set level number).
    #[inline]
    pub fn local_number(self) -> u8 {
        if self.is_set_level() {
            self.0 - NUM_LEVELS
        } else {
            self.0
        }
    }

    /// Check if this is the town.
    #[inline]
    pub fn is_town(self) -> bool {
        self == TOWN_LEVEL
    }
}

impl std::fmt::Display for LevelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_set_level() {
            write!(f, "set-{}", self.local_number())
        } else {
            write!(f, "L{}", self.0)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
