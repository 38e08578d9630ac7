//! Game Limits
//!
//! Table capacities and value caps shared by validation, the delta store
//! and resync sizing.

/// Maximum players in a session.
pub const MAX_PLAYERS: u8 = 4;

/// Item ledger capacity per level.
pub const MAX_ITEMS: usize = 127;

/// Monster table capacity per level.
pub const MAX_MONSTERS: usize = 200;

/// Object interaction log capacity per level.
pub const MAX_OBJECTS: usize = 127;

/// One town portal per player.
pub const MAX_PORTALS: usize = MAX_PLAYERS as usize;

/// Quest table capacity.
pub const MAX_QUESTS: usize = 24;

/// Equipment slots on the body.
pub const NUM_BODY_SLOTS: u8 = 7;

/// Cells in the inventory grid.
pub const INVENTORY_CELLS: u8 = 40;

/// Belt slots.
pub const BELT_SLOTS: u8 = 8;

/// First `spell-from` code naming an inventory cell.
pub const SPELL_FROM_INVENTORY_FIRST: u16 = NUM_BODY_SLOTS as u16;

/// Last `spell-from` code naming an inventory cell.
pub const SPELL_FROM_INVENTORY_LAST: u16 = SPELL_FROM_INVENTORY_FIRST + INVENTORY_CELLS as u16 - 1;

/// First `spell-from` code naming a belt slot.
pub const SPELL_FROM_BELT_FIRST: u16 = SPELL_FROM_INVENTORY_LAST + 1;

/// Last `spell-from` code naming a belt slot.
pub const SPELL_FROM_BELT_LAST: u16 = SPELL_FROM_BELT_FIRST + BELT_SLOTS as u16 - 1;

/// Largest stat points spent in one command.
pub const MAX_STAT_DELTA: u16 = 256;

/// Largest absolute stat value.
pub const MAX_STAT_VALUE: u16 = 750;

/// Largest damage (1/64 hit-points) one hit can deal to a player.
pub const MAX_PLAYER_DAMAGE: u32 = 192_000;

/// Highest facing (south-east).
pub const MAX_DIRECTION: u8 = 7;

/// Highest spell source type (invalid).
pub const MAX_SPELL_TYPE: u16 = 4;

/// Highest damage type.
pub const MAX_DAMAGE_TYPE: u8 = 4;

/// Highest death reason.
pub const MAX_DEATH_REASON: u16 = 2;

/// Highest level transition mode.
pub const MAX_TRANSITION: u16 = 7;

/// Level transition mode that enters a set level.
pub const TRANSITION_SET_LEVEL: u16 = 2;

/// Highest base spell level.
pub const MAX_SPELL_LEVEL: u8 = 15;

/// Largest player-info blob in bytes.
pub const MAX_PLAYER_INFO: usize = 2048;

/// Monster enemy byte meaning "no target".
pub const NO_ENEMY: u8 = 0xFF;
