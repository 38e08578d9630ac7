//! Game-Domain Catalogs
//!
//! Read-only lookups the validator and delta import use to decide whether
//! an id names something that exists. The live game supplies its own
//! provider; [`StaticCatalog`] is a serde-loadable table set.

pub mod items;
pub mod quests;
pub mod tables;

use serde::{Deserialize, Serialize};

use crate::core::tile::LevelId;

pub use items::{
    check_item_origin, is_creation_combo_valid, CreationFlags, ItemInconsistency, ItemOrigin,
};
pub use quests::{check_quest_record, QuestInconsistency, QuestState};
pub use tables::StaticCatalog;

/// Dungeon tileset of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LevelType {
    /// Tristram.
    Town = 0,
    /// Levels 1-4.
    Cathedral = 1,
    /// Levels 5-8.
    Catacombs = 2,
    /// Levels 9-12.
    Caves = 3,
    /// Levels 13-16.
    Hell = 4,
    /// Hive expansion levels.
    Nest = 5,
    /// Crypt expansion levels.
    Crypt = 6,
}

impl LevelType {
    /// Decode a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Town),
            1 => Some(Self::Cathedral),
            2 => Some(Self::Catacombs),
            3 => Some(Self::Caves),
            4 => Some(Self::Hell),
            5 => Some(Self::Nest),
            6 => Some(Self::Crypt),
            _ => None,
        }
    }
}

/// Broad item category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// Gold pile. Skips creation-flag checks.
    Gold,
    /// Weapons, armor, jewelry.
    Equipment,
    /// Potions, scrolls, oils.
    Consumable,
    /// Spell books.
    Book,
    /// Quest items.
    Quest,
}

/// Item catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEntry {
    /// Catalog index.
    pub index: u16,
    /// Display name.
    pub name: String,
    /// Category.
    pub kind: ItemKind,
    /// Whether the item can exist in this game configuration.
    pub available: bool,
    /// Town vendor creation flags allowed to sell this item.
    pub vendors: u16,
    /// Whether monsters and containers may drop it.
    pub droppable: bool,
    /// Lowest creation level for a dungeon drop.
    pub min_drop_level: u8,
}

/// Spell catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellEntry {
    /// Spell id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Whether it may be cast in town.
    pub town_allowed: bool,
}

/// Quest catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestEntry {
    /// Quest id.
    pub id: u8,
    /// Display name.
    pub name: String,
    /// Not synchronized in multiplayer.
    pub single_player_only: bool,
    /// May use the hive tease/active states.
    pub hive_progress: bool,
    /// May use the hive done state.
    pub hive_done: bool,
}

/// Lookups consumed by validation and delta import.
pub trait CatalogProvider {
    /// Item entry by catalog index.
    fn item(&self, index: u16) -> Option<&ItemEntry>;

    /// Spell entry by id.
    fn spell(&self, id: u16) -> Option<&SpellEntry>;

    /// Quest entry by id.
    fn quest(&self, id: u8) -> Option<&QuestEntry>;

    /// Tileset of a multiplayer level, `None` if the level does not exist.
    fn level_type(&self, level: LevelId) -> Option<LevelType>;

    /// Number of entries in the speech table.
    fn speech_count(&self) -> u16;

    /// Number of town NPCs.
    fn towner_count(&self) -> u16;

    /// Number of monster types.
    fn monster_type_count(&self) -> u16;

    /// Quest ids synchronized in multiplayer, ascending.
    fn eligible_quests(&self) -> Vec<u8>;

    /// Check if an item index exists and is enabled.
    fn is_item_available(&self, index: u16) -> bool {
        self.item(index).is_some_and(|entry| entry.available)
    }
}
