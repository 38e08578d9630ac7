//! Static Catalog Tables
//!
//! A serde-loadable catalog provider. `Default` carries a built-in table
//! set covering the base game's level layout and a representative slice of
//! items, spells and quests.

use serde::{Deserialize, Serialize};

use super::items::CreationFlags;
use super::{CatalogProvider, ItemEntry, ItemKind, LevelType, QuestEntry, SpellEntry};
use crate::core::tile::{LevelId, MAX_SET_LEVEL, NUM_LEVELS};

/// Catalog backed by in-memory tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCatalog {
    /// Item entries.
    pub items: Vec<ItemEntry>,
    /// Spell entries.
    pub spells: Vec<SpellEntry>,
    /// Quest entries.
    pub quests: Vec<QuestEntry>,
    /// Tileset per regular level, indexed by depth.
    pub levels: Vec<LevelType>,
    /// Tileset per set level, indexed by `set level - 1`.
    pub set_levels: Vec<Option<LevelType>>,
    /// Speech table size.
    pub speech_count: u16,
    /// Town NPC count.
    pub towner_count: u16,
    /// Monster type count.
    pub monster_type_count: u16,
}

impl StaticCatalog {
    /// Load a catalog from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn item(index: u16, name: &str, kind: ItemKind, vendors: u16, min_drop_level: u8) -> ItemEntry {
    ItemEntry {
        index,
        name: name.to_string(),
        kind,
        available: true,
        vendors,
        droppable: kind != ItemKind::Quest,
        min_drop_level,
    }
}

fn spell(id: u16, name: &str, town_allowed: bool) -> SpellEntry {
    SpellEntry {
        id,
        name: name.to_string(),
        town_allowed,
    }
}

fn quest(id: u8, name: &str, single_player_only: bool) -> QuestEntry {
    QuestEntry {
        id,
        name: name.to_string(),
        single_player_only,
        hive_progress: false,
        hive_done: false,
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        use CreationFlags as Cf;

        let mut items = vec![
            item(0, "Gold", ItemKind::Gold, 0, 0),
            item(1, "Short Sword", ItemKind::Equipment, Cf::SMITH, 1),
            item(2, "Buckler", ItemKind::Equipment, Cf::SMITH, 1),
            item(3, "Club", ItemKind::Equipment, Cf::SMITH | Cf::SMITH_PREMIUM, 1),
            item(4, "Short Bow", ItemKind::Equipment, Cf::SMITH, 1),
            item(5, "Potion of Healing", ItemKind::Consumable, Cf::HEALER, 1),
            item(6, "Potion of Mana", ItemKind::Consumable, Cf::WITCH, 1),
            item(7, "Scroll of Identify", ItemKind::Consumable, Cf::WITCH, 1),
            item(8, "Book of Firebolt", ItemKind::Book, Cf::WITCH, 1),
            item(9, "Oil of Sharpness", ItemKind::Consumable, Cf::BOY, 5),
            item(10, "Long Sword", ItemKind::Equipment, Cf::SMITH | Cf::SMITH_PREMIUM | Cf::BOY, 4),
            item(11, "Great Helm", ItemKind::Equipment, Cf::SMITH_PREMIUM, 10),
            item(12, "Staff of Lazarus", ItemKind::Quest, 0, 0),
            item(13, "Ring", ItemKind::Equipment, Cf::BOY | Cf::WITCH, 5),
            item(14, "Full Plate Mail", ItemKind::Equipment, Cf::SMITH_PREMIUM, 25),
        ];
        let mut arena_potion = item(15, "Arena Potion", ItemKind::Consumable, 0, 1);
        arena_potion.available = false;
        items.push(arena_potion);

        let spells = vec![
            spell(1, "Firebolt", false),
            spell(2, "Healing", true),
            spell(3, "Lightning", false),
            spell(4, "Flash", false),
            spell(5, "Identify", true),
            spell(6, "Fire Wall", false),
            spell(7, "Town Portal", true),
            spell(8, "Stone Curse", false),
            spell(9, "Infravision", true),
            spell(10, "Phasing", false),
            spell(11, "Mana Shield", false),
            spell(12, "Fireball", false),
            spell(13, "Guardian", false),
            spell(14, "Chain Lightning", false),
            spell(15, "Resurrect", true),
            spell(16, "Heal Other", true),
            spell(17, "Telekinesis", true),
            spell(18, "Golem", false),
        ];

        let mut quests = vec![
            quest(0, "The Magic Rock", false),
            quest(1, "Black Mushroom", true),
            quest(2, "Gharbad the Weak", true),
            quest(3, "Zhar the Mad", true),
            quest(4, "Halls of the Blind", false),
            quest(5, "Valor", false),
            quest(6, "Warlord of Blood", false),
            quest(7, "The Butcher", false),
            quest(8, "Lachdanan", false),
            quest(9, "Anvil of Fury", false),
            quest(10, "Archbishop Lazarus", false),
            quest(11, "Poisoned Water Supply", false),
            quest(12, "Chamber of Bone", false),
            quest(13, "Diablo", false),
            quest(14, "The Betrayer", false),
            quest(15, "The Skeleton King", false),
            quest(16, "Farmer's Orchard", false),
            quest(17, "Little Girl", false),
        ];
        quests[16].hive_done = true;
        quests[17].hive_progress = true;
        quests[17].hive_done = true;

        let levels = (0..NUM_LEVELS)
            .map(|depth| match depth {
                0 => LevelType::Town,
                1..=4 => LevelType::Cathedral,
                5..=8 => LevelType::Catacombs,
                9..=12 => LevelType::Caves,
                13..=16 => LevelType::Hell,
                17..=20 => LevelType::Nest,
                _ => LevelType::Crypt,
            })
            .collect();

        let mut set_levels = vec![None; MAX_SET_LEVEL as usize];
        set_levels[0] = Some(LevelType::Cathedral); // Skeleton King's lair
        set_levels[1] = Some(LevelType::Catacombs); // Chamber of Bone
        set_levels[2] = Some(LevelType::Cathedral); // Maze
        set_levels[3] = Some(LevelType::Caves); // Poisoned Water Supply
        set_levels[4] = Some(LevelType::Cathedral); // Archbishop Lazarus' lair

        Self {
            items,
            spells,
            quests,
            levels,
            set_levels,
            speech_count: 270,
            towner_count: 13,
            monster_type_count: 112,
        }
    }
}

impl CatalogProvider for StaticCatalog {
    fn item(&self, index: u16) -> Option<&ItemEntry> {
        self.items.iter().find(|e| e.index == index)
    }

    fn spell(&self, id: u16) -> Option<&SpellEntry> {
        self.spells.iter().find(|e| e.id == id)
    }

    fn quest(&self, id: u8) -> Option<&QuestEntry> {
        self.quests.iter().find(|e| e.id == id)
    }

    fn level_type(&self, level: LevelId) -> Option<LevelType> {
        if !level.is_valid() {
            return None;
        }
        if level.is_set_level() {
            let number = level.local_number();
            if number == 0 {
                return None;
            }
            self.set_levels.get(number as usize - 1).copied().flatten()
        } else {
            self.levels.get(level.0 as usize).copied()
        }
    }

    fn speech_count(&self) -> u16 {
        self.speech_count
    }

    fn towner_count(&self) -> u16 {
        self.towner_count
    }

    fn monster_type_count(&self) -> u16 {
        self.monster_type_count
    }

    fn eligible_quests(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self
            .quests
            .iter()
            .filter(|q| !q.single_player_only)
            .map(|q| q.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lookups() {
        let catalog = StaticCatalog::default();
        assert_eq!(catalog.item(7).unwrap().name, "Scroll of Identify");
        assert!(catalog.is_item_available(7));
        assert!(!catalog.is_item_available(15));
        assert!(!catalog.is_item_available(999));
        assert!(catalog.spell(7).unwrap().town_allowed);
        assert!(catalog.spell(0).is_none());
    }

    #[test]
    fn test_level_types() {
        let catalog = StaticCatalog::default();
        assert_eq!(catalog.level_type(LevelId(0)), Some(LevelType::Town));
        assert_eq!(catalog.level_type(LevelId(3)), Some(LevelType::Cathedral));
        assert_eq!(catalog.level_type(LevelId(24)), Some(LevelType::Crypt));
        assert_eq!(catalog.level_type(LevelId(NUM_LEVELS + 1)), Some(LevelType::Cathedral));
        assert_eq!(catalog.level_type(LevelId(NUM_LEVELS + 9)), None);
        assert_eq!(catalog.level_type(LevelId(200)), None);
    }

    #[test]
    fn test_eligible_quests_skip_single_player() {
        let catalog = StaticCatalog::default();
        let eligible = catalog.eligible_quests();
        assert_eq!(eligible.len(), 15);
        assert!(!eligible.contains(&1));
        assert!(eligible.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_json_roundtrip() {
        let catalog = StaticCatalog::default();
        let json = catalog.to_json().unwrap();
        let parsed = StaticCatalog::from_json(&json).unwrap();
        assert_eq!(parsed, catalog);
    }
}
