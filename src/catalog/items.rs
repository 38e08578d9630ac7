//! Item Creation Flags
//!
//! The 16-bit creation-info field records how an item was generated: its
//! item level in the low six bits plus flags naming the source. A remote
//! item is only plausible when the flags form a combination the generator
//! can actually produce and that combination agrees with the catalog entry.

use thiserror::Error;

use super::{ItemEntry, ItemKind};

/// Creation-info bit layout.
pub struct CreationFlags;

impl CreationFlags {
    /// Item level.
    pub const LEVEL: u16 = 0x003F;
    /// Only good affixes were rolled.
    pub const ONLY_GOOD: u16 = 0x0040;
    /// Unique monster drop, 15% unique chance.
    pub const UPER15: u16 = 0x0080;
    /// Unique monster drop, 1% unique chance.
    pub const UPER1: u16 = 0x0100;
    /// Rolled as a unique item.
    pub const UNIQUE: u16 = 0x0200;
    /// Sold by the smith.
    pub const SMITH: u16 = 0x0400;
    /// Sold by the smith's premium stock.
    pub const SMITH_PREMIUM: u16 = 0x0800;
    /// Sold by the boy.
    pub const BOY: u16 = 0x1000;
    /// Sold by the witch.
    pub const WITCH: u16 = 0x2000;
    /// Sold by the healer.
    pub const HEALER: u16 = 0x4000;
    /// Pre-generated with the level, not yet picked up.
    pub const PREGEN: u16 = 0x8000;

    /// Both unique-monster flags.
    pub const USEFUL: u16 = Self::UPER15 | Self::UPER1;
    /// Any town vendor flag.
    pub const TOWN: u16 =
        Self::SMITH | Self::SMITH_PREMIUM | Self::BOY | Self::WITCH | Self::HEALER;

    /// Item level encoded in the creation info.
    #[inline]
    pub fn level(create_info: u16) -> u8 {
        (create_info & Self::LEVEL) as u8
    }
}

/// Where an item came from, derived from its creation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOrigin {
    /// Bought from the vendor named by the flag.
    Town(u16),
    /// Dropped by a unique monster.
    UniqueMonster,
    /// Dropped in the dungeon.
    Dungeon,
}

impl ItemOrigin {
    /// Classify creation info.
    pub fn of(create_info: u16) -> Self {
        let town = create_info & CreationFlags::TOWN;
        if town != 0 {
            ItemOrigin::Town(town)
        } else if create_info & CreationFlags::USEFUL == CreationFlags::UPER15 {
            ItemOrigin::UniqueMonster
        } else {
            ItemOrigin::Dungeon
        }
    }
}

/// Check that the creation flags form a combination the generator produces.
pub fn is_creation_combo_valid(create_info: u16) -> bool {
    let flags = create_info & !CreationFlags::LEVEL;
    let town = flags & CreationFlags::TOWN;

    if flags & CreationFlags::PREGEN != 0 {
        // Discarded on pick-up, so never seen on a held item.
        return false;
    }
    if flags & CreationFlags::USEFUL == CreationFlags::USEFUL && flags & !CreationFlags::USEFUL != 0 {
        return false;
    }
    if town != 0 && (flags & !CreationFlags::TOWN != 0 || town.count_ones() != 1) {
        return false;
    }
    true
}

/// Reason an item disagrees with its catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ItemInconsistency {
    /// Flags are not a producible combination.
    #[error("illegal creation flag combination")]
    IllegalFlags,
    /// The flagged vendor does not stock this item.
    #[error("vendor does not sell this item")]
    NotSoldByVendor,
    /// The item cannot be dropped in the dungeon.
    #[error("item is not droppable")]
    NotDroppable,
    /// The item level is below the item's minimum drop level.
    #[error("item level below minimum drop level")]
    BelowDropLevel,
}

/// Check creation info against the item's catalog entry.
pub fn check_item_origin(entry: &ItemEntry, create_info: u16) -> Result<(), ItemInconsistency> {
    if entry.kind == ItemKind::Gold {
        return Ok(());
    }
    if !is_creation_combo_valid(create_info) {
        return Err(ItemInconsistency::IllegalFlags);
    }

    match ItemOrigin::of(create_info) {
        ItemOrigin::Town(vendor) => {
            if entry.vendors & vendor == 0 {
                return Err(ItemInconsistency::NotSoldByVendor);
            }
        }
        ItemOrigin::UniqueMonster | ItemOrigin::Dungeon => {
            if !entry.droppable {
                return Err(ItemInconsistency::NotDroppable);
            }
            if CreationFlags::level(create_info) < entry.min_drop_level {
                return Err(ItemInconsistency::BelowDropLevel);
            }
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
