//! Session-Global Junk Table
//!
//! Town portals (one per player) and multiplayer quest states. Unlike the
//! per-level stores, junk is shared by the whole session.

use std::collections::BTreeMap;

use crate::core::limits::MAX_PORTALS;
use crate::core::slot::SlotArena;
use crate::core::tile::TilePosition;

use super::level::RestoreEvent;

/// An open town portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalDelta {
    /// Tile the portal stands on.
    pub position: TilePosition,
    /// Destination level number.
    pub level: u8,
    /// Destination level type.
    pub level_type: u8,
    /// Destination is a set level.
    pub is_set_level: bool,
}

impl PortalDelta {
    /// Encoded size in bytes.
    pub const SIZE: usize = 5;
}

/// Synchronized quest progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestDelta {
    /// Quest state byte.
    pub state: u8,
    /// Quest log shown.
    pub log: u8,
    /// Quest variable 1.
    pub var1: u8,
    /// Quest variable 2.
    pub var2: u8,
    /// Last speech id.
    pub message: i16,
}

impl QuestDelta {
    /// Encoded size in bytes.
    pub const SIZE: usize = 6;
}

/// Portals and quests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junk {
    pub(super) portals: SlotArena<PortalDelta>,
    pub(super) quests: BTreeMap<u8, QuestDelta>,
}

impl Default for Junk {
    fn default() -> Self {
        Self::new()
    }
}

impl Junk {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            portals: SlotArena::with_capacity(MAX_PORTALS),
            quests: BTreeMap::new(),
        }
    }

    /// Record a player's open portal. Ignored for unknown players.
    pub fn open_portal(&mut self, player: u8, portal: PortalDelta) {
        self.portals.set(player as usize, portal);
    }

    /// Record a player's portal as closed.
    pub fn close_portal(&mut self, player: u8) {
        self.portals.clear(player as usize);
    }

    /// A player's open portal.
    pub fn portal(&self, player: u8) -> Option<&PortalDelta> {
        self.portals.get(player as usize)
    }

    /// Record a quest's state.
    pub fn apply_quest(&mut self, quest: u8, record: QuestDelta) {
        self.quests.insert(quest, record);
    }

    /// A quest's recorded state.
    pub fn quest(&self, quest: u8) -> Option<&QuestDelta> {
        self.quests.get(&quest)
    }

    /// Facts to replay when a player enters the game.
    pub fn restore_events(&self) -> Vec<RestoreEvent> {
        let portals = (0..MAX_PORTALS).map(|player| RestoreEvent::Portal {
            player: player as u8,
            portal: self.portals.get(player).copied(),
        });
        let quests = self
            .quests
            .iter()
            .map(|(&quest, &record)| RestoreEvent::Quest { quest, record });
        portals.chain(quests).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal() -> PortalDelta {
        PortalDelta {
            position: TilePosition::new(60, 70),
            level: 5,
            level_type: 2,
            is_set_level: false,
        }
    }

    #[test]
    fn test_portal_open_close() {
        let mut junk = Junk::new();
        junk.open_portal(1, portal());
        assert_eq!(junk.portal(1), Some(&portal()));
        junk.close_portal(1);
        assert_eq!(junk.portal(1), None);

        junk.open_portal(MAX_PORTALS as u8, portal());
        assert_eq!(junk, Junk::new());
    }

    #[test]
    fn test_restore_lists_every_portal_slot() {
        let mut junk = Junk::new();
        junk.open_portal(2, portal());
        let record = QuestDelta {
            state: 2,
            log: 1,
            var1: 0,
            var2: 0,
            message: 4,
        };
        junk.apply_quest(9, record);

        let events = junk.restore_events();
        assert_eq!(events.len(), MAX_PORTALS + 1);
        assert_eq!(events[0], RestoreEvent::Portal { player: 0, portal: None });
        assert_eq!(events[2], RestoreEvent::Portal { player: 2, portal: Some(portal()) });
        assert_eq!(events[MAX_PORTALS], RestoreEvent::Quest { quest: 9, record });
    }
}
