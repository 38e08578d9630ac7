//! Simulation Interface
//!
//! Callback surface into the game simulation. Handlers report effects as
//! [`SimEvent`]s and query the few facts they need to decide whether a
//! command applies.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::tile::{LevelId, TilePosition};
use crate::delta::{ObjectAction, PortalDelta, QuestDelta, RestoreEvent, SpawnedMonster};
use crate::protocol::{Command, CommandTag, ItemDef, ItemRecord, PeerId};

use super::transport::LeaveReason;

/// An effect for the simulation to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A player command with no delta-store effect (movement, combat,
    /// stats, inventory).
    PlayerCommand {
        /// Issuing peer.
        sender: PeerId,
        /// Command.
        command: Command,
    },
    /// An item left the floor.
    ItemTaken {
        /// Player that took it.
        player: PeerId,
        /// Level.
        level: LevelId,
        /// Tile.
        position: TilePosition,
        /// Item.
        item: ItemRecord,
        /// Put straight into the inventory.
        auto: bool,
    },
    /// An item was removed by the level owner without a pick-up.
    ItemRemoved {
        /// Level.
        level: LevelId,
        /// Identity.
        def: ItemDef,
    },
    /// An item appeared on the floor.
    ItemPlaced {
        /// Player that placed or created it.
        player: PeerId,
        /// Level.
        level: LevelId,
        /// Tile.
        position: TilePosition,
        /// Item.
        item: ItemRecord,
    },
    /// An object was interacted with.
    ObjectChanged {
        /// Level.
        level: LevelId,
        /// Object tile.
        position: TilePosition,
        /// Interaction.
        action: ObjectAction,
    },
    /// A monster died.
    MonsterKilled {
        /// Level.
        level: LevelId,
        /// Monster slot.
        slot: u16,
        /// Death tile.
        position: TilePosition,
    },
    /// A monster took damage.
    MonsterDamaged {
        /// Level.
        level: LevelId,
        /// Monster slot.
        slot: u16,
        /// Remaining hit-points.
        hit_points: i32,
    },
    /// A monster was spawned.
    MonsterSpawned {
        /// Level.
        level: LevelId,
        /// Monster slot.
        slot: u16,
        /// Spawn data.
        monster: SpawnedMonster,
        /// Tile.
        position: TilePosition,
    },
    /// A quest changed state.
    QuestChanged {
        /// Quest id.
        quest: u8,
        /// New record.
        record: QuestDelta,
    },
    /// A player's portal opened or closed.
    PortalChanged {
        /// Owner.
        player: PeerId,
        /// Portal, `None` when closed.
        portal: Option<PortalDelta>,
    },
    /// A player entered a level.
    PlayerJoinedLevel {
        /// Player.
        player: PeerId,
        /// Level.
        level: LevelId,
        /// Entry tile.
        position: TilePosition,
    },
    /// A piece of a player-info transfer.
    PlayerInfo {
        /// Sending peer.
        sender: PeerId,
        /// `SendPlayerInfo` or `AckPlayerInfo`.
        tag: CommandTag,
        /// Offset in the transfer.
        offset: u16,
        /// Bytes.
        data: Vec<u8>,
    },
    /// A chat line.
    Chat {
        /// Sending peer.
        sender: PeerId,
        /// Text.
        text: String,
    },
    /// A peer left the game.
    PlayerLeft {
        /// Peer.
        peer: PeerId,
        /// Reason.
        reason: LeaveReason,
    },
    /// Delta-store fact replayed on level or game entry.
    Restore(RestoreEvent),
}

/// Game simulation consumed by a sync session.
pub trait Simulation {
    /// Apply an effect.
    fn apply(&mut self, event: SimEvent);

    /// Level a player is on, if they are in the dungeon.
    fn player_level(&self, peer: PeerId) -> Option<LevelId>;

    /// Check if an object stands at a tile of a level.
    fn object_exists(&self, level: LevelId, position: TilePosition) -> bool;

    /// Check if the local peer owns a level.
    fn owns_level(&self, level: LevelId) -> bool;

    /// Check if an item lies on the local floor.
    fn floor_item_exists(&self, def: &ItemDef) -> bool;
}

// =============================================================================
// RECORDING SIMULATION
// =============================================================================

/// Simulation double that records every event.
#[derive(Debug, Default)]
pub struct RecordingSimulation {
    /// Applied events in order.
    pub events: Vec<SimEvent>,
    /// Level of each player.
    pub levels: BTreeMap<PeerId, LevelId>,
    /// Existing objects.
    pub objects: BTreeSet<(LevelId, TilePosition)>,
    /// Levels owned by the local peer.
    pub owned: BTreeSet<LevelId>,
    /// Items on the local floor.
    pub floor_items: BTreeSet<ItemDef>,
}

impl RecordingSimulation {
    /// Create an empty simulation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put every listed player on a level.
    pub fn with_players_on(mut self, level: LevelId, players: &[PeerId]) -> Self {
        for &player in players {
            self.levels.insert(player, level);
        }
        self
    }

    /// Take the recorded events.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Simulation for RecordingSimulation {
    fn apply(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    fn player_level(&self, peer: PeerId) -> Option<LevelId> {
        self.levels.get(&peer).copied()
    }

    fn object_exists(&self, level: LevelId, position: TilePosition) -> bool {
        self.objects.contains(&(level, position))
    }

    fn owns_level(&self, level: LevelId) -> bool {
        self.owned.contains(&level)
    }

    fn floor_item_exists(&self, def: &ItemDef) -> bool {
        self.floor_items.contains(def)
    }
}
