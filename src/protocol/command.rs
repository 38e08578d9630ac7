//! Command Records
//!
//! Typed form of every record on the wire. A [`Command`] variant mirrors a
//! [`Layout`]; the tag inside picks the meaning. Field widths match the
//! packed little-endian records exactly.

use crate::core::tile::TilePosition;

use super::tag::{CommandTag, Layout};

/// Peer index within the session.
pub type PeerId = u8;

/// Marker byte for "every peer" in destination markers.
pub const BROADCAST_MARKER: u8 = 0xFF;

/// Where an outbound record goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Destination {
    /// A single peer.
    Peer(PeerId),
    /// Every peer.
    Broadcast,
}

impl Destination {
    /// Wire byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Destination::Peer(peer) => peer,
            Destination::Broadcast => BROADCAST_MARKER,
        }
    }

    /// Decode a wire byte.
    pub fn from_byte(byte: u8) -> Self {
        if byte == BROADCAST_MARKER {
            Destination::Broadcast
        } else {
            Destination::Peer(byte)
        }
    }

    /// Check if a peer receives records sent here.
    pub fn includes(self, peer: PeerId) -> bool {
        match self {
            Destination::Peer(p) => p == peer,
            Destination::Broadcast => true,
        }
    }
}

// =============================================================================
// ITEMS
// =============================================================================

/// Item identity for merge purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ItemDef {
    /// Creation seed.
    pub seed: u32,
    /// Catalog index.
    pub index: u16,
    /// Creation-info bitmask.
    pub create_info: u16,
}

/// Full item state as transferred between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemRecord {
    /// Identity.
    pub def: ItemDef,
    /// Identified by a scroll or vendor.
    pub identified: bool,
    /// Current durability.
    pub durability: u8,
    /// Maximum durability.
    pub max_durability: u8,
    /// Current charges.
    pub charges: u8,
    /// Maximum charges.
    pub max_charges: u8,
    /// Gold value (or pile size for gold).
    pub value: u16,
    /// Required to-hit bonus.
    pub to_hit: u16,
    /// Maximum damage.
    pub max_damage: u16,
    /// Generation flags outside the creation info.
    pub buff: u32,
}

impl ItemRecord {
    /// Encoded size in bytes.
    pub const SIZE: usize = 23;

    /// Minimal record for an identity.
    pub fn from_def(def: ItemDef) -> Self {
        Self {
            def,
            ..Default::default()
        }
    }
}

// =============================================================================
// BODIES
// =============================================================================

/// Pick-up request or confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetItemBody {
    /// Level owner confirming the pick-up.
    pub master: PeerId,
    /// Player picking the item up.
    pub player: PeerId,
    /// Floor item index on the owner's level.
    pub cursor_item: u8,
    /// Multiplayer level id.
    pub level: u8,
    /// Tile the item lies on.
    pub position: TilePosition,
    /// Item state.
    pub item: ItemRecord,
    /// Request timestamp in milliseconds.
    pub timestamp: i32,
}

/// Item placed on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutItemBody {
    /// Target tile.
    pub position: TilePosition,
    /// Item state.
    pub item: ItemRecord,
}

/// Item placed into a body, grid or belt slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeItemBody {
    /// Slot index within the container named by the tag.
    pub slot: u8,
    /// Item state.
    pub item: ItemRecord,
    /// Whether the active spell follows the item.
    pub force_spell: bool,
}

/// Damage dealt to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDamageBody {
    /// Target player.
    pub target: PeerId,
    /// Damage in 1/64 hit-points.
    pub damage: u32,
    /// Damage type.
    pub kind: u8,
}

/// Damage dealt to a monster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonsterDamageBody {
    /// Monster slot.
    pub monster: u16,
    /// Remaining hit-points after the hit.
    pub hit_points: u32,
}

/// Quest state sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestBody {
    /// Quest id.
    pub quest: u8,
    /// Quest state.
    pub state: u8,
    /// Quest log flag.
    pub log: u8,
    /// Quest variable 1.
    pub var1: u8,
    /// Quest variable 2.
    pub var2: u8,
    /// Speech id shown in the quest log.
    pub message: i16,
}

/// Monster created after level load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnMonsterBody {
    /// Spawn tile.
    pub position: TilePosition,
    /// Facing.
    pub direction: u8,
    /// Monster type index.
    pub type_index: u16,
    /// Monster slot.
    pub slot: u16,
    /// Creation seed.
    pub seed: u32,
    /// Owning player for summons.
    pub owner: PeerId,
    /// Spell level of the summoning cast.
    pub spell_level: u8,
}

/// One piece of a chunked transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBody {
    /// Byte offset of `data` within the whole transfer.
    pub offset: u16,
    /// Payload piece.
    pub data: Vec<u8>,
}

// =============================================================================
// COMMAND
// =============================================================================

/// A decoded command record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Tag only.
    Bare(CommandTag),
    /// Tile.
    Loc {
        /// Tag.
        tag: CommandTag,
        /// Tile.
        position: TilePosition,
    },
    /// Tile plus one parameter.
    LocParam1 {
        /// Tag.
        tag: CommandTag,
        /// Tile.
        position: TilePosition,
        /// Parameter.
        param: u16,
    },
    /// Tile plus two parameters.
    LocParam2 {
        /// Tag.
        tag: CommandTag,
        /// Tile.
        position: TilePosition,
        /// Parameters.
        params: [u16; 2],
    },
    /// Tile plus three parameters.
    LocParam3 {
        /// Tag.
        tag: CommandTag,
        /// Tile.
        position: TilePosition,
        /// Parameters.
        params: [u16; 3],
    },
    /// Tile plus four parameters.
    LocParam4 {
        /// Tag.
        tag: CommandTag,
        /// Tile.
        position: TilePosition,
        /// Parameters.
        params: [u16; 4],
    },
    /// One parameter.
    Param1 {
        /// Tag.
        tag: CommandTag,
        /// Parameter.
        param: u16,
    },
    /// Two parameters.
    Param2 {
        /// Tag.
        tag: CommandTag,
        /// Parameters.
        params: [u16; 2],
    },
    /// Four parameters.
    Param4 {
        /// Tag.
        tag: CommandTag,
        /// Parameters.
        params: [u16; 4],
    },
    /// Pick-up request or confirmation.
    GetItem {
        /// Tag.
        tag: CommandTag,
        /// Body.
        body: GetItemBody,
    },
    /// Item placed on a tile.
    PutItem {
        /// Tag.
        tag: CommandTag,
        /// Body.
        body: PutItemBody,
    },
    /// Item placed into a slot.
    ChangeItem {
        /// Tag.
        tag: CommandTag,
        /// Body.
        body: ChangeItemBody,
    },
    /// Item removed from a body slot.
    DeleteBodyItem {
        /// Body slot.
        slot: u8,
    },
    /// Player damage.
    PlayerDamage(PlayerDamageBody),
    /// Monster damage.
    MonsterDamage(MonsterDamageBody),
    /// Quest sync.
    Quest(QuestBody),
    /// Monster spawn.
    SpawnMonster(SpawnMonsterBody),
    /// Chunked transfer piece.
    Chunk {
        /// Tag.
        tag: CommandTag,
        /// Body.
        body: ChunkBody,
    },
    /// Chat line.
    Chat {
        /// Text without terminator.
        text: String,
    },
    /// Outbound frame destination change.
    SetDestination(Destination),
}

impl Command {
    /// Tag of this record.
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::Bare(tag)
            | Command::Loc { tag, .. }
            | Command::LocParam1 { tag, .. }
            | Command::LocParam2 { tag, .. }
            | Command::LocParam3 { tag, .. }
            | Command::LocParam4 { tag, .. }
            | Command::Param1 { tag, .. }
            | Command::Param2 { tag, .. }
            | Command::Param4 { tag, .. }
            | Command::GetItem { tag, .. }
            | Command::PutItem { tag, .. }
            | Command::ChangeItem { tag, .. }
            | Command::Chunk { tag, .. } => *tag,
            Command::DeleteBodyItem { .. } => CommandTag::DeleteBodyItem,
            Command::PlayerDamage(_) => CommandTag::PlayerDamage,
            Command::MonsterDamage(_) => CommandTag::MonsterDamage,
            Command::Quest(_) => CommandTag::SyncQuest,
            Command::SpawnMonster(_) => CommandTag::SpawnMonster,
            Command::Chat { .. } => CommandTag::Chat,
            Command::SetDestination(_) => CommandTag::SetDestination,
        }
    }

    /// Layout implied by the variant.
    pub fn layout(&self) -> Layout {
        match self {
            Command::Bare(_) => Layout::Bare,
            Command::Loc { .. } => Layout::Loc,
            Command::LocParam1 { .. } => Layout::LocParam1,
            Command::LocParam2 { .. } => Layout::LocParam2,
            Command::LocParam3 { .. } => Layout::LocParam3,
            Command::LocParam4 { .. } => Layout::LocParam4,
            Command::Param1 { .. } => Layout::Param1,
            Command::Param2 { .. } => Layout::Param2,
            Command::Param4 { .. } => Layout::Param4,
            Command::GetItem { .. } => Layout::GetItem,
            Command::PutItem { .. } => Layout::PutItem,
            Command::ChangeItem { .. } => Layout::ChangeItem,
            Command::DeleteBodyItem { .. } => Layout::DeleteBodyItem,
            Command::PlayerDamage(_) => Layout::PlayerDamage,
            Command::MonsterDamage(_) => Layout::MonsterDamage,
            Command::Quest(_) => Layout::Quest,
            Command::SpawnMonster(_) => Layout::SpawnMonster,
            Command::Chunk { .. } => Layout::Chunk,
            Command::Chat { .. } => Layout::Text,
            Command::SetDestination(_) => Layout::Marker,
        }
    }

    /// Size of the encoded record.
    pub fn encoded_len(&self) -> usize {
        match self {
            Command::Chunk { body, .. } => Layout::Chunk.fixed_size() + body.data.len(),
            Command::Chat { text } => 1 + text.len() + 1,
            other => other.layout().fixed_size(),
        }
    }

    /// Walk to a tile.
    pub fn walk(position: TilePosition) -> Self {
        Command::Loc {
            tag: CommandTag::Walk,
            position,
        }
    }

    /// Tile-targeted command.
    pub fn at_tile(tag: CommandTag, position: TilePosition) -> Self {
        Command::Loc { tag, position }
    }

    /// Single-parameter command.
    pub fn with_param(tag: CommandTag, param: u16) -> Self {
        Command::Param1 { tag, param }
    }

    /// Chunked transfer piece.
    pub fn chunk(tag: CommandTag, offset: u16, data: Vec<u8>) -> Self {
        Command::Chunk {
            tag,
            body: ChunkBody { offset, data },
        }
    }

    /// Chat line.
    pub fn chat(text: impl Into<String>) -> Self {
        Command::Chat { text: text.into() }
    }

    /// Item placed on a tile.
    pub fn put_item(tag: CommandTag, position: TilePosition, item: ItemRecord) -> Self {
        Command::PutItem {
            tag,
            body: PutItemBody { position, item },
        }
    }
}
