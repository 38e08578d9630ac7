//! Command Tags
//!
//! Every record starts with a one-byte tag. The tag alone determines the
//! record's [`Layout`], its handling while the dispatcher is capturing, and
//! whether the sender deduplicates it within a tick.

use serde::{Deserialize, Serialize};

/// Wire record layout, shared by every tag of the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Tag only.
    Bare,
    /// Tile.
    Loc,
    /// Tile plus one u16 parameter.
    LocParam1,
    /// Tile plus two u16 parameters.
    LocParam2,
    /// Tile plus three u16 parameters.
    LocParam3,
    /// Tile plus four u16 parameters.
    LocParam4,
    /// One u16 parameter.
    Param1,
    /// Two u16 parameters.
    Param2,
    /// Four u16 parameters.
    Param4,
    /// Item pick-up with level owner confirmation.
    GetItem,
    /// Item placed on a tile.
    PutItem,
    /// Item placed into a body, grid or belt slot.
    ChangeItem,
    /// Body slot index.
    DeleteBodyItem,
    /// Damage dealt to a player.
    PlayerDamage,
    /// Damage dealt to a monster.
    MonsterDamage,
    /// Quest state.
    Quest,
    /// Monster spawned after level load.
    SpawnMonster,
    /// `[offset u16][length u16][body]`.
    Chunk,
    /// NUL-terminated text.
    Text,
    /// In-band destination change inside an outbound frame.
    Marker,
}

impl Layout {
    /// Encoded size for fixed layouts, header size for variable ones.
    pub const fn fixed_size(self) -> usize {
        match self {
            Layout::Bare => 1,
            Layout::Loc => 3,
            Layout::LocParam1 => 5,
            Layout::LocParam2 => 7,
            Layout::LocParam3 => 9,
            Layout::LocParam4 => 11,
            Layout::Param1 => 3,
            Layout::Param2 => 5,
            Layout::Param4 => 9,
            Layout::GetItem => 34,
            Layout::PutItem => 26,
            Layout::ChangeItem => 26,
            Layout::DeleteBodyItem => 2,
            Layout::PlayerDamage => 7,
            Layout::MonsterDamage => 7,
            Layout::Quest => 8,
            Layout::SpawnMonster => 14,
            Layout::Chunk => 5,
            Layout::Text => 1,
            Layout::Marker => 2,
        }
    }

    /// Check if the record carries a variable-length tail.
    pub const fn is_variable(self) -> bool {
        matches!(self, Layout::Chunk | Layout::Text)
    }
}

/// What the dispatcher does with a record while capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePolicy {
    /// Queue for replay after the resync.
    Buffer,
    /// Drop; it only makes sense against the live world.
    Discard,
    /// Handle immediately regardless of mode.
    Always,
}

macro_rules! command_tags {
    ($( $(#[$doc:meta])* $name:ident = $value:literal => $layout:ident, $capture:ident; )*) => {
        /// Command tag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum CommandTag {
            $( $(#[$doc])* $name = $value, )*
        }

        impl CommandTag {
            /// Every tag, in wire order.
            pub const ALL: &'static [CommandTag] = &[ $( CommandTag::$name, )* ];

            /// Decode a tag byte.
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $( $value => Some(CommandTag::$name), )*
                    _ => None,
                }
            }

            /// Record layout for this tag.
            pub const fn layout(self) -> Layout {
                match self {
                    $( CommandTag::$name => Layout::$layout, )*
                }
            }

            /// Handling while the dispatcher captures.
            pub const fn capture_policy(self) -> CapturePolicy {
                match self {
                    $( CommandTag::$name => CapturePolicy::$capture, )*
                }
            }
        }
    };
}

command_tags! {
    /// Walk to a tile.
    Walk = 1 => Loc, Discard;
    /// Acknowledge a player-info push.
    AckPlayerInfo = 2 => Chunk, Buffer;
    /// Spend points on strength.
    AddStrength = 3 => Param1, Buffer;
    /// Spend points on magic.
    AddMagic = 4 => Param1, Buffer;
    /// Spend points on dexterity.
    AddDexterity = 5 => Param1, Buffer;
    /// Spend points on vitality.
    AddVitality = 6 => Param1, Buffer;
    /// Confirmed pick-up to the cursor.
    GetItem = 7 => GetItem, Buffer;
    /// Confirmed pick-up into the inventory.
    AutoGetItem = 8 => GetItem, Buffer;
    /// Item put down on a tile.
    PutItem = 9 => PutItem, Buffer;
    /// Item created on a tile.
    SpawnItem = 10 => PutItem, Buffer;
    /// Melee attack at a tile.
    AttackTile = 11 => Loc, Discard;
    /// Ranged attack at a tile.
    RangedAttackTile = 12 => Loc, Discard;
    /// Spell cast at a tile.
    SpellTile = 13 => LocParam3, Discard;
    /// Operate the object at a tile.
    OperateObjectTile = 14 => Loc, Discard;
    /// Disarm the trap at a tile.
    DisarmTile = 15 => Loc, Discard;
    /// Melee attack a monster.
    AttackMonster = 16 => Param1, Discard;
    /// Melee attack a player.
    AttackPlayer = 17 => Param1, Discard;
    /// Ranged attack a monster.
    RangedAttackMonster = 18 => Param1, Discard;
    /// Ranged attack a player.
    RangedAttackPlayer = 19 => Param1, Discard;
    /// Spell cast at a monster.
    SpellMonster = 20 => Param4, Discard;
    /// Spell cast at a player.
    SpellPlayer = 21 => Param4, Discard;
    /// Resurrect a player.
    Resurrect = 22 => Param1, Buffer;
    /// Operate an object with telekinesis.
    TelekinesisObject = 23 => Param1, Discard;
    /// Knock a monster back.
    Knockback = 24 => Param1, Discard;
    /// Talk to a town NPC.
    TalkTile = 25 => LocParam1, Discard;
    /// Change level.
    NewLevel = 26 => Param2, Buffer;
    /// Take a portal.
    Warp = 27 => Param1, Buffer;
    /// Monster killed.
    MonsterDeath = 28 => LocParam1, Buffer;
    /// Monster damaged.
    MonsterDamage = 29 => MonsterDamage, Buffer;
    /// Player died.
    PlayerDeath = 30 => Param1, Buffer;
    /// Ask the level owner to confirm a cursor pick-up.
    RequestGetItem = 31 => GetItem, Buffer;
    /// Ask the level owner to confirm an inventory pick-up.
    RequestAutoGetItem = 32 => GetItem, Buffer;
    /// Walk to an item and pick it up.
    GotoGetItem = 33 => LocParam1, Discard;
    /// Walk to an item and pick it up into the inventory.
    GotoAutoGetItem = 34 => LocParam1, Discard;
    /// Door opened.
    OpenDoor = 35 => Loc, Buffer;
    /// Door closed.
    CloseDoor = 36 => Loc, Buffer;
    /// Object operated.
    OperateObject = 37 => Loc, Buffer;
    /// Object broken.
    BreakObject = 38 => Loc, Buffer;
    /// Item equipped.
    ChangeBodyItem = 39 => ChangeItem, Buffer;
    /// Item unequipped.
    DeleteBodyItem = 40 => DeleteBodyItem, Buffer;
    /// Item placed in the inventory grid.
    ChangeInventoryItem = 41 => ChangeItem, Buffer;
    /// Item removed from the inventory grid.
    DeleteInventoryItem = 42 => Param1, Buffer;
    /// Item placed in the belt.
    ChangeBeltItem = 43 => ChangeItem, Buffer;
    /// Item removed from the belt.
    DeleteBeltItem = 44 => Param1, Buffer;
    /// Damage dealt to a player.
    PlayerDamage = 45 => PlayerDamage, Buffer;
    /// Item dropped from the cursor.
    DropItem = 46 => PutItem, Buffer;
    /// Player entered a level.
    JoinLevel = 47 => LocParam2, Buffer;
    /// Push player info.
    SendPlayerInfo = 48 => Chunk, Buffer;
    /// Melee attack at a tile without moving.
    StandingAttackTile = 49 => Loc, Discard;
    /// Portal opened.
    ActivatePortal = 50 => LocParam3, Buffer;
    /// Portal closed.
    DeactivatePortal = 51 => Bare, Buffer;
    /// Delta level chunk.
    LevelDelta = 52 => Chunk, Always;
    /// Delta junk chunk.
    JunkDelta = 53 => Chunk, Always;
    /// End of delta transfer.
    EndDelta = 54 => Chunk, Always;
    /// Heal another player.
    HealOther = 55 => Param1, Discard;
    /// Chat line.
    Chat = 56 => Text, Discard;
    /// Toggle friendly mode.
    FriendlyMode = 57 => Bare, Buffer;
    /// Set strength.
    SetStrength = 58 => Param1, Buffer;
    /// Set magic.
    SetMagic = 59 => Param1, Buffer;
    /// Set dexterity.
    SetDexterity = 60 => Param1, Buffer;
    /// Set vitality.
    SetVitality = 61 => Param1, Buffer;
    /// Return to town.
    ReturnToTown = 62 => Bare, Buffer;
    /// Directional spell cast at a tile.
    SpellWall = 63 => LocParam4, Discard;
    /// Item removed by the level owner without a pick-up.
    ItemExtra = 64 => GetItem, Buffer;
    /// Item put down, replayed to a late viewer.
    SyncPutItem = 65 => PutItem, Buffer;
    /// Quest state changed.
    SyncQuest = 66 => Quest, Buffer;
    /// Mana shield raised.
    SetShield = 67 => Bare, Buffer;
    /// Mana shield dropped.
    RemoveShield = 68 => Bare, Buffer;
    /// Reflect charges set.
    SetReflect = 69 => Param1, Buffer;
    /// Monster spawned after level load.
    SpawnMonster = 70 => SpawnMonster, Buffer;
    /// Outbound frame destination change.
    SetDestination = 0xFE => Marker, Discard;
}

impl CommandTag {
    /// Check if this tag belongs to the deduplicated player-action set.
    pub const fn is_player_action(self) -> bool {
        matches!(
            self,
            CommandTag::Walk
                | CommandTag::AttackTile
                | CommandTag::StandingAttackTile
                | CommandTag::RangedAttackTile
                | CommandTag::SpellTile
                | CommandTag::SpellWall
                | CommandTag::AttackMonster
                | CommandTag::AttackPlayer
                | CommandTag::RangedAttackMonster
                | CommandTag::RangedAttackPlayer
                | CommandTag::SpellMonster
                | CommandTag::SpellPlayer
                | CommandTag::OperateObjectTile
                | CommandTag::DisarmTile
                | CommandTag::TalkTile
                | CommandTag::GotoGetItem
                | CommandTag::GotoAutoGetItem
        )
    }

    /// Check if this tag belongs to the delta-transfer triplet.
    pub const fn is_delta_transfer(self) -> bool {
        matches!(self, CommandTag::LevelDelta | CommandTag::JunkDelta | CommandTag::EndDelta)
    }
}

impl std::fmt::Display for CommandTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, *self as u8)
    }
}

// =============================================================================
// TESTS
// =============================================================================
