//! Per-Level Delta Store
//!
//! Records how one dungeon level has diverged from its generated state:
//! item placement, object interactions, monster health and position, and
//! monsters spawned after generation. Items merge by identity, never by
//! slot index, so peers that recorded the same events in a different slot
//! order still converge.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::core::limits::{MAX_ITEMS, MAX_MONSTERS, MAX_OBJECTS, MAX_PLAYERS, NO_ENEMY};
use crate::core::slot::SlotArena;
use crate::core::tile::TilePosition;
use crate::catalog::CreationFlags;
use crate::protocol::{CommandTag, ItemDef, ItemRecord};

use super::junk::{PortalDelta, QuestDelta};
use super::DeltaError;

// =============================================================================
// ITEM LEDGER
// =============================================================================

/// Ledger state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemState {
    /// Lies on the floor.
    Floor = 0,
    /// Taken off the floor.
    PickedUp = 1,
    /// Put down by a player.
    Dropped = 2,
}

impl ItemState {
    /// Decode a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Floor),
            1 => Some(Self::PickedUp),
            2 => Some(Self::Dropped),
            _ => None,
        }
    }
}

/// One item ledger slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Ledger state.
    pub state: ItemState,
    /// Tile the item lies (or lay) on.
    pub position: TilePosition,
    /// Item state.
    pub item: ItemRecord,
}

impl LedgerEntry {
    /// Encoded size in bytes.
    pub const SIZE: usize = 3 + ItemRecord::SIZE;
}

/// Item mutation reported by the simulation or a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    /// Item generated onto the floor after level load.
    FloorSpawn {
        /// Tile.
        position: TilePosition,
        /// Item.
        item: ItemRecord,
    },
    /// Item taken from the floor.
    PickedUp {
        /// Tile it was taken from.
        position: TilePosition,
        /// Item.
        item: ItemRecord,
    },
    /// Item put down by a player.
    Dropped {
        /// Tile.
        position: TilePosition,
        /// Item.
        item: ItemRecord,
    },
}

/// Result of applying an [`ItemEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The ledger changed.
    Recorded,
    /// The ledger already reflected the event.
    Unchanged,
    /// A pick-up of an item the ledger does not know about.
    NotRecorded,
    /// No empty slot was left.
    LedgerFull,
}

// =============================================================================
// OBJECTS
// =============================================================================

/// Last interaction applied to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAction {
    /// Door opened.
    Open,
    /// Door closed.
    Close,
    /// Object operated.
    Operate,
    /// Object broken.
    Break,
}

impl ObjectAction {
    /// Command tag carrying this action on the wire.
    pub fn tag(self) -> CommandTag {
        match self {
            ObjectAction::Open => CommandTag::OpenDoor,
            ObjectAction::Close => CommandTag::CloseDoor,
            ObjectAction::Operate => CommandTag::OperateObject,
            ObjectAction::Break => CommandTag::BreakObject,
        }
    }

    /// Action for an object command tag.
    pub fn from_tag(tag: CommandTag) -> Option<Self> {
        match tag {
            CommandTag::OpenDoor => Some(ObjectAction::Open),
            CommandTag::CloseDoor => Some(ObjectAction::Close),
            CommandTag::OperateObject => Some(ObjectAction::Operate),
            CommandTag::BreakObject => Some(ObjectAction::Break),
            _ => None,
        }
    }
}

// =============================================================================
// MONSTERS
// =============================================================================

/// Hit-points value marking a monster nobody has damaged yet.
pub const UNDAMAGED: i32 = -1;

/// Active timer recorded for a monster seen in combat.
pub const ACTIVE_MAX: u8 = u8::MAX;

/// Recorded state of one monster slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonsterDelta {
    /// Last known tile.
    pub position: TilePosition,
    /// Target: a player id below [`MAX_PLAYERS`], a monster slot offset by
    /// [`MAX_PLAYERS`], or [`NO_ENEMY`].
    pub enemy: u8,
    /// Activity timer.
    pub active: u8,
    /// Hit-points; 0 is dead, [`UNDAMAGED`] is untouched.
    pub hit_points: i32,
    /// Bitmask of players that hit it.
    pub who_hit: u8,
}

impl MonsterDelta {
    /// Encoded size in bytes.
    pub const SIZE: usize = 9;

    /// Check if the monster is dead.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.hit_points == 0
    }

    /// Monster slot targeted by this monster, if it targets a monster.
    pub fn enemy_monster(&self) -> Option<usize> {
        (self.enemy != NO_ENEMY && self.enemy >= MAX_PLAYERS).then(|| (self.enemy - MAX_PLAYERS) as usize)
    }
}

/// Monster mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonsterEvent {
    /// Killed at a tile.
    Killed {
        /// Death tile.
        position: TilePosition,
    },
    /// Damaged down to `hit_points`.
    Damaged {
        /// Remaining hit-points.
        hit_points: i32,
    },
    /// Observed alive by a peer (sync or leaving the level). Stored with the
    /// active timer at [`ACTIVE_MAX`].
    Observed(MonsterDelta),
}

/// Monster created after level generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedMonster {
    /// Monster type index.
    pub type_index: u16,
    /// Creation seed.
    pub seed: u32,
    /// Owning player for summons.
    pub owner: u8,
    /// Spell level of the summoning cast.
    pub spell_level: u8,
}

impl SpawnedMonster {
    /// Encoded size in bytes, including the slot id.
    pub const SIZE: usize = 10;
}

// =============================================================================
// RESTORE EVENTS
// =============================================================================

/// A delta-store fact to replay into a freshly generated level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreEvent {
    /// Recreate a spawned monster.
    SpawnMonster {
        /// Monster slot.
        slot: u16,
        /// Spawn data.
        monster: SpawnedMonster,
        /// Tile.
        position: TilePosition,
    },
    /// Move a live monster and set its health.
    MonsterState {
        /// Monster slot.
        slot: u16,
        /// Tile.
        position: TilePosition,
        /// Hit-points ([`UNDAMAGED`] keeps generated health).
        hit_points: i32,
        /// Players that hit it.
        who_hit: u8,
    },
    /// Replace a dead monster with its corpse.
    MonsterCorpse {
        /// Monster slot.
        slot: u16,
        /// Tile.
        position: TilePosition,
    },
    /// Restore a live monster's target.
    MonsterEnemy {
        /// Monster slot.
        slot: u16,
        /// Enemy encoding.
        enemy: u8,
        /// Activity timer.
        active: u8,
    },
    /// Re-apply an object interaction.
    Object {
        /// Object tile.
        position: TilePosition,
        /// Interaction.
        action: ObjectAction,
    },
    /// Remove a generated item that was picked up.
    RemoveItem {
        /// Tile.
        position: TilePosition,
        /// Identity.
        def: ItemDef,
    },
    /// Place an item a player dropped.
    PlaceItem {
        /// Tile.
        position: TilePosition,
        /// Item.
        item: ItemRecord,
    },
    /// Set or clear a player's town portal.
    Portal {
        /// Owning player.
        player: u8,
        /// Portal, or `None` when closed.
        portal: Option<PortalDelta>,
    },
    /// Restore a quest's state.
    Quest {
        /// Quest id.
        quest: u8,
        /// Recorded state.
        record: QuestDelta,
    },
}

// =============================================================================
// DELTA LEVEL
// =============================================================================

/// Delta store of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaLevel {
    pub(super) items: SlotArena<LedgerEntry>,
    pub(super) objects: BTreeMap<TilePosition, ObjectAction>,
    pub(super) monsters: SlotArena<MonsterDelta>,
    pub(super) spawned: BTreeMap<u16, SpawnedMonster>,
}

impl Default for DeltaLevel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaLevel {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            items: SlotArena::with_capacity(MAX_ITEMS),
            objects: BTreeMap::new(),
            monsters: SlotArena::with_capacity(MAX_MONSTERS),
            spawned: BTreeMap::new(),
        }
    }

    /// Check if nothing diverged from generation.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.objects.is_empty() && self.monsters.is_empty() && self.spawned.is_empty()
    }

    /// Item ledger.
    pub fn items(&self) -> &SlotArena<LedgerEntry> {
        &self.items
    }

    /// Object interaction log.
    pub fn objects(&self) -> &BTreeMap<TilePosition, ObjectAction> {
        &self.objects
    }

    /// Monster table.
    pub fn monsters(&self) -> &SlotArena<MonsterDelta> {
        &self.monsters
    }

    /// Spawned-monster registry.
    pub fn spawned(&self) -> &BTreeMap<u16, SpawnedMonster> {
        &self.spawned
    }

    /// Ledger entry for an item identity.
    pub fn find_item(&self, def: &ItemDef) -> Option<(usize, &LedgerEntry)> {
        self.items.iter().find(|(_, entry)| entry.item.def == *def)
    }

    fn find_item_where(&self, def: &ItemDef, pred: impl Fn(&LedgerEntry) -> bool) -> Option<usize> {
        self.items
            .iter()
            .find(|(_, entry)| entry.item.def == *def && pred(entry))
            .map(|(slot, _)| slot)
    }

    fn insert_item(&mut self, entry: LedgerEntry) -> ItemOutcome {
        match self.items.insert(entry) {
            Some(_) => ItemOutcome::Recorded,
            None => {
                warn!(seed = entry.item.def.seed, index = entry.item.def.index, "Item ledger full");
                ItemOutcome::LedgerFull
            }
        }
    }

    /// Apply an item event.
    ///
    /// Dropping an item the ledger still shows on the floor is a
    /// duplication attempt and fails with [`DeltaError::DuplicateFloorItem`].
    pub fn apply_item_event(&mut self, event: ItemEvent) -> Result<ItemOutcome, DeltaError> {
        match event {
            ItemEvent::FloorSpawn { position, item } => {
                let known = self.find_item_where(&item.def, |e| {
                    matches!(e.state, ItemState::Floor | ItemState::PickedUp)
                });
                if known.is_some() {
                    return Ok(ItemOutcome::Unchanged);
                }
                Ok(self.insert_item(LedgerEntry {
                    state: ItemState::Floor,
                    position,
                    item,
                }))
            }

            ItemEvent::PickedUp { position, item } => {
                if let Some((slot, entry)) = self.find_item(&item.def) {
                    return Ok(match entry.state {
                        ItemState::PickedUp => ItemOutcome::Unchanged,
                        ItemState::Floor => {
                            if let Some(entry) = self.items.get_mut(slot) {
                                entry.state = ItemState::PickedUp;
                            }
                            ItemOutcome::Recorded
                        }
                        ItemState::Dropped => {
                            self.items.clear(slot);
                            ItemOutcome::Recorded
                        }
                    });
                }
                if item.def.create_info & CreationFlags::PREGEN == 0 {
                    return Ok(ItemOutcome::NotRecorded);
                }
                Ok(self.insert_item(LedgerEntry {
                    state: ItemState::PickedUp,
                    position,
                    item,
                }))
            }

            ItemEvent::Dropped { position, item } => {
                let existing = self
                    .items
                    .iter()
                    .find(|(_, e)| e.item.def == item.def && e.state != ItemState::PickedUp)
                    .map(|(_, e)| e.state);
                match existing {
                    Some(ItemState::Dropped) => Ok(ItemOutcome::Unchanged),
                    Some(_) => Err(DeltaError::DuplicateFloorItem {
                        seed: item.def.seed,
                        index: item.def.index,
                        create_info: item.def.create_info,
                    }),
                    None => Ok(self.insert_item(LedgerEntry {
                        state: ItemState::Dropped,
                        position,
                        item,
                    })),
                }
            }
        }
    }

    /// Record an object interaction at a tile.
    ///
    /// A tile already in the log takes the latest action. A new tile is
    /// refused once the log holds `MAX_OBJECTS` entries.
    pub fn apply_object_event(&mut self, position: TilePosition, action: ObjectAction) -> Result<(), DeltaError> {
        if !self.objects.contains_key(&position) && self.objects.len() >= MAX_OBJECTS {
            warn!(%position, max = MAX_OBJECTS, "Object log full");
            return Err(DeltaError::ObjectLogFull { max: MAX_OBJECTS });
        }
        self.objects.insert(position, action);
        Ok(())
    }

    /// Apply a monster event. Out-of-range slots are ignored.
    pub fn apply_monster_event(&mut self, slot: usize, event: MonsterEvent) {
        if slot >= MAX_MONSTERS {
            return;
        }
        match event {
            MonsterEvent::Killed { position } => match self.monsters.get_mut(slot) {
                Some(monster) => {
                    monster.position = position;
                    monster.hit_points = 0;
                }
                None => {
                    self.monsters.set(
                        slot,
                        MonsterDelta {
                            position,
                            enemy: NO_ENEMY,
                            active: 0,
                            hit_points: 0,
                            who_hit: 0,
                        },
                    );
                }
            },
            MonsterEvent::Damaged { hit_points } => {
                if let Some(monster) = self.monsters.get_mut(slot) {
                    let lowers = monster.hit_points == UNDAMAGED || hit_points < monster.hit_points;
                    if !monster.is_dead() && hit_points >= 0 && lowers {
                        monster.hit_points = hit_points;
                    }
                }
            }
            MonsterEvent::Observed(observed) => {
                if self.monsters.get(slot).is_some_and(MonsterDelta::is_dead) {
                    return;
                }
                self.monsters.set(
                    slot,
                    MonsterDelta {
                        active: ACTIVE_MAX,
                        ..observed
                    },
                );
            }
        }
    }

    /// Register a monster spawned after generation.
    ///
    /// Overwrites the slot's monster record with an undamaged, idle monster
    /// at the spawn tile.
    pub fn apply_spawn_event(&mut self, slot: u16, monster: SpawnedMonster, position: TilePosition) {
        if slot as usize >= MAX_MONSTERS {
            return;
        }
        self.spawned.insert(slot, monster);
        self.monsters.set(
            slot as usize,
            MonsterDelta {
                position,
                enemy: NO_ENEMY,
                active: 0,
                hit_points: UNDAMAGED,
                who_hit: 0,
            },
        );
    }

    /// Point enemy references at dead, missing or self slots to nobody.
    pub(super) fn reconcile_enemies(&mut self) {
        let live: Vec<bool> = (0..MAX_MONSTERS)
            .map(|slot| self.monsters.get(slot).is_some_and(|m| !m.is_dead()))
            .collect();
        for (slot, monster) in self.monsters.iter_mut() {
            if let Some(target) = monster.enemy_monster() {
                if target == slot || !live.get(target).copied().unwrap_or(false) {
                    debug!(slot, target, "Dropping enemy reference to missing monster");
                    monster.enemy = NO_ENEMY;
                }
            }
        }
    }

    /// Facts to replay into a freshly generated copy of this level.
    ///
    /// Object entries whose object no longer exists are removed from the log.
    pub fn restore_events(&mut self, object_exists: impl Fn(TilePosition) -> bool) -> Vec<RestoreEvent> {
        let mut events = Vec::new();

        for (&slot, &monster) in &self.spawned {
            if let Some(record) = self.monsters.get(slot as usize) {
                events.push(RestoreEvent::SpawnMonster {
                    slot,
                    monster,
                    position: record.position,
                });
            }
        }

        for (slot, monster) in self.monsters.iter() {
            let slot = slot as u16;
            if monster.is_dead() {
                events.push(RestoreEvent::MonsterCorpse {
                    slot,
                    position: monster.position,
                });
            } else {
                events.push(RestoreEvent::MonsterState {
                    slot,
                    position: monster.position,
                    hit_points: monster.hit_points,
                    who_hit: monster.who_hit,
                });
            }
        }

        for (slot, monster) in self.monsters.iter() {
            if !monster.is_dead() && monster.enemy != NO_ENEMY {
                events.push(RestoreEvent::MonsterEnemy {
                    slot: slot as u16,
                    enemy: monster.enemy,
                    active: monster.active,
                });
            }
        }

        self.objects.retain(|&position, _| object_exists(position));
        for (&position, &action) in &self.objects {
            events.push(RestoreEvent::Object { position, action });
        }

        for (_, entry) in self.items.iter() {
            match entry.state {
                ItemState::PickedUp => events.push(RestoreEvent::RemoveItem {
                    position: entry.position,
                    def: entry.item.def,
                }),
                ItemState::Dropped => events.push(RestoreEvent::PlaceItem {
                    position: entry.position,
                    item: entry.item,
                }),
                ItemState::Floor => {}
            }
        }

        events
    }
}

// =============================================================================
// TESTS
// =============================================================================
