//! Delta Export and Import
//!
//! Canonical byte layout of the delta stores. Empty item and monster slots
//! and empty portals are a single `0xFF` byte; every other slot is the full
//! fixed-size record. The sentinel only exists here: import converts it to
//! [`Slot::Empty`](crate::core::Slot) immediately.
//!
//! Import is entry-by-entry. A structurally broken stream (truncated, an
//! oversized count, trailing bytes) fails the whole import, while a single
//! entry whose fields make no sense is reset to empty and logged.

use std::collections::BTreeMap;

use tracing::debug;

use crate::catalog::{check_quest_record, CatalogProvider};
use crate::core::hash::{StateHash, StateHasher};
use crate::core::limits::{MAX_ITEMS, MAX_MONSTERS, MAX_OBJECTS, MAX_PLAYERS, MAX_PORTALS, MAX_QUESTS, NO_ENEMY};
use crate::core::slot::{Slot, SlotArena};
use crate::core::tile::EMPTY_MARKER;
use crate::protocol::{CommandTag, WireReader, WireWriter};
use crate::validate::combinator::{agrees, consistent, exists};
use crate::validate::rules::portal;
use crate::validate::{all_of, at_most, below, in_bounds, in_range, Verdict};

use super::junk::{Junk, PortalDelta, QuestDelta};
use super::level::{DeltaLevel, ItemState, LedgerEntry, MonsterDelta, ObjectAction, SpawnedMonster, UNDAMAGED};
use super::DeltaError;

/// Chunk flag for a raw payload.
pub const FLAG_RAW: u8 = 0;

/// Chunk flag for a zstd payload.
pub const FLAG_COMPRESSED: u8 = 1;

/// Largest level export: level byte and every table full.
pub const MAX_LEVEL_EXPORT: usize = 1
    + MAX_ITEMS * LedgerEntry::SIZE
    + 1
    + MAX_OBJECTS * 3
    + MAX_MONSTERS * MonsterDelta::SIZE
    + 2
    + MAX_MONSTERS * SpawnedMonster::SIZE;

/// Largest junk export.
pub const MAX_JUNK_EXPORT: usize = MAX_PORTALS * PortalDelta::SIZE + MAX_QUESTS * QuestDelta::SIZE;

/// Staging buffer size for one chunk stream: flag byte plus the largest export.
pub const STAGING_CAPACITY: usize = 1 + MAX_LEVEL_EXPORT;

// =============================================================================
// LEVEL
// =============================================================================

impl DeltaLevel {
    /// Serialize the store (without the level id).
    pub fn export(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(MAX_LEVEL_EXPORT);
        self.export_into(&mut writer);
        writer.into_inner()
    }

    /// Serialize the store into a writer.
    pub fn export_into(&self, writer: &mut WireWriter) {
        for slot in self.items.slots() {
            match slot {
                Slot::Empty => writer.write_u8(EMPTY_MARKER),
                Slot::Occupied(entry) => {
                    writer.write_u8(entry.state as u8);
                    writer.write_tile(entry.position);
                    writer.write_item(&entry.item);
                }
            }
        }

        let logged = self.objects.len().min(MAX_OBJECTS);
        writer.write_u8(u8::try_from(logged).unwrap_or(u8::MAX));
        for (&position, &action) in self.objects.iter().take(logged) {
            writer.write_tile(position);
            writer.write_u8(action.tag() as u8);
        }

        for slot in self.monsters.slots() {
            match slot {
                Slot::Empty => writer.write_u8(EMPTY_MARKER),
                Slot::Occupied(monster) => {
                    writer.write_tile(monster.position);
                    writer.write_u8(monster.enemy);
                    writer.write_u8(monster.active);
                    writer.write_i32(monster.hit_points);
                    writer.write_u8(monster.who_hit);
                }
            }
        }

        writer.write_u16(self.spawned.len() as u16);
        for (&slot, spawned) in &self.spawned {
            writer.write_u16(slot);
            writer.write_u16(spawned.type_index);
            writer.write_u32(spawned.seed);
            writer.write_u8(spawned.owner);
            writer.write_u8(spawned.spell_level);
        }
    }

    /// Rebuild a store from export bytes.
    pub fn import(bytes: &[u8], catalog: &dyn CatalogProvider) -> Result<Self, DeltaError> {
        let mut reader = WireReader::new(bytes);
        let level = Self::read_from(&mut reader, catalog)?;
        expect_end(&reader)?;
        Ok(level)
    }

    /// Read one store from a stream.
    pub fn read_from(reader: &mut WireReader<'_>, catalog: &dyn CatalogProvider) -> Result<Self, DeltaError> {
        let mut level = DeltaLevel::new();

        for slot in 0..MAX_ITEMS {
            let state = reader.read_u8()?;
            if state == EMPTY_MARKER {
                continue;
            }
            let position = reader.read_tile()?;
            let item = reader.read_item()?;
            let entry = ItemState::from_u8(state).map(|state| LedgerEntry { state, position, item });
            let verdict = match &entry {
                Some(entry) => check_ledger_entry(entry, catalog),
                None => below("state", state, 3u8),
            };
            match (entry, verdict) {
                (Some(entry), Ok(())) => {
                    level.items.set(slot, entry);
                }
                (_, verdict) => log_reset("item", slot, verdict),
            }
        }

        let count = reader.read_u8()? as usize;
        if count > MAX_OBJECTS {
            return Err(DeltaError::TooManyObjects {
                count,
                max: MAX_OBJECTS,
            });
        }
        for index in 0..count {
            let position = reader.read_tile()?;
            let tag = reader.read_u8()?;
            let action = CommandTag::from_u8(tag).and_then(ObjectAction::from_tag);
            let verdict = in_bounds(position).and_then(|_| exists("action", tag, action.is_some()));
            match (action, verdict) {
                (Some(action), Ok(())) => {
                    level.objects.insert(position, action);
                }
                (_, verdict) => log_reset("object", index, verdict),
            }
        }

        for slot in 0..MAX_MONSTERS {
            if reader.peek_u8() == Some(EMPTY_MARKER) {
                reader.read_u8()?;
                continue;
            }
            let monster = MonsterDelta {
                position: reader.read_tile()?,
                enemy: reader.read_u8()?,
                active: reader.read_u8()?,
                hit_points: reader.read_i32()?,
                who_hit: reader.read_u8()?,
            };
            match check_monster(&monster) {
                Ok(()) => {
                    level.monsters.set(slot, monster);
                }
                verdict => log_reset("monster", slot, verdict),
            }
        }
        level.reconcile_enemies();

        let count = reader.read_u16()? as usize;
        if count > MAX_MONSTERS {
            return Err(DeltaError::TooManySpawned {
                count,
                max: MAX_MONSTERS,
            });
        }
        for index in 0..count {
            let slot = reader.read_u16()?;
            let spawned = SpawnedMonster {
                type_index: reader.read_u16()?,
                seed: reader.read_u32()?,
                owner: reader.read_u8()?,
                spell_level: reader.read_u8()?,
            };
            match check_spawned(slot, &spawned, catalog) {
                Ok(()) => {
                    level.spawned.insert(slot, spawned);
                }
                verdict => log_reset("spawned", index, verdict),
            }
        }

        Ok(level)
    }

    /// SHA-256 digest of the canonical export.
    pub fn digest(&self) -> StateHash {
        let mut hasher = StateHasher::for_delta_level();
        hasher.update_bytes(&self.export());
        hasher.finalize()
    }
}

fn check_ledger_entry(entry: &LedgerEntry, catalog: &dyn CatalogProvider) -> Verdict {
    all_of([
        in_bounds(entry.position),
        exists("item_index", entry.item.def.index, catalog.is_item_available(entry.item.def.index)),
    ])
}

fn check_monster(monster: &MonsterDelta) -> Verdict {
    in_bounds(monster.position)?;
    in_range("hit_points", monster.hit_points, UNDAMAGED as i64, i32::MAX as i64)?;
    let enemy_ok = monster.enemy == NO_ENEMY || (monster.enemy as usize) < MAX_PLAYERS as usize + MAX_MONSTERS;
    agrees("enemy", monster.enemy, enemy_ok, "enemy names neither a player nor a monster")
}

fn check_spawned(slot: u16, spawned: &SpawnedMonster, catalog: &dyn CatalogProvider) -> Verdict {
    all_of([
        below("slot", slot, MAX_MONSTERS as u16),
        below("type_index", spawned.type_index, catalog.monster_type_count()),
        below("owner", spawned.owner, MAX_PLAYERS),
    ])
}

fn log_reset(table: &'static str, slot: usize, verdict: Verdict) {
    if let Err(rejection) = verdict {
        debug!(table, slot, %rejection, "Reset malformed delta entry");
    }
}

fn expect_end(reader: &WireReader<'_>) -> Result<(), DeltaError> {
    match reader.remaining() {
        0 => Ok(()),
        extra => Err(DeltaError::TrailingBytes { extra }),
    }
}

// =============================================================================
// JUNK
// =============================================================================

const INVALID_QUEST: QuestDelta = QuestDelta {
    state: EMPTY_MARKER,
    log: 0,
    var1: 0,
    var2: 0,
    message: 0,
};

impl Junk {
    /// Serialize portals and every multiplayer quest.
    ///
    /// Quests without a record are written with the invalid state so the
    /// layout only depends on the catalog.
    pub fn export(&self, catalog: &dyn CatalogProvider) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(MAX_JUNK_EXPORT);
        for slot in self.portals.slots() {
            match slot {
                Slot::Empty => writer.write_u8(EMPTY_MARKER),
                Slot::Occupied(portal) => {
                    writer.write_tile(portal.position);
                    writer.write_u8(portal.level);
                    writer.write_u8(portal.level_type);
                    writer.write_u8(portal.is_set_level as u8);
                }
            }
        }
        for quest in catalog.eligible_quests() {
            let record = self.quests.get(&quest).copied().unwrap_or(INVALID_QUEST);
            writer.write_u8(record.state);
            writer.write_u8(record.log);
            writer.write_u8(record.var1);
            writer.write_u8(record.var2);
            writer.write_i16(record.message);
        }
        writer.into_inner()
    }

    /// Rebuild the table from export bytes.
    pub fn import(bytes: &[u8], catalog: &dyn CatalogProvider) -> Result<Self, DeltaError> {
        let mut reader = WireReader::new(bytes);
        let mut portals = SlotArena::with_capacity(MAX_PORTALS);

        for player in 0..MAX_PORTALS {
            if reader.peek_u8() == Some(EMPTY_MARKER) {
                reader.read_u8()?;
                continue;
            }
            let position = reader.read_tile()?;
            let level = reader.read_u8()?;
            let level_type = reader.read_u8()?;
            let is_set_level = reader.read_u8()?;
            let verdict = portal(catalog, position, level.into(), level_type.into(), is_set_level.into());
            match verdict {
                Ok(()) => {
                    portals.set(
                        player,
                        PortalDelta {
                            position,
                            level,
                            level_type,
                            is_set_level: is_set_level == 1,
                        },
                    );
                }
                verdict => log_reset("portal", player, verdict),
            }
        }

        let mut quests = BTreeMap::new();
        for quest in catalog.eligible_quests() {
            let record = QuestDelta {
                state: reader.read_u8()?,
                log: reader.read_u8()?,
                var1: reader.read_u8()?,
                var2: reader.read_u8()?,
                message: reader.read_i16()?,
            };
            if record.state == EMPTY_MARKER {
                continue;
            }
            let verdict = all_of([
                at_most("quest", quest, MAX_QUESTS as u8 - 1),
                consistent(
                    "state",
                    record.state,
                    check_quest_record(catalog, quest, record.state, record.log, record.message),
                ),
            ]);
            match verdict {
                Ok(()) => {
                    quests.insert(quest, record);
                }
                verdict => log_reset("quest", quest as usize, verdict),
            }
        }

        expect_end(&reader)?;
        Ok(Self { portals, quests })
    }

    /// SHA-256 digest of the canonical export.
    pub fn digest(&self, catalog: &dyn CatalogProvider) -> StateHash {
        let mut hasher = StateHasher::for_junk();
        hasher.update_bytes(&self.export(catalog));
        hasher.finalize()
    }
}

// =============================================================================
// CHUNK COMPRESSION
// =============================================================================

/// Prefix a payload with its compression flag.
///
/// With a compression level the payload is zstd-compressed, but only kept
/// compressed when that is smaller than the raw bytes.
pub fn pack_chunk(payload: &[u8], compression_level: Option<i32>) -> Vec<u8> {
    if let Some(level) = compression_level {
        match zstd::bulk::compress(payload, level) {
            Ok(compressed) if compressed.len() < payload.len() => {
                let mut chunk = Vec::with_capacity(1 + compressed.len());
                chunk.push(FLAG_COMPRESSED);
                chunk.extend_from_slice(&compressed);
                return chunk;
            }
            Ok(_) => {}
            Err(err) => debug!(%err, "Compression failed, sending raw"),
        }
    }
    let mut chunk = Vec::with_capacity(1 + payload.len());
    chunk.push(FLAG_RAW);
    chunk.extend_from_slice(payload);
    chunk
}

/// Strip the compression flag and decompress if needed.
pub fn unpack_chunk(chunk: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let (&flag, payload) = chunk.split_first().ok_or(DeltaError::EmptyChunk)?;
    match flag {
        FLAG_RAW => Ok(payload.to_vec()),
        FLAG_COMPRESSED => {
            zstd::bulk::decompress(payload, MAX_LEVEL_EXPORT).map_err(|_| DeltaError::Decompression {
                payload_size: payload.len(),
            })
        }
        other => Err(DeltaError::UnknownCompressionFlag(other)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::core::tile::TilePosition;
    use crate::delta::level::{ItemEvent, MonsterEvent};
    use crate::protocol::{ItemDef, ItemRecord};

    fn item(seed: u32) -> ItemRecord {
        ItemRecord {
            durability: 20,
            max_durability: 30,
            value: 150,
            ..ItemRecord::from_def(ItemDef {
                seed,
                index: 7,
                create_info: 3,
            })
        }
    }

    fn sample_level() -> DeltaLevel {
        let mut level = DeltaLevel::new();
        level
            .apply_item_event(ItemEvent::FloorSpawn {
                position: TilePosition::new(10, 12),
                item: item(1234),
            })
            .unwrap();
        level
            .apply_item_event(ItemEvent::Dropped {
                position: TilePosition::new(11, 12),
                item: item(99),
            })
            .unwrap();
        level.apply_object_event(TilePosition::new(30, 31), ObjectAction::Open).unwrap();
        level.apply_monster_event(
            2,
            MonsterEvent::Observed(MonsterDelta {
                position: TilePosition::new(40, 41),
                enemy: 1,
                active: 0,
                hit_points: 77,
                who_hit: 3,
            }),
        );
        level.apply_monster_event(5, MonsterEvent::Killed { position: TilePosition::new(42, 43) });
        level.apply_spawn_event(
            9,
            SpawnedMonster {
                type_index: 20,
                seed: 55,
                owner: 1,
                spell_level: 3,
            },
            TilePosition::new(44, 45),
        );
        level
    }

    #[test]
    fn test_empty_level_is_compact() {
        let bytes = DeltaLevel::new().export();
        assert_eq!(bytes.len(), MAX_ITEMS + 1 + MAX_MONSTERS + 2);
        assert!(bytes[..MAX_ITEMS].iter().all(|&b| b == EMPTY_MARKER));
    }

    #[test]
    fn test_level_round_trip() {
        let catalog = StaticCatalog::default();
        let level = sample_level();
        let imported = DeltaLevel::import(&level.export(), &catalog).unwrap();
        assert_eq!(imported, level);
        assert_eq!(imported.digest(), level.digest());
    }

    #[test]
    fn test_sentinel_distinct_from_dead() {
        let catalog = StaticCatalog::default();
        let imported = DeltaLevel::import(&sample_level().export(), &catalog).unwrap();
        assert!(imported.monsters().get(5).unwrap().is_dead());
        assert!(imported.monsters().get(4).is_none());
        assert!(imported.items().get(2).is_none());
    }

    #[test]
    fn test_import_is_idempotent() {
        let catalog = StaticCatalog::default();
        let bytes = sample_level().export();
        let once = DeltaLevel::import(&bytes, &catalog).unwrap();
        let twice = DeltaLevel::import(&once.export(), &catalog).unwrap();
        assert_eq!(once.export(), twice.export());
    }

    #[test]
    fn test_malformed_entries_reset() {
        let catalog = StaticCatalog::default();
        let mut level = sample_level();
        level.items.set(
            3,
            LedgerEntry {
                state: ItemState::Floor,
                position: TilePosition::new(200, 5),
                item: item(3),
            },
        );
        level.monsters.set(
            7,
            MonsterDelta {
                position: TilePosition::new(1, 1),
                enemy: NO_ENEMY,
                active: 0,
                hit_points: -5,
                who_hit: 0,
            },
        );
        let imported = DeltaLevel::import(&level.export(), &catalog).unwrap();
        assert!(imported.items().get(3).is_none());
        assert!(imported.monsters().get(7).is_none());
        assert_eq!(imported, sample_level());
    }

    #[test]
    fn test_unknown_item_state_resets_slot() {
        let catalog = StaticCatalog::default();
        let mut bytes = sample_level().export();
        bytes[0] = 7;
        let imported = DeltaLevel::import(&bytes, &catalog).unwrap();
        assert!(imported.items().get(0).is_none());
        assert!(imported.items().get(1).is_some());
    }

    #[test]
    fn test_enemy_of_dead_monster_cleared_on_import() {
        let catalog = StaticCatalog::default();
        let mut level = sample_level();
        level.monsters.set(
            3,
            MonsterDelta {
                position: TilePosition::new(2, 2),
                enemy: MAX_PLAYERS + 5,
                active: 1,
                hit_points: 10,
                who_hit: 0,
            },
        );
        let imported = DeltaLevel::import(&level.export(), &catalog).unwrap();
        assert_eq!(imported.monsters().get(3).unwrap().enemy, NO_ENEMY);
    }

    #[test]
    fn test_structural_errors_fail_import() {
        let catalog = StaticCatalog::default();
        let bytes = sample_level().export();

        let err = DeltaLevel::import(&bytes[..bytes.len() - 1], &catalog).unwrap_err();
        assert!(matches!(err, DeltaError::Codec(_)));

        let mut extra = bytes.clone();
        extra.push(0);
        assert_eq!(
            DeltaLevel::import(&extra, &catalog).unwrap_err(),
            DeltaError::TrailingBytes { extra: 1 }
        );

        let mut objects = DeltaLevel::new().export();
        objects[MAX_ITEMS] = 200;
        assert!(matches!(
            DeltaLevel::import(&objects, &catalog),
            Err(DeltaError::TooManyObjects { count: 200, .. })
        ));
    }

    #[test]
    fn test_full_object_log_round_trips() {
        let catalog = StaticCatalog::default();
        let mut level = DeltaLevel::new();
        for n in 0..MAX_OBJECTS {
            let position = TilePosition::new((n % 100) as u8, (n / 100) as u8);
            level.apply_object_event(position, ObjectAction::Break).unwrap();
        }
        let bytes = level.export();
        assert_eq!(bytes[MAX_ITEMS] as usize, MAX_OBJECTS);

        let imported = DeltaLevel::import(&bytes, &catalog).unwrap();
        assert_eq!(imported.objects().len(), MAX_OBJECTS);
        assert_eq!(imported.export(), bytes);
    }

    #[test]
    fn test_junk_round_trip_and_validation() {
        let catalog = StaticCatalog::default();
        let mut junk = Junk::new();
        junk.open_portal(
            0,
            PortalDelta {
                position: TilePosition::new(60, 70),
                level: 5,
                level_type: 2,
                is_set_level: false,
            },
        );
        // Level 1 is a cathedral level, not caves.
        junk.open_portal(
            1,
            PortalDelta {
                position: TilePosition::new(60, 70),
                level: 1,
                level_type: 3,
                is_set_level: false,
            },
        );
        junk.apply_quest(
            5,
            QuestDelta {
                state: 2,
                log: 1,
                var1: 4,
                var2: 0,
                message: 12,
            },
        );
        junk.apply_quest(
            6,
            QuestDelta {
                state: 2,
                log: 3,
                var1: 0,
                var2: 0,
                message: 0,
            },
        );

        let bytes = junk.export(&catalog);
        let eligible = catalog.eligible_quests().len();
        assert_eq!(bytes.len(), 1 + 2 * PortalDelta::SIZE + 1 + eligible * QuestDelta::SIZE);

        let imported = Junk::import(&bytes, &catalog).unwrap();
        assert!(imported.portal(0).is_some());
        assert!(imported.portal(1).is_none());
        assert_eq!(imported.quest(5), junk.quest(5));
        assert!(imported.quest(6).is_none());
        assert!(imported.quest(7).is_none());
    }

    #[test]
    fn test_pack_chunk_prefers_smaller() {
        let payload = DeltaLevel::new().export();
        let packed = pack_chunk(&payload, Some(3));
        assert_eq!(packed[0], FLAG_COMPRESSED);
        assert!(packed.len() < payload.len());
        assert_eq!(unpack_chunk(&packed).unwrap(), payload);

        let tiny = [1u8, 2, 3];
        let packed = pack_chunk(&tiny, Some(3));
        assert_eq!(packed, vec![FLAG_RAW, 1, 2, 3]);
        assert_eq!(pack_chunk(&payload, None)[0], FLAG_RAW);
    }

    #[test]
    fn test_unpack_errors() {
        assert_eq!(unpack_chunk(&[]), Err(DeltaError::EmptyChunk));
        assert_eq!(unpack_chunk(&[9, 1]), Err(DeltaError::UnknownCompressionFlag(9)));
        assert!(matches!(
            unpack_chunk(&[FLAG_COMPRESSED, 1, 2, 3, 4]),
            Err(DeltaError::Decompression { payload_size: 4 })
        ));
    }
}
