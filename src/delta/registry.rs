//! Delta Registry
//!
//! Session-scoped owner of every level's delta store and the junk table.
//! Stores are created explicitly on first mutation and evicted when their
//! level is permanently left.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::catalog::CatalogProvider;
use crate::core::hash::{short_hex, StateHash, StateHasher};
use crate::core::tile::LevelId;
use crate::protocol::CodecError;

use super::junk::Junk;
use super::level::DeltaLevel;
use super::DeltaError;

/// All delta stores of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaRegistry {
    levels: BTreeMap<LevelId, DeltaLevel>,
    junk: Junk,
}

impl DeltaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store of a level, if one exists.
    pub fn level(&self, id: LevelId) -> Option<&DeltaLevel> {
        self.levels.get(&id)
    }

    /// Store of a level, created on first use.
    pub fn level_mut(&mut self, id: LevelId) -> &mut DeltaLevel {
        self.levels.entry(id).or_insert_with(|| {
            debug!(level = %id, "Creating delta store");
            DeltaLevel::new()
        })
    }

    /// Drop a level's store.
    pub fn evict(&mut self, id: LevelId) -> Option<DeltaLevel> {
        self.levels.remove(&id)
    }

    /// Drop every store and reset junk.
    pub fn clear(&mut self) {
        self.levels.clear();
        self.junk = Junk::new();
    }

    /// Levels that have a store, ascending.
    pub fn level_ids(&self) -> impl Iterator<Item = LevelId> + '_ {
        self.levels.keys().copied()
    }

    /// Junk table.
    pub fn junk(&self) -> &Junk {
        &self.junk
    }

    /// Mutable junk table.
    pub fn junk_mut(&mut self) -> &mut Junk {
        &mut self.junk
    }

    /// Export a level as `[level id][store]`. Missing levels export empty.
    pub fn export_level(&self, id: LevelId) -> Vec<u8> {
        let mut bytes = vec![id.0];
        match self.levels.get(&id) {
            Some(level) => bytes.extend(level.export()),
            None => bytes.extend(DeltaLevel::new().export()),
        }
        bytes
    }

    /// Import a level export, replacing that level's store.
    ///
    /// The store is swapped in only after the whole export parsed, so a
    /// failed import leaves the registry untouched.
    pub fn import_level(&mut self, bytes: &[u8], catalog: &dyn CatalogProvider) -> Result<LevelId, DeltaError> {
        let (&raw, body) = bytes.split_first().ok_or(CodecError::Truncated {
            needed: 1,
            available: 0,
        })?;
        let id = LevelId(raw);
        if !id.is_valid() {
            return Err(DeltaError::InvalidLevel(raw));
        }
        let level = DeltaLevel::import(body, catalog)?;
        info!(level = %id, digest = %short_hex(&level.digest()), "Imported level delta");
        self.levels.insert(id, level);
        Ok(id)
    }

    /// Export the junk table.
    pub fn export_junk(&self, catalog: &dyn CatalogProvider) -> Vec<u8> {
        self.junk.export(catalog)
    }

    /// Import a junk export, replacing the junk table.
    pub fn import_junk(&mut self, bytes: &[u8], catalog: &dyn CatalogProvider) -> Result<(), DeltaError> {
        self.junk = Junk::import(bytes, catalog)?;
        info!(digest = %short_hex(&self.junk.digest(catalog)), "Imported junk delta");
        Ok(())
    }

    /// Digest over every non-empty level store and the junk table.
    ///
    /// Empty stores are skipped so a peer that merely visited a level
    /// matches one that never did.
    pub fn digest(&self, catalog: &dyn CatalogProvider) -> StateHash {
        let mut hasher = StateHasher::new(b"DUNGEON_SYNC_REGISTRY_V1");
        for (id, level) in &self.levels {
            if level.is_empty() {
                continue;
            }
            hasher.update_u8(id.0);
            hasher.update_bytes(&level.digest());
        }
        hasher.update_bytes(&self.junk.digest(catalog));
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::core::tile::TilePosition;
    use crate::delta::level::{ItemEvent, ItemState, ObjectAction};
    use crate::protocol::{ItemDef, ItemRecord};

    fn floor_item() -> ItemRecord {
        ItemRecord::from_def(ItemDef {
            seed: 1234,
            index: 7,
            create_info: 1,
        })
    }

    #[test]
    fn test_export_import_level() {
        let catalog = StaticCatalog::default();
        let mut a = DeltaRegistry::new();
        a.level_mut(LevelId(3))
            .apply_item_event(ItemEvent::FloorSpawn {
                position: TilePosition::new(10, 12),
                item: floor_item(),
            })
            .unwrap();

        let mut b = DeltaRegistry::new();
        let id = b.import_level(&a.export_level(LevelId(3)), &catalog).unwrap();
        assert_eq!(id, LevelId(3));
        let (_, entry) = b.level(id).unwrap().find_item(&floor_item().def).unwrap();
        assert_eq!(entry.state, ItemState::Floor);
        assert_eq!(entry.position, TilePosition::new(10, 12));
        assert_eq!(a.digest(&catalog), b.digest(&catalog));
    }

    #[test]
    fn test_import_replaces_wholesale() {
        let catalog = StaticCatalog::default();
        let mut a = DeltaRegistry::new();
        a.level_mut(LevelId(2)).apply_object_event(TilePosition::new(1, 1), ObjectAction::Open).unwrap();
        let export = a.export_level(LevelId(2));

        let mut b = DeltaRegistry::new();
        b.level_mut(LevelId(2)).apply_object_event(TilePosition::new(5, 5), ObjectAction::Break).unwrap();
        b.import_level(&export, &catalog).unwrap();
        let once = b.export_level(LevelId(2));
        b.import_level(&export, &catalog).unwrap();
        assert_eq!(b.export_level(LevelId(2)), once);
        assert_eq!(b.level(LevelId(2)).unwrap().objects().len(), 1);
    }

    #[test]
    fn test_failed_import_leaves_store() {
        let catalog = StaticCatalog::default();
        let mut registry = DeltaRegistry::new();
        registry.level_mut(LevelId(4)).apply_object_event(TilePosition::new(1, 1), ObjectAction::Open).unwrap();
        let before = registry.clone();

        let mut export = registry.export_level(LevelId(4));
        export.truncate(export.len() - 3);
        assert!(registry.import_level(&export, &catalog).is_err());
        assert_eq!(registry, before);

        let mut bad_level = registry.export_level(LevelId(4));
        bad_level[0] = 40;
        assert_eq!(registry.import_level(&bad_level, &catalog), Err(DeltaError::InvalidLevel(40)));
        assert!(registry.import_level(&[], &catalog).is_err());
    }

    #[test]
    fn test_evict_and_clear() {
        let mut registry = DeltaRegistry::new();
        registry.level_mut(LevelId(1));
        registry.level_mut(LevelId(27));
        assert_eq!(registry.level_ids().collect::<Vec<_>>(), vec![LevelId(1), LevelId(27)]);
        assert!(registry.evict(LevelId(1)).is_some());
        assert!(registry.level(LevelId(1)).is_none());
        registry.clear();
        assert_eq!(registry.level_ids().count(), 0);
    }

    #[test]
    fn test_digest_ignores_empty_stores() {
        let catalog = StaticCatalog::default();
        let mut visited = DeltaRegistry::new();
        visited.level_mut(LevelId(6));
        assert_eq!(visited.digest(&catalog), DeltaRegistry::new().digest(&catalog));
    }
}
