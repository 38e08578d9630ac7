//! Per-Command Validation Rules
//!
//! One predicate chain per record shape, checking every field a remote
//! peer controls against bounds and the loaded catalogs. Validation is a
//! pure function; nothing here touches the delta store or simulation.

use crate::catalog::{check_item_origin, check_quest_record, CatalogProvider, LevelType};
use crate::core::limits::{
    BELT_SLOTS, INVENTORY_CELLS, MAX_DAMAGE_TYPE, MAX_DEATH_REASON, MAX_DIRECTION, MAX_ITEMS,
    MAX_MONSTERS, MAX_OBJECTS, MAX_PLAYER_DAMAGE, MAX_PLAYER_INFO, MAX_PORTALS, MAX_QUESTS,
    MAX_SPELL_LEVEL, MAX_SPELL_TYPE, MAX_STAT_DELTA, MAX_STAT_VALUE, MAX_TRANSITION,
    NUM_BODY_SLOTS, SPELL_FROM_BELT_FIRST, SPELL_FROM_BELT_LAST, SPELL_FROM_INVENTORY_FIRST,
    SPELL_FROM_INVENTORY_LAST, TRANSITION_SET_LEVEL,
};
use crate::core::tile::{LevelId, TilePosition};
use crate::protocol::{
    ChangeItemBody, Command, CommandTag, GetItemBody, ItemRecord, PlayerDamageBody, QuestBody,
    SpawnMonsterBody,
};

use super::combinator::{
    agrees, all_of, at_most, below, consistent, exists, in_bounds, is_one_of, Reason, Rejection,
    Verdict,
};

/// What validation may consult besides the record itself.
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Game-domain catalogs.
    pub catalog: &'a dyn CatalogProvider,
    /// Player slots in this session.
    pub max_players: u8,
}

impl<'a> ValidationContext<'a> {
    /// Context over a catalog.
    pub fn new(catalog: &'a dyn CatalogProvider, max_players: u8) -> Self {
        Self {
            catalog,
            max_players,
        }
    }
}

/// Validate a record received from a remote peer.
pub fn validate(command: &Command, ctx: &ValidationContext<'_>) -> Verdict {
    use CommandTag as T;

    match command {
        Command::Bare(_) | Command::Chat { .. } => Ok(()),

        Command::Loc { position, .. } => in_bounds(*position),

        Command::LocParam1 { tag, position, param } => {
            in_bounds(*position)?;
            match tag {
                T::TalkTile => below("towner", *param, ctx.catalog.towner_count()),
                T::MonsterDeath => below("monster", *param, MAX_MONSTERS as i64),
                T::GotoGetItem | T::GotoAutoGetItem => below("item", *param, MAX_ITEMS as i64),
                _ => Ok(()),
            }
        }

        Command::LocParam2 {
            position,
            params: [level, is_set_level],
            ..
        } => {
            all_of([in_bounds(*position), is_one_of("is_set_level", *is_set_level, &[0, 1])])?;
            level_for_mode("level", *level, *is_set_level == 1)
        }

        Command::LocParam3 { tag, position, params } => {
            in_bounds(*position)?;
            match tag {
                T::SpellTile => spell_cast(ctx, params[0], params[1], params[2]),
                T::ActivatePortal => portal(ctx.catalog, *position, params[0], params[1], params[2]),
                _ => Ok(()),
            }
        }

        Command::LocParam4 { position, params, .. } => {
            all_of([in_bounds(*position), at_most("direction", params[2], MAX_DIRECTION)])?;
            spell_cast(ctx, params[0], params[1], params[3])
        }

        Command::Param1 { tag, param } => single_param(ctx, *tag, *param),

        Command::Param2 {
            params: [mode, level],
            ..
        } => {
            at_most("mode", *mode, MAX_TRANSITION)?;
            level_for_mode("level", *level, *mode == TRANSITION_SET_LEVEL)
        }

        Command::Param4 { tag, params } => {
            match tag {
                T::SpellMonster => below("monster", params[0], MAX_MONSTERS as i64)?,
                T::SpellPlayer => below("player", params[0], ctx.max_players)?,
                _ => {}
            }
            spell_cast(ctx, params[1], params[2], params[3])
        }

        Command::GetItem { body, .. } => get_item(ctx, body),

        Command::PutItem { body, .. } => {
            in_bounds(body.position)?;
            item_origin(ctx, &body.item)
        }

        Command::ChangeItem { tag, body } => change_item(ctx, *tag, body),

        Command::DeleteBodyItem { slot } => below("body_slot", *slot, NUM_BODY_SLOTS),

        Command::PlayerDamage(body) => player_damage(ctx, body),

        Command::MonsterDamage(body) => below("monster", body.monster, MAX_MONSTERS as i64),

        Command::Quest(body) => quest(ctx, body),

        Command::SpawnMonster(body) => spawn_monster(ctx, body),

        Command::Chunk { tag, body } => match tag {
            T::SendPlayerInfo | T::AckPlayerInfo => at_most(
                "player_info_end",
                body.offset as i64 + body.data.len() as i64,
                MAX_PLAYER_INFO as i64,
            ),
            _ => Ok(()),
        },

        Command::SetDestination(dest) => Err(Rejection {
            rule: "is_one_of",
            field: "tag",
            value: dest.to_byte() as i64,
            reason: Reason::Inconsistent("transport marker sent as a command"),
        }),
    }
}

// =============================================================================
// SHARED PREDICATES
// =============================================================================

fn single_param(ctx: &ValidationContext<'_>, tag: CommandTag, param: u16) -> Verdict {
    use CommandTag as T;

    match tag {
        T::AttackMonster | T::RangedAttackMonster | T::Knockback => {
            below("monster", param, MAX_MONSTERS as i64)
        }
        T::AttackPlayer | T::RangedAttackPlayer | T::Resurrect | T::HealOther => {
            below("player", param, ctx.max_players)
        }
        T::TelekinesisObject => below("object", param, MAX_OBJECTS as i64),
        T::Warp => below("portal", param, MAX_PORTALS as i64),
        T::AddStrength | T::AddMagic | T::AddDexterity | T::AddVitality => {
            at_most("stat_delta", param, MAX_STAT_DELTA)
        }
        T::SetStrength | T::SetMagic | T::SetDexterity | T::SetVitality => {
            at_most("stat_value", param, MAX_STAT_VALUE)
        }
        T::DeleteInventoryItem => below("inventory_cell", param, INVENTORY_CELLS),
        T::DeleteBeltItem => below("belt_slot", param, BELT_SLOTS),
        T::PlayerDeath => at_most("death_reason", param, MAX_DEATH_REASON),
        _ => Ok(()),
    }
}

fn level_for_mode(field: &'static str, level: u16, is_set_level: bool) -> Verdict {
    let found = u8::try_from(level)
        .ok()
        .and_then(|level| LevelId::for_multiplayer(level, is_set_level))
        .is_some();
    exists(field, level, found)
}

fn spell_cast(ctx: &ValidationContext<'_>, spell: u16, spell_type: u16, spell_from: u16) -> Verdict {
    let from_ok = spell_from == 0
        || (SPELL_FROM_INVENTORY_FIRST..=SPELL_FROM_INVENTORY_LAST).contains(&spell_from)
        || (SPELL_FROM_BELT_FIRST..=SPELL_FROM_BELT_LAST).contains(&spell_from);

    all_of([
        exists("spell", spell, ctx.catalog.spell(spell).is_some()),
        at_most("spell_type", spell_type, MAX_SPELL_TYPE),
        agrees("spell_from", spell_from, from_ok, "not a body, inventory or belt source"),
    ])
}

/// Check a portal's destination against the level catalog.
pub fn portal(
    catalog: &dyn CatalogProvider,
    position: TilePosition,
    level: u16,
    level_type: u16,
    is_set_level: u16,
) -> Verdict {
    all_of([in_bounds(position), is_one_of("is_set_level", is_set_level, &[0, 1])])?;
    level_for_mode("level", level, is_set_level == 1)?;

    let known = u8::try_from(level_type).ok().and_then(LevelType::from_u8);
    exists("level_type", level_type, known.is_some())?;

    let expected = LevelId::for_multiplayer(level as u8, is_set_level == 1)
        .and_then(|id| catalog.level_type(id));
    agrees("level_type", level_type, known == expected, "level type does not match level")
}

fn item_available(ctx: &ValidationContext<'_>, item: &ItemRecord) -> Verdict {
    exists("item_index", item.def.index, ctx.catalog.is_item_available(item.def.index))
}

fn item_origin(ctx: &ValidationContext<'_>, item: &ItemRecord) -> Verdict {
    let index = item.def.index;
    let entry = match ctx.catalog.item(index) {
        Some(entry) if entry.available => entry,
        _ => return exists("item_index", index, false),
    };
    consistent(
        "create_info",
        item.def.create_info,
        check_item_origin(entry, item.def.create_info),
    )
}

fn get_item(ctx: &ValidationContext<'_>, body: &GetItemBody) -> Verdict {
    all_of([
        below("master", body.master, ctx.max_players),
        below("player", body.player, ctx.max_players),
        at_most("cursor_item", body.cursor_item, MAX_ITEMS as i64),
        exists("level", body.level, LevelId(body.level).is_valid()),
        in_bounds(body.position),
        item_available(ctx, &body.item),
    ])
}

fn change_item(ctx: &ValidationContext<'_>, tag: CommandTag, body: &ChangeItemBody) -> Verdict {
    let slot = match tag {
        CommandTag::ChangeBodyItem => below("body_slot", body.slot, NUM_BODY_SLOTS),
        CommandTag::ChangeInventoryItem => below("inventory_cell", body.slot, INVENTORY_CELLS),
        _ => below("belt_slot", body.slot, BELT_SLOTS),
    };
    all_of([slot, item_available(ctx, &body.item)])
}

fn player_damage(ctx: &ValidationContext<'_>, body: &PlayerDamageBody) -> Verdict {
    all_of([
        below("target", body.target, ctx.max_players),
        at_most("damage", body.damage, MAX_PLAYER_DAMAGE),
        at_most("damage_type", body.kind, MAX_DAMAGE_TYPE),
    ])
}

fn quest(ctx: &ValidationContext<'_>, body: &QuestBody) -> Verdict {
    below("quest", body.quest, MAX_QUESTS as i64)?;
    agrees(
        "quest",
        body.quest,
        ctx.catalog.eligible_quests().contains(&body.quest),
        "quest is not synchronized in multiplayer",
    )?;
    consistent(
        "quest_state",
        body.state,
        check_quest_record(ctx.catalog, body.quest, body.state, body.log, body.message),
    )
}

fn spawn_monster(ctx: &ValidationContext<'_>, body: &SpawnMonsterBody) -> Verdict {
    all_of([
        in_bounds(body.position),
        at_most("direction", body.direction, MAX_DIRECTION),
        below("type_index", body.type_index, ctx.catalog.monster_type_count()),
        below("slot", body.slot, MAX_MONSTERS as i64),
        below("owner", body.owner, ctx.max_players),
        at_most("spell_level", body.spell_level, MAX_SPELL_LEVEL),
    ])
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CreationFlags, ItemInconsistency, QuestInconsistency, QuestState, StaticCatalog};
    use crate::core::tile::NUM_LEVELS;
    use crate::protocol::{Destination, ItemDef, PutItemBody};

    fn check(command: &Command) -> Verdict {
        let catalog = StaticCatalog::default();
        validate(command, &ValidationContext::new(&catalog, 4))
    }

    fn item(index: u16, create_info: u16) -> ItemRecord {
        ItemRecord::from_def(ItemDef {
            seed: 1234,
            index,
            create_info,
        })
    }

    #[test]
    fn test_walk_bounds() {
        assert!(check(&Command::walk(TilePosition::new(10, 12))).is_ok());
        let err = check(&Command::walk(TilePosition::new(200, 12))).unwrap_err();
        assert_eq!(err.field, "x");
        assert_eq!(err.value, 200);
    }

    #[test]
    fn test_stat_caps() {
        assert!(check(&Command::with_param(CommandTag::AddStrength, 256)).is_ok());
        assert!(check(&Command::with_param(CommandTag::AddStrength, 257)).is_err());
        assert!(check(&Command::with_param(CommandTag::SetVitality, 750)).is_ok());
        let err = check(&Command::with_param(CommandTag::SetVitality, 751)).unwrap_err();
        assert_eq!(err.field, "stat_value");
    }

    #[test]
    fn test_target_indices() {
        assert!(check(&Command::with_param(CommandTag::AttackMonster, 199)).is_ok());
        assert!(check(&Command::with_param(CommandTag::AttackMonster, 200)).is_err());
        assert!(check(&Command::with_param(CommandTag::AttackPlayer, 3)).is_ok());
        assert!(check(&Command::with_param(CommandTag::AttackPlayer, 4)).is_err());
        assert!(check(&Command::with_param(CommandTag::Warp, 4)).is_err());
    }

    #[test]
    fn test_illegal_creation_flags_rejected() {
        let put = Command::PutItem {
            tag: CommandTag::PutItem,
            body: PutItemBody {
                position: TilePosition::new(10, 12),
                item: item(7, CreationFlags::SMITH | CreationFlags::UNIQUE),
            },
        };
        let err = check(&put).unwrap_err();
        assert_eq!(err.field, "create_info");
        assert_eq!(err.reason, Reason::Item(ItemInconsistency::IllegalFlags));
    }

    #[test]
    fn test_item_must_match_vendor() {
        let put = Command::put_item(
            CommandTag::PutItem,
            TilePosition::new(10, 12),
            item(7, CreationFlags::SMITH | 3),
        );
        assert_eq!(
            check(&put).unwrap_err().reason,
            Reason::Item(ItemInconsistency::NotSoldByVendor)
        );

        let witch = Command::put_item(
            CommandTag::PutItem,
            TilePosition::new(10, 12),
            item(7, CreationFlags::WITCH | 3),
        );
        assert!(check(&witch).is_ok());
    }

    #[test]
    fn test_unavailable_item_rejected() {
        let put = Command::put_item(CommandTag::DropItem, TilePosition::new(1, 1), item(15, 5));
        assert_eq!(check(&put).unwrap_err().reason, Reason::UnknownId);
    }

    #[test]
    fn test_spell_chain() {
        let cast = |spell, spell_type, from| Command::LocParam3 {
            tag: CommandTag::SpellTile,
            position: TilePosition::new(5, 5),
            params: [spell, spell_type, from],
        };
        assert!(check(&cast(1, 1, 0)).is_ok());
        assert!(check(&cast(1, 3, 47)).is_ok());
        assert_eq!(check(&cast(99, 1, 0)).unwrap_err().field, "spell");
        assert_eq!(check(&cast(1, 5, 0)).unwrap_err().field, "spell_type");
        assert_eq!(check(&cast(1, 1, 3)).unwrap_err().field, "spell_from");
        assert_eq!(check(&cast(1, 1, 55)).unwrap_err().field, "spell_from");
    }

    #[test]
    fn test_spell_wall_direction() {
        let wall = |direction| Command::LocParam4 {
            tag: CommandTag::SpellWall,
            position: TilePosition::new(5, 5),
            params: [6, 1, direction, 0],
        };
        assert!(check(&wall(7)).is_ok());
        assert_eq!(check(&wall(8)).unwrap_err().field, "direction");
    }

    #[test]
    fn test_new_level_modes() {
        let new_level = |mode, level| Command::Param2 {
            tag: CommandTag::NewLevel,
            params: [mode, level],
        };
        assert!(check(&new_level(0, 4)).is_ok());
        assert!(check(&new_level(0, NUM_LEVELS as u16)).is_err());
        assert!(check(&new_level(TRANSITION_SET_LEVEL, 3)).is_ok());
        assert!(check(&new_level(TRANSITION_SET_LEVEL, 0)).is_err());
        assert_eq!(check(&new_level(8, 1)).unwrap_err().field, "mode");
    }

    #[test]
    fn test_quest_state_legal_for_quest() {
        let sync = |quest, state| {
            Command::Quest(QuestBody {
                quest,
                state,
                log: 0,
                var1: 0,
                var2: 0,
                message: 0,
            })
        };
        assert!(check(&sync(5, QuestState::Active as u8)).is_ok());
        assert!(check(&sync(17, QuestState::HiveActive as u8)).is_ok());
        assert_eq!(
            check(&sync(5, QuestState::HiveActive as u8)).unwrap_err().reason,
            Reason::Quest(QuestInconsistency::StateNotAllowed)
        );
        assert_eq!(check(&sync(24, 0)).unwrap_err().field, "quest");
    }

    #[test]
    fn test_single_player_quest_rejected() {
        let sync = Command::Quest(QuestBody {
            quest: 1,
            state: QuestState::Active as u8,
            log: 0,
            var1: 0,
            var2: 0,
            message: 0,
        });
        let err = check(&sync).unwrap_err();
        assert_eq!(err.field, "quest");
        assert_eq!(err.value, 1);
        assert!(matches!(err.reason, Reason::Inconsistent(_)));
    }

    #[test]
    fn test_portal_level_type() {
        let open = |level, level_type, set| Command::LocParam3 {
            tag: CommandTag::ActivatePortal,
            position: TilePosition::new(30, 30),
            params: [level, level_type, set],
        };
        assert!(check(&open(3, LevelType::Cathedral as u16, 0)).is_ok());
        assert!(check(&open(2, LevelType::Catacombs as u16, 1)).is_ok());
        assert_eq!(
            check(&open(3, LevelType::Caves as u16, 0)).unwrap_err().reason,
            Reason::Inconsistent("level type does not match level")
        );
        assert_eq!(check(&open(3, 9, 0)).unwrap_err().field, "level_type");
        assert_eq!(check(&open(3, 1, 2)).unwrap_err().field, "is_set_level");
    }

    #[test]
    fn test_player_damage_cap() {
        let hit = |damage| {
            Command::PlayerDamage(PlayerDamageBody {
                target: 1,
                damage,
                kind: 0,
            })
        };
        assert!(check(&hit(MAX_PLAYER_DAMAGE)).is_ok());
        assert_eq!(check(&hit(MAX_PLAYER_DAMAGE + 1)).unwrap_err().field, "damage");
    }

    #[test]
    fn test_spawn_monster_fields() {
        let spawn = |owner, type_index| {
            Command::SpawnMonster(SpawnMonsterBody {
                position: TilePosition::new(20, 20),
                direction: 1,
                type_index,
                slot: 4,
                seed: 99,
                owner,
                spell_level: 3,
            })
        };
        assert!(check(&spawn(0, 10)).is_ok());
        assert_eq!(check(&spawn(4, 10)).unwrap_err().field, "owner");
        assert_eq!(check(&spawn(0, 112)).unwrap_err().field, "type_index");
    }

    #[test]
    fn test_transport_marker_rejected() {
        let marker = Command::SetDestination(Destination::Peer(1));
        assert!(check(&marker).is_err());
    }

    #[test]
    fn test_change_item_slots() {
        let change = |tag, slot| Command::ChangeItem {
            tag,
            body: ChangeItemBody {
                slot,
                item: item(1, 3),
                force_spell: false,
            },
        };
        assert!(check(&change(CommandTag::ChangeBodyItem, 6)).is_ok());
        assert!(check(&change(CommandTag::ChangeBodyItem, 7)).is_err());
        assert!(check(&change(CommandTag::ChangeInventoryItem, 39)).is_ok());
        assert!(check(&change(CommandTag::ChangeBeltItem, 8)).is_err());
    }
}
