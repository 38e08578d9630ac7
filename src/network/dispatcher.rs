//! Command Dispatcher
//!
//! Decodes, validates and routes inbound records. Each tag maps to one
//! handler in a table built once at construction. While the local peer is
//! itself resynchronizing the dispatcher captures commands instead of
//! applying them, then replays them in arrival order.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::debug;

use crate::catalog::{CatalogProvider, LevelType};
use crate::core::tile::LevelId;
use crate::delta::{
    DeltaError, DeltaRegistry, ItemEvent, ItemOutcome, MonsterEvent, ObjectAction, PortalDelta, QuestDelta,
    SpawnedMonster,
};
use crate::protocol::{decode, CapturePolicy, CodecError, Command, CommandTag, Destination, GetItemBody, PeerId};
use crate::validate::{validate, Rejection, ValidationContext};

use super::resync::{ResyncCoordinator, ResyncError};
use super::simulation::{SimEvent, Simulation};
use super::transport::LeaveReason;

// =============================================================================
// ERRORS
// =============================================================================

/// How bad a dispatch failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged; nothing else happens.
    Recoverable,
    /// The sending peer is dropped.
    SenderFatal,
    /// The resync aborts and its authority is dropped.
    SessionFatal,
}

/// Dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Record could not be framed.
    #[error("Malformed record: {0}")]
    Codec(#[from] CodecError),

    /// Record failed validation.
    #[error("{tag} rejected: {rejection}")]
    Rejected {
        /// Command tag.
        tag: CommandTag,
        /// Failed check.
        rejection: Rejection,
    },

    /// Delta store refused the mutation.
    #[error("Delta store: {0}")]
    Delta(#[from] DeltaError),

    /// Resync failure.
    #[error("Resync: {0}")]
    Resync(#[from] ResyncError),

    /// Tag without a handler.
    #[error("No handler for {0}")]
    NoHandler(CommandTag),
}

impl DispatchError {
    /// Severity for the drop policy.
    pub fn severity(&self) -> Severity {
        match self {
            DispatchError::Codec(_) | DispatchError::Rejected { .. } | DispatchError::NoHandler(_) => {
                Severity::SenderFatal
            }
            DispatchError::Delta(DeltaError::DuplicateFloorItem { .. } | DeltaError::ObjectLogFull { .. }) => {
                Severity::SenderFatal
            }
            DispatchError::Delta(_) => Severity::Recoverable,
            DispatchError::Resync(err) if err.is_sender_fatal() => Severity::SenderFatal,
            DispatchError::Resync(_) => Severity::SessionFatal,
        }
    }

    /// Tag of the failing record, if known.
    pub fn tag(&self) -> Option<CommandTag> {
        match self {
            DispatchError::Rejected { tag, .. } | DispatchError::NoHandler(tag) => Some(*tag),
            DispatchError::Codec(CodecError::LayoutMismatch { tag }) => Some(*tag),
            _ => None,
        }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything a handler may touch.
pub struct HandlerContext<'a> {
    /// Local peer.
    pub local: PeerId,
    /// Maximum players in the game.
    pub max_players: u8,
    /// Delta stores.
    pub registry: &'a mut DeltaRegistry,
    /// Resync state machine.
    pub resync: &'a mut ResyncCoordinator,
    /// Catalogs.
    pub catalog: &'a dyn CatalogProvider,
    /// Simulation.
    pub sim: &'a mut dyn Simulation,
    /// Commands to send in response.
    pub replies: &'a mut Vec<(Destination, Command)>,
}

type Handler = fn(&mut HandlerContext<'_>, PeerId, Command) -> Result<(), DispatchError>;

/// Dispatcher mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Apply immediately.
    Live,
    /// Buffer without applying.
    Capture,
    /// Draining the capture buffer.
    Replay,
}

/// A buffered inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// Raw record from a peer.
    Command {
        /// Sender.
        sender: PeerId,
        /// Record bytes.
        bytes: Vec<u8>,
    },
    /// A peer left.
    PeerLeft {
        /// Peer.
        peer: PeerId,
        /// Reason.
        reason: LeaveReason,
    },
}

/// Inbound command dispatcher.
pub struct Dispatcher {
    mode: DispatchMode,
    handlers: [Option<Handler>; 256],
    captured: VecDeque<Captured>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a live dispatcher with the full handler table.
    pub fn new() -> Self {
        let mut handlers: [Option<Handler>; 256] = [None; 256];
        for &tag in CommandTag::ALL {
            handlers[tag as usize] = handler_for(tag);
        }
        Self {
            mode: DispatchMode::Live,
            handlers,
            captured: VecDeque::new(),
        }
    }

    /// Current mode.
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Start buffering inbound commands.
    pub fn begin_capture(&mut self) {
        self.mode = DispatchMode::Capture;
    }

    /// Go live and drop everything captured.
    pub fn abandon_capture(&mut self) {
        self.mode = DispatchMode::Live;
        self.captured.clear();
    }

    /// Number of buffered events.
    pub fn captured_len(&self) -> usize {
        self.captured.len()
    }

    /// Dispatch the first record in `bytes`, returning its length.
    pub fn dispatch(&mut self, ctx: &mut HandlerContext<'_>, sender: PeerId, bytes: &[u8]) -> Result<usize, DispatchError> {
        let (command, consumed) = decode(bytes)?;
        let tag = command.tag();

        validate(&command, &ValidationContext::new(ctx.catalog, ctx.max_players))
            .map_err(|rejection| DispatchError::Rejected { tag, rejection })?;

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(sender, %tag, mode = ?self.mode, "Dispatching");

        if self.mode == DispatchMode::Capture {
            match tag.capture_policy() {
                CapturePolicy::Buffer => {
                    self.captured.push_back(Captured::Command {
                        sender,
                        bytes: bytes[..consumed].to_vec(),
                    });
                    return Ok(consumed);
                }
                CapturePolicy::Discard => return Ok(consumed),
                CapturePolicy::Always => {}
            }
        }

        let handler = self.handlers[tag as usize].ok_or(DispatchError::NoHandler(tag))?;
        handler(ctx, sender, command)?;
        Ok(consumed)
    }

    /// Dispatch every record in a delivery, stopping at the first failure.
    pub fn dispatch_all(&mut self, ctx: &mut HandlerContext<'_>, sender: PeerId, bytes: &[u8]) -> Result<(), DispatchError> {
        let mut offset = 0;
        while offset < bytes.len() {
            offset += self.dispatch(ctx, sender, &bytes[offset..])?;
        }
        Ok(())
    }

    /// Report a departed peer, in order with captured commands.
    pub fn peer_left(&mut self, sim: &mut dyn Simulation, peer: PeerId, reason: LeaveReason) {
        if self.mode == DispatchMode::Capture {
            self.captured.push_back(Captured::PeerLeft { peer, reason });
        } else {
            sim.apply(SimEvent::PlayerLeft { peer, reason });
        }
    }

    /// Apply every captured event in arrival order, then go live.
    ///
    /// Returns the failures by sender. Once a sender fails, its later
    /// captured commands are skipped.
    pub fn replay(&mut self, ctx: &mut HandlerContext<'_>) -> Vec<(PeerId, DispatchError)> {
        self.mode = DispatchMode::Replay;
        let mut failures: Vec<(PeerId, DispatchError)> = Vec::new();
        while let Some(event) = self.captured.pop_front() {
            match event {
                Captured::Command { sender, bytes } => {
                    if failures.iter().any(|(peer, _)| *peer == sender) {
                        continue;
                    }
                    if let Err(err) = self.dispatch_all(ctx, sender, &bytes) {
                        failures.push((sender, err));
                    }
                }
                Captured::PeerLeft { peer, reason } => {
                    ctx.sim.apply(SimEvent::PlayerLeft { peer, reason });
                }
            }
        }
        self.mode = DispatchMode::Live;
        failures
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

fn handler_for(tag: CommandTag) -> Option<Handler> {
    use CommandTag as T;
    let handler: Handler = match tag {
        T::RequestGetItem | T::RequestAutoGetItem => on_request_get_item,
        T::GetItem | T::AutoGetItem => on_get_item,
        T::ItemExtra => on_item_extra,
        T::PutItem | T::DropItem | T::SyncPutItem => on_put_item,
        T::SpawnItem => on_spawn_item,
        T::OpenDoor | T::CloseDoor | T::OperateObject | T::BreakObject => on_object,
        T::MonsterDeath => on_monster_death,
        T::MonsterDamage => on_monster_damage,
        T::SpawnMonster => on_spawn_monster,
        T::SyncQuest => on_quest,
        T::ActivatePortal => on_activate_portal,
        T::DeactivatePortal => on_deactivate_portal,
        T::JoinLevel => on_join_level,
        T::SendPlayerInfo | T::AckPlayerInfo => on_player_info,
        T::LevelDelta | T::JunkDelta | T::EndDelta => on_delta_chunk,
        T::Chat => on_chat,
        T::SpellTile | T::SpellWall | T::SpellMonster | T::SpellPlayer => on_spell,
        T::SetDestination => return None,
        _ => forward,
    };
    Some(handler)
}

fn sender_level(ctx: &HandlerContext<'_>, sender: PeerId, tag: CommandTag) -> Option<LevelId> {
    let level = ctx.sim.player_level(sender);
    if level.is_none() {
        debug!(sender, %tag, "Ignoring command from player outside the dungeon");
    }
    level
}

fn forward(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    ctx.sim.apply(SimEvent::PlayerCommand { sender, command });
    Ok(())
}

fn on_spell(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let spell = match &command {
        Command::LocParam3 { params, .. } => params[0],
        Command::LocParam4 { params, .. } => params[0],
        Command::Param4 { params, .. } => params[1],
        _ => return Ok(()),
    };
    let in_town = ctx
        .sim
        .player_level(sender)
        .and_then(|level| ctx.catalog.level_type(level))
        == Some(LevelType::Town);
    let town_allowed = ctx.catalog.spell(spell).is_some_and(|entry| entry.town_allowed);
    if in_town && !town_allowed {
        debug!(sender, spell, "Ignoring spell cast in town");
        return Ok(());
    }
    forward(ctx, sender, command)
}

fn on_request_get_item(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::GetItem { tag, body } = command else {
        return Ok(());
    };
    let level = LevelId(body.level);
    if !ctx.sim.owns_level(level) || !ctx.sim.floor_item_exists(&body.item.def) {
        return Ok(());
    }
    let confirmed = match tag {
        CommandTag::RequestAutoGetItem => CommandTag::AutoGetItem,
        _ => CommandTag::GetItem,
    };
    debug!(sender, %level, seed = body.item.def.seed, "Confirming pick-up as level owner");
    ctx.replies.push((
        Destination::Broadcast,
        Command::GetItem {
            tag: confirmed,
            body: GetItemBody {
                master: ctx.local,
                ..body
            },
        },
    ));
    Ok(())
}

fn record_pick_up(ctx: &mut HandlerContext<'_>, level: LevelId, body: &GetItemBody) -> Result<(), DispatchError> {
    let outcome = ctx.registry.level_mut(level).apply_item_event(ItemEvent::PickedUp {
        position: body.position,
        item: body.item,
    })?;
    if outcome == ItemOutcome::NotRecorded {
        debug!(%level, seed = body.item.def.seed, index = body.item.def.index, "Pick-up of unrecorded item");
    }
    Ok(())
}

fn on_get_item(ctx: &mut HandlerContext<'_>, _sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::GetItem { tag, body } = command else {
        return Ok(());
    };
    let level = LevelId(body.level);
    record_pick_up(ctx, level, &body)?;
    ctx.sim.apply(SimEvent::ItemTaken {
        player: body.player,
        level,
        position: body.position,
        item: body.item,
        auto: tag == CommandTag::AutoGetItem,
    });
    Ok(())
}

fn on_item_extra(ctx: &mut HandlerContext<'_>, _sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::GetItem { body, .. } = command else {
        return Ok(());
    };
    let level = LevelId(body.level);
    record_pick_up(ctx, level, &body)?;
    ctx.sim.apply(SimEvent::ItemRemoved {
        level,
        def: body.item.def,
    });
    Ok(())
}

fn place_item(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command, spawned: bool) -> Result<(), DispatchError> {
    let Command::PutItem { tag, body } = command else {
        return Ok(());
    };
    let Some(level) = sender_level(ctx, sender, tag) else {
        return Ok(());
    };
    let event = if spawned {
        ItemEvent::FloorSpawn {
            position: body.position,
            item: body.item,
        }
    } else {
        ItemEvent::Dropped {
            position: body.position,
            item: body.item,
        }
    };
    ctx.registry.level_mut(level).apply_item_event(event)?;
    ctx.sim.apply(SimEvent::ItemPlaced {
        player: sender,
        level,
        position: body.position,
        item: body.item,
    });
    Ok(())
}

fn on_put_item(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    place_item(ctx, sender, command, false)
}

fn on_spawn_item(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    place_item(ctx, sender, command, true)
}

fn on_object(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::Loc { tag, position } = command else {
        return Ok(());
    };
    let (Some(action), Some(level)) = (ObjectAction::from_tag(tag), sender_level(ctx, sender, tag)) else {
        return Ok(());
    };
    if level.is_town() {
        debug!(sender, %tag, %position, "Ignoring object interaction in town");
        return Ok(());
    }
    ctx.registry.level_mut(level).apply_object_event(position, action)?;
    ctx.sim.apply(SimEvent::ObjectChanged { level, position, action });
    Ok(())
}

fn on_monster_death(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::LocParam1 { tag, position, param } = command else {
        return Ok(());
    };
    let Some(level) = sender_level(ctx, sender, tag) else {
        return Ok(());
    };
    ctx.registry
        .level_mut(level)
        .apply_monster_event(param as usize, MonsterEvent::Killed { position });
    ctx.sim.apply(SimEvent::MonsterKilled {
        level,
        slot: param,
        position,
    });
    Ok(())
}

fn on_monster_damage(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::MonsterDamage(body) = command else {
        return Ok(());
    };
    let Some(level) = sender_level(ctx, sender, CommandTag::MonsterDamage) else {
        return Ok(());
    };
    let hit_points = i32::try_from(body.hit_points).unwrap_or(i32::MAX);
    ctx.registry
        .level_mut(level)
        .apply_monster_event(body.monster as usize, MonsterEvent::Damaged { hit_points });
    ctx.sim.apply(SimEvent::MonsterDamaged {
        level,
        slot: body.monster,
        hit_points,
    });
    Ok(())
}

fn on_spawn_monster(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::SpawnMonster(body) = command else {
        return Ok(());
    };
    let Some(level) = sender_level(ctx, sender, CommandTag::SpawnMonster) else {
        return Ok(());
    };
    let monster = SpawnedMonster {
        type_index: body.type_index,
        seed: body.seed,
        owner: body.owner,
        spell_level: body.spell_level,
    };
    ctx.registry
        .level_mut(level)
        .apply_spawn_event(body.slot, monster, body.position);
    ctx.sim.apply(SimEvent::MonsterSpawned {
        level,
        slot: body.slot,
        monster,
        position: body.position,
    });
    Ok(())
}

fn on_quest(ctx: &mut HandlerContext<'_>, _sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::Quest(body) = command else {
        return Ok(());
    };
    let record = QuestDelta {
        state: body.state,
        log: body.log,
        var1: body.var1,
        var2: body.var2,
        message: body.message,
    };
    ctx.registry.junk_mut().apply_quest(body.quest, record);
    ctx.sim.apply(SimEvent::QuestChanged {
        quest: body.quest,
        record,
    });
    Ok(())
}

fn on_activate_portal(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::LocParam3 {
        position,
        params: [level, level_type, is_set_level],
        ..
    } = command
    else {
        return Ok(());
    };
    let portal = PortalDelta {
        position,
        level: level as u8,
        level_type: level_type as u8,
        is_set_level: is_set_level == 1,
    };
    ctx.registry.junk_mut().open_portal(sender, portal);
    ctx.sim.apply(SimEvent::PortalChanged {
        player: sender,
        portal: Some(portal),
    });
    Ok(())
}

fn on_deactivate_portal(ctx: &mut HandlerContext<'_>, sender: PeerId, _command: Command) -> Result<(), DispatchError> {
    ctx.registry.junk_mut().close_portal(sender);
    ctx.sim.apply(SimEvent::PortalChanged {
        player: sender,
        portal: None,
    });
    Ok(())
}

fn on_join_level(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::LocParam2 {
        position,
        params: [level, is_set_level],
        ..
    } = command
    else {
        return Ok(());
    };
    if let Some(level) = LevelId::for_multiplayer(level as u8, is_set_level == 1) {
        ctx.sim.apply(SimEvent::PlayerJoinedLevel {
            player: sender,
            level,
            position,
        });
    }
    Ok(())
}

fn on_player_info(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::Chunk { tag, body } = command else {
        return Ok(());
    };
    ctx.sim.apply(SimEvent::PlayerInfo {
        sender,
        tag,
        offset: body.offset,
        data: body.data,
    });
    Ok(())
}

fn on_delta_chunk(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::Chunk { tag, body } = command else {
        return Ok(());
    };
    ctx.resync
        .on_chunk(sender, tag, body.offset, &body.data, ctx.registry, ctx.catalog)?;
    Ok(())
}

fn on_chat(ctx: &mut HandlerContext<'_>, sender: PeerId, command: Command) -> Result<(), DispatchError> {
    let Command::Chat { text } = command else {
        return Ok(());
    };
    ctx.sim.apply(SimEvent::Chat { sender, text });
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::core::tile::TilePosition;
    use crate::delta::ItemState;
    use crate::network::config::SyncConfig;
    use crate::network::simulation::RecordingSimulation;
    use crate::protocol::{encode, ItemDef, ItemRecord, MonsterDamageBody};

    struct Harness {
        dispatcher: Dispatcher,
        registry: DeltaRegistry,
        resync: ResyncCoordinator,
        catalog: StaticCatalog,
        sim: RecordingSimulation,
        replies: Vec<(Destination, Command)>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dispatcher: Dispatcher::new(),
                registry: DeltaRegistry::new(),
                resync: ResyncCoordinator::new(&SyncConfig::default()),
                catalog: StaticCatalog::default(),
                sim: RecordingSimulation::new().with_players_on(LevelId(3), &[0, 1, 2]),
                replies: Vec::new(),
            }
        }

        fn dispatch(&mut self, sender: PeerId, command: &Command) -> Result<(), DispatchError> {
            let bytes = encode(command).unwrap();
            self.dispatch_raw(sender, &bytes)
        }

        fn dispatch_raw(&mut self, sender: PeerId, bytes: &[u8]) -> Result<(), DispatchError> {
            let mut ctx = HandlerContext {
                local: 0,
                max_players: 4,
                registry: &mut self.registry,
                resync: &mut self.resync,
                catalog: &self.catalog,
                sim: &mut self.sim,
                replies: &mut self.replies,
            };
            self.dispatcher.dispatch_all(&mut ctx, sender, bytes)
        }

        fn replay(&mut self) -> Vec<(PeerId, DispatchError)> {
            let mut ctx = HandlerContext {
                local: 0,
                max_players: 4,
                registry: &mut self.registry,
                resync: &mut self.resync,
                catalog: &self.catalog,
                sim: &mut self.sim,
                replies: &mut self.replies,
            };
            self.dispatcher.replay(&mut ctx)
        }
    }

    fn scroll(seed: u32) -> ItemRecord {
        ItemRecord::from_def(ItemDef {
            seed,
            index: 7,
            create_info: 5,
        })
    }

    fn get_item(tag: CommandTag, item: ItemRecord) -> Command {
        Command::GetItem {
            tag,
            body: GetItemBody {
                master: 1,
                player: 1,
                cursor_item: 0,
                level: 3,
                position: TilePosition::new(10, 12),
                item,
                timestamp: 0,
            },
        }
    }

    #[test]
    fn test_every_tag_but_marker_has_handler() {
        let dispatcher = Dispatcher::new();
        for &tag in CommandTag::ALL {
            assert_eq!(
                dispatcher.handlers[tag as usize].is_some(),
                tag != CommandTag::SetDestination,
                "{tag}"
            );
        }
    }

    #[test]
    fn test_drop_records_delta() {
        let mut h = Harness::new();
        let put = Command::put_item(CommandTag::PutItem, TilePosition::new(10, 12), scroll(1234));
        h.dispatch(1, &put).unwrap();
        let level = h.registry.level(LevelId(3)).unwrap();
        assert_eq!(level.find_item(&scroll(1234).def).unwrap().1.state, ItemState::Dropped);
        assert!(matches!(h.sim.events[0], SimEvent::ItemPlaced { player: 1, .. }));
    }

    #[test]
    fn test_drop_onto_floor_item_is_sender_fatal() {
        let mut h = Harness::new();
        let spawn = Command::put_item(CommandTag::SpawnItem, TilePosition::new(10, 12), scroll(9));
        let drop = Command::put_item(CommandTag::DropItem, TilePosition::new(10, 12), scroll(9));
        h.dispatch(1, &spawn).unwrap();
        let err = h.dispatch(2, &drop).unwrap_err();
        assert_eq!(err.severity(), Severity::SenderFatal);
    }

    #[test]
    fn test_invalid_creation_flags_never_mutate() {
        let mut h = Harness::new();
        let mut item = scroll(5);
        item.def.create_info = 0x8005;
        let put = Command::put_item(CommandTag::PutItem, TilePosition::new(10, 12), item);
        let err = h.dispatch(1, &put).unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { tag: CommandTag::PutItem, .. }));
        assert_eq!(err.severity(), Severity::SenderFatal);
        assert!(h.registry.level(LevelId(3)).is_none());
        assert!(h.sim.events.is_empty());
    }

    #[test]
    fn test_unknown_tag_and_truncation_fatal() {
        let mut h = Harness::new();
        let err = h.dispatch_raw(1, &[0xC8, 0, 0]).unwrap_err();
        assert_eq!(err, DispatchError::Codec(CodecError::UnknownTag(0xC8)));
        assert_eq!(err.severity(), Severity::SenderFatal);
        assert!(matches!(
            h.dispatch_raw(1, &[CommandTag::Walk as u8, 1]),
            Err(DispatchError::Codec(CodecError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_marker_from_peer_rejected() {
        let mut h = Harness::new();
        let err = h.dispatch_raw(1, &[CommandTag::SetDestination as u8, 2]).unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { tag: CommandTag::SetDestination, .. }));
    }

    #[test]
    fn test_level_owner_confirms_pick_up() {
        let mut h = Harness::new();
        h.sim.owned.insert(LevelId(3));
        h.sim.floor_items.insert(scroll(7).def);
        h.dispatch(1, &get_item(CommandTag::RequestAutoGetItem, scroll(7))).unwrap();
        assert_eq!(h.replies.len(), 1);
        let (destination, reply) = &h.replies[0];
        assert_eq!(*destination, Destination::Broadcast);
        match reply {
            Command::GetItem { tag, body } => {
                assert_eq!(*tag, CommandTag::AutoGetItem);
                assert_eq!(body.master, 0);
                assert_eq!(body.player, 1);
            }
            other => panic!("unexpected reply {other:?}"),
        }

        // Not the owner: no reply.
        h.sim.owned.clear();
        h.dispatch(1, &get_item(CommandTag::RequestGetItem, scroll(7))).unwrap();
        assert_eq!(h.replies.len(), 1);
    }

    #[test]
    fn test_confirmed_pick_up_updates_ledger() {
        let mut h = Harness::new();
        h.dispatch(1, &Command::put_item(CommandTag::SpawnItem, TilePosition::new(10, 12), scroll(3)))
            .unwrap();
        h.dispatch(1, &get_item(CommandTag::GetItem, scroll(3))).unwrap();
        let level = h.registry.level(LevelId(3)).unwrap();
        assert_eq!(level.find_item(&scroll(3).def).unwrap().1.state, ItemState::PickedUp);
        assert!(matches!(h.sim.events.last(), Some(SimEvent::ItemTaken { auto: false, .. })));
    }

    #[test]
    fn test_monster_damage_recorded() {
        let mut h = Harness::new();
        h.dispatch(2, &Command::LocParam1 {
            tag: CommandTag::MonsterDeath,
            position: TilePosition::new(8, 9),
            param: 4,
        })
        .unwrap();
        h.dispatch(
            2,
            &Command::MonsterDamage(MonsterDamageBody {
                monster: 4,
                hit_points: 100,
            }),
        )
        .unwrap();
        let monster = h.registry.level(LevelId(3)).unwrap().monsters().get(4).copied().unwrap();
        assert!(monster.is_dead());
    }

    #[test]
    fn test_player_outside_dungeon_ignored() {
        let mut h = Harness::new();
        h.dispatch(3, &Command::at_tile(CommandTag::OpenDoor, TilePosition::new(4, 4)))
            .unwrap();
        assert!(h.registry.level(LevelId(3)).is_none());
        assert!(h.sim.events.is_empty());
    }

    #[test]
    fn test_town_object_not_recorded() {
        let mut h = Harness::new();
        h.sim.levels.insert(1, LevelId(0));
        h.dispatch(1, &Command::at_tile(CommandTag::OpenDoor, TilePosition::new(4, 4)))
            .unwrap();
        assert!(h.registry.level(LevelId(0)).is_none());
        assert!(h.sim.events.is_empty());
    }

    #[test]
    fn test_object_log_full_is_sender_fatal() {
        use crate::core::limits::MAX_OBJECTS;

        let mut h = Harness::new();
        let door = |n: usize| {
            let position = TilePosition::new((n % 100) as u8, (n / 100) as u8);
            Command::at_tile(CommandTag::OpenDoor, position)
        };
        for n in 0..MAX_OBJECTS {
            h.dispatch(1, &door(n)).unwrap();
        }
        let err = h.dispatch(1, &door(MAX_OBJECTS)).unwrap_err();
        assert_eq!(err, DispatchError::Delta(DeltaError::ObjectLogFull { max: MAX_OBJECTS }));
        assert_eq!(err.severity(), Severity::SenderFatal);
        assert_eq!(h.sim.events.len(), MAX_OBJECTS);

        let mut copy = DeltaRegistry::new();
        copy.import_level(&h.registry.export_level(LevelId(3)), &h.catalog).unwrap();
        assert_eq!(copy.level(LevelId(3)).unwrap().objects().len(), MAX_OBJECTS);
    }

    #[test]
    fn test_town_spell_ignored() {
        let mut h = Harness::new();
        h.sim.levels.insert(1, LevelId(0));
        let not_in_town = h
            .catalog
            .spells
            .iter()
            .find(|s| !s.town_allowed)
            .map(|s| s.id)
            .unwrap();
        let cast = Command::LocParam3 {
            tag: CommandTag::SpellTile,
            position: TilePosition::new(5, 5),
            params: [not_in_town, 0, 0],
        };
        h.dispatch(1, &cast).unwrap();
        assert!(h.sim.events.is_empty());
        h.dispatch(2, &cast).unwrap();
        assert_eq!(h.sim.events.len(), 1);
    }

    #[test]
    fn test_capture_and_replay() {
        let mut h = Harness::new();
        h.dispatcher.begin_capture();

        h.dispatch(1, &Command::walk(TilePosition::new(1, 1))).unwrap();
        h.dispatch(1, &Command::at_tile(CommandTag::OpenDoor, TilePosition::new(4, 4)))
            .unwrap();
        let mut sim = std::mem::take(&mut h.sim);
        h.dispatcher.peer_left(&mut sim, 2, LeaveReason::Exit);
        h.sim = sim;
        h.dispatch(1, &Command::chat("hello")).unwrap();
        h.dispatch(1, &Command::at_tile(CommandTag::BreakObject, TilePosition::new(6, 6)))
            .unwrap();

        assert_eq!(h.dispatcher.captured_len(), 3);
        assert!(h.sim.events.is_empty());
        assert!(h.registry.level(LevelId(3)).is_none());

        assert!(h.replay().is_empty());
        assert_eq!(h.dispatcher.mode(), DispatchMode::Live);
        let events = h.sim.drain();
        assert!(matches!(events[0], SimEvent::ObjectChanged { action: ObjectAction::Open, .. }));
        assert!(matches!(events[1], SimEvent::PlayerLeft { peer: 2, reason: LeaveReason::Exit }));
        assert!(matches!(events[2], SimEvent::ObjectChanged { action: ObjectAction::Break, .. }));
    }

    #[test]
    fn test_delta_chunks_bypass_capture() {
        let mut h = Harness::new();
        h.dispatcher.begin_capture();
        h.resync.begin(std::time::Instant::now());
        h.dispatch(1, &Command::chunk(CommandTag::EndDelta, 0, vec![0])).unwrap();
        assert_eq!(h.dispatcher.captured_len(), 0);
        assert_eq!(*h.resync.state(), crate::network::resync::ResyncState::Complete);
    }

    #[test]
    fn test_player_info_forwarded_within_limit() {
        let mut h = Harness::new();
        h.dispatch(2, &Command::chunk(CommandTag::SendPlayerInfo, 1024, vec![7; 16]))
            .unwrap();
        assert!(matches!(
            &h.sim.events[0],
            SimEvent::PlayerInfo { sender: 2, offset: 1024, data, .. } if data.len() == 16
        ));

        let past_end = Command::chunk(CommandTag::AckPlayerInfo, 2040, vec![0; 16]);
        let err = h.dispatch(2, &past_end).unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { tag: CommandTag::AckPlayerInfo, .. }));
        assert_eq!(h.sim.events.len(), 1);
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(
            DispatchError::Resync(ResyncError::Timeout { elapsed_ms: 5 }).severity(),
            Severity::SessionFatal
        );
        assert_eq!(
            DispatchError::Resync(ResyncError::OutOfOrder {
                peer: 1,
                offset: 4,
                expected: 0
            })
            .severity(),
            Severity::SenderFatal
        );
        assert_eq!(DispatchError::Delta(DeltaError::EmptyChunk).severity(), Severity::Recoverable);
    }
}
