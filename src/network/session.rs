//! Sync Session
//!
//! Ties one peer's sync layer together: outbound commands are encoded,
//! throttled, applied locally and aggregated into frames; inbound
//! deliveries run through the dispatcher; a late joiner pulls the delta
//! stores from an authority peer before it goes live.

use std::thread;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::CatalogProvider;
use crate::core::hash::short_hex;
use crate::core::tile::LevelId;
use crate::delta::{DeltaRegistry, MonsterDelta, MonsterEvent};
use crate::protocol::{encode, CodecError, Command, Destination, PeerId};

use super::aggregator::{AggregatorError, OutboundAggregator};
use super::config::SyncConfig;
use super::dispatcher::{DispatchError, Dispatcher, HandlerContext, Severity};
use super::resync::{serve_chunks, ResyncCoordinator, ResyncError, ResyncState};
use super::simulation::{SimEvent, Simulation};
use super::throttle::ActionThrottle;
use super::transport::{LeaveReason, Transport};

/// Failure to send a local command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Command could not be encoded.
    #[error("Encode failed: {0}")]
    Codec(#[from] CodecError),

    /// Command does not fit a frame.
    #[error("Aggregation failed: {0}")]
    Aggregator(#[from] AggregatorError),

    /// Local application of the command failed.
    #[error("Local dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

/// One peer's state-sync session.
pub struct SyncSession<T: Transport, S: Simulation> {
    local: PeerId,
    config: SyncConfig,
    catalog: Box<dyn CatalogProvider>,
    transport: T,
    sim: S,
    registry: DeltaRegistry,
    dispatcher: Dispatcher,
    resync: ResyncCoordinator,
    throttle: ActionThrottle,
    aggregator: OutboundAggregator,
    replies: Vec<(Destination, Command)>,
    tick: u64,
}

impl<T: Transport, S: Simulation> SyncSession<T, S> {
    /// Create a live session for `local`.
    pub fn new(local: PeerId, config: SyncConfig, catalog: Box<dyn CatalogProvider>, transport: T, sim: S) -> Self {
        let resync = ResyncCoordinator::new(&config);
        let aggregator = OutboundAggregator::new(config.max_frame_bytes);
        Self {
            local,
            config,
            catalog,
            transport,
            sim,
            registry: DeltaRegistry::new(),
            dispatcher: Dispatcher::new(),
            resync,
            throttle: ActionThrottle::new(),
            aggregator,
            replies: Vec::new(),
            tick: 0,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Local peer id.
    pub fn local(&self) -> PeerId {
        self.local
    }

    /// Ticks ended so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Delta stores.
    pub fn registry(&self) -> &DeltaRegistry {
        &self.registry
    }

    /// Mutable delta stores.
    pub fn registry_mut(&mut self) -> &mut DeltaRegistry {
        &mut self.registry
    }

    /// Simulation.
    pub fn sim(&self) -> &S {
        &self.sim
    }

    /// Mutable simulation.
    pub fn sim_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    /// Transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Catalogs.
    pub fn catalog(&self) -> &dyn CatalogProvider {
        &*self.catalog
    }

    /// Resync state machine.
    pub fn resync(&self) -> &ResyncCoordinator {
        &self.resync
    }

    /// Inbound dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn parts(&mut self) -> (&mut Dispatcher, HandlerContext<'_>) {
        (
            &mut self.dispatcher,
            HandlerContext {
                local: self.local,
                max_players: self.config.max_players,
                registry: &mut self.registry,
                resync: &mut self.resync,
                catalog: &*self.catalog,
                sim: &mut self.sim,
                replies: &mut self.replies,
            },
        )
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Send a local command.
    ///
    /// Returns `false` when the throttle suppressed a repeated player
    /// action. Commands addressed to the local peer are applied before they
    /// are queued, so every peer runs the same handler for them.
    pub fn send(&mut self, destination: Destination, command: &Command) -> Result<bool, SendError> {
        let bytes = encode(command)?;
        if !self.throttle.should_send(command, &bytes) {
            debug!(local = self.local, tag = %command.tag(), "Suppressed repeated action");
            return Ok(false);
        }
        if destination.includes(self.local) {
            let local = self.local;
            let (dispatcher, mut ctx) = self.parts();
            dispatcher.dispatch(&mut ctx, local, &bytes)?;
        }
        self.aggregator.enqueue(destination, &bytes)?;
        self.send_replies();
        Ok(true)
    }

    fn send_replies(&mut self) {
        while !self.replies.is_empty() {
            for (destination, reply) in std::mem::take(&mut self.replies) {
                if let Err(err) = self.send(destination, &reply) {
                    warn!(local = self.local, tag = %reply.tag(), %err, "Reply not sent");
                }
            }
        }
    }

    /// Close the tick: flush queued commands as frames.
    pub fn end_tick(&mut self) -> usize {
        self.throttle.clear();
        let frames = self.aggregator.flush();
        for frame in &frames {
            self.transport.send(frame);
        }
        self.tick += 1;
        frames.len()
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Dispatch every pending delivery. Returns the number processed.
    #[instrument(skip(self), fields(local = self.local))]
    pub fn process_inbound(&mut self) -> usize {
        let mut processed = 0;
        while let Some((sender, bytes)) = self.transport.poll_inbound() {
            processed += 1;
            let (dispatcher, mut ctx) = self.parts();
            if let Err(err) = dispatcher.dispatch_all(&mut ctx, sender, &bytes) {
                self.handle_failure(sender, err, &bytes);
            }
        }
        self.send_replies();
        processed
    }

    fn handle_failure(&mut self, sender: PeerId, err: DispatchError, bytes: &[u8]) {
        match err.severity() {
            Severity::Recoverable => {
                warn!(sender, %err, "Command failed, continuing");
            }
            Severity::SenderFatal => {
                match &err {
                    DispatchError::Rejected { tag, rejection } => warn!(
                        sender,
                        %tag,
                        rule = rejection.rule,
                        field = rejection.field,
                        value = rejection.value,
                        bytes = %hex::encode(bytes),
                        "Dropping peer for invalid command"
                    ),
                    _ => warn!(
                        sender,
                        tag = ?err.tag(),
                        %err,
                        bytes = %hex::encode(bytes),
                        "Dropping peer for malformed command"
                    ),
                }
                self.drop_peer(sender);
            }
            Severity::SessionFatal => {
                error!(
                    sender,
                    resync = %self.resync.id(),
                    authority = ?self.resync.authority(),
                    %err,
                    "Resync failed"
                );
                self.fail_resync();
            }
        }
    }

    fn drop_peer(&mut self, peer: PeerId) {
        if !self.transport.is_connected(peer) {
            return;
        }
        self.transport.drop_peer(peer, LeaveReason::Drop);
        self.dispatcher.peer_left(&mut self.sim, peer, LeaveReason::Drop);
    }

    /// Report a departed peer.
    pub fn peer_left(&mut self, peer: PeerId, reason: LeaveReason) {
        info!(local = self.local, peer, ?reason, "Peer left");
        self.dispatcher.peer_left(&mut self.sim, peer, reason);
    }

    // =========================================================================
    // RESYNC
    // =========================================================================

    /// Stream the delta stores to a joining peer.
    #[instrument(skip(self), fields(local = self.local))]
    pub fn serve_resync(&mut self, peer: PeerId) -> Result<usize, SendError> {
        let commands = serve_chunks(&self.registry, &*self.catalog, &self.config);
        info!(
            local = self.local,
            peer,
            chunks = commands.len(),
            digest = %short_hex(&self.registry.digest(&*self.catalog)),
            "Serving resync"
        );
        for command in &commands {
            self.send(Destination::Peer(peer), command)?;
        }
        Ok(commands.len())
    }

    /// Start pulling the delta stores. Inbound commands are captured until
    /// [`replay_captured`](Self::replay_captured).
    pub fn begin_resync(&mut self) {
        self.dispatcher.begin_capture();
        self.resync.begin(Instant::now());
    }

    /// Block until the running resync completes or fails.
    ///
    /// `on_progress` receives the progress percentage after each poll and
    /// cancels the resync by returning `false`.
    #[instrument(skip(self, on_progress), fields(local = self.local, resync = %self.resync.id()))]
    pub fn wait_for_resync(&mut self, mut on_progress: impl FnMut(u8) -> bool) -> Result<(), ResyncError> {
        loop {
            self.transport.pump();
            self.process_inbound();

            match self.resync.state() {
                ResyncState::Complete => return Ok(()),
                ResyncState::Idle => return Ok(()),
                _ => {}
            }

            let authority_connected = self
                .resync
                .authority()
                .map_or(true, |peer| self.transport.is_connected(peer));
            let polled = self.resync.poll(
                Instant::now(),
                self.transport.owner_turns_waiting(),
                self.transport.turns_in_transit(),
                authority_connected,
            );
            match polled {
                Ok(percent) => {
                    if !on_progress(percent) {
                        info!(local = self.local, resync = %self.resync.id(), "Resync cancelled");
                        self.resync.destroy();
                        self.dispatcher.abandon_capture();
                        return Err(ResyncError::SessionDestroyed);
                    }
                }
                Err(err) => {
                    error!(local = self.local, %err, "Resync failed");
                    self.fail_resync();
                    return Err(err);
                }
            }
            thread::sleep(self.config.poll_interval());
        }
    }

    fn fail_resync(&mut self) {
        if let Some(authority) = self.resync.authority() {
            self.drop_peer(authority);
        }
        self.dispatcher.abandon_capture();
    }

    /// Apply everything captured during a resync and go live.
    ///
    /// Returns the number of peers dropped for failed commands.
    pub fn replay_captured(&mut self) -> usize {
        let pending = self.dispatcher.captured_len();
        let (dispatcher, mut ctx) = self.parts();
        let failures = dispatcher.replay(&mut ctx);
        info!(local = self.local, pending, failed = failures.len(), "Replayed captured commands");
        let dropped = failures.len();
        for (sender, err) in failures {
            self.handle_failure(sender, err, &[]);
        }
        self.send_replies();
        dropped
    }

    /// Tear the session down.
    pub fn destroy(&mut self) {
        self.resync.destroy();
        self.dispatcher.abandon_capture();
    }

    // =========================================================================
    // LEVEL ENTRY
    // =========================================================================

    /// Replay a level's delta into the simulation after generating it.
    pub fn load_level(&mut self, level: LevelId) -> usize {
        let sim = &self.sim;
        let events = self
            .registry
            .level_mut(level)
            .restore_events(|position| sim.object_exists(level, position));
        let count = events.len();
        for event in events {
            self.sim.apply(SimEvent::Restore(event));
        }
        debug!(local = self.local, %level, events = count, "Level delta restored");
        count
    }

    /// Replay portals and quests into the simulation on game entry.
    pub fn load_junk(&mut self) -> usize {
        let events = self.registry.junk().restore_events();
        let count = events.len();
        for event in events {
            self.sim.apply(SimEvent::Restore(event));
        }
        count
    }

    /// Snapshot the monsters of a level the local player is leaving.
    pub fn leave_level(&mut self, level: LevelId, monsters: impl IntoIterator<Item = (usize, MonsterDelta)>) {
        let store = self.registry.level_mut(level);
        for (slot, monster) in monsters {
            store.apply_monster_event(slot, MonsterEvent::Observed(monster));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
