//! Resynchronization Coordinator
//!
//! Brings a joining peer's delta stores up to date from an authority peer.
//! The authority streams one chunked export per level, then the junk table,
//! then an end marker. Chunks must arrive in order; the receiver stages a
//! stream's bytes and imports them when the next stream (or the end marker)
//! begins.
//!
//! ```text
//! Idle -> RequestingChunks -> ReceivingChunks -> Complete
//!                 \                  |
//!                  +-----------------+--> Aborted | SessionDestroyed
//! ```

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::catalog::CatalogProvider;
use crate::core::hash::short_hex;
use crate::core::tile::MAX_MULTIPLAYER_LEVEL;
use crate::delta::{pack_chunk, unpack_chunk, DeltaError, DeltaRegistry, STAGING_CAPACITY};
use crate::protocol::{Command, CommandTag, PeerId, MAX_CHUNK_BODY};

use super::config::SyncConfig;

/// Progress steps counted outside the level streams: the first chunk
/// received, the junk stream, the end marker and one spare.
pub const TRANSFER_OVERHEAD_CHUNKS: usize = 4;

/// Chunks expected over a whole resync: one per multiplayer level plus
/// the transfer overhead.
pub const TOTAL_CHUNKS: usize = MAX_MULTIPLAYER_LEVEL as usize + TRANSFER_OVERHEAD_CHUNKS;

/// Resync failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResyncError {
    /// Chunk offset does not continue the staged stream.
    #[error("Out-of-order chunk from peer {peer}: offset {offset}, expected {expected}")]
    OutOfOrder {
        /// Sending peer.
        peer: PeerId,
        /// Chunk offset.
        offset: usize,
        /// Receive cursor.
        expected: usize,
    },

    /// Staged bytes would exceed the staging buffer.
    #[error("Staging overflow: {needed} bytes, capacity {capacity}")]
    StagingOverflow {
        /// Bytes after appending the chunk.
        needed: usize,
        /// Buffer capacity.
        capacity: usize,
    },

    /// A compressed stream failed to decompress.
    #[error("Decompression failed: {0}")]
    Decompression(DeltaError),

    /// A decompressed stream failed to import.
    #[error("Import failed: {0}")]
    Import(DeltaError),

    /// No end marker before the deadline.
    #[error("Resync timed out after {elapsed_ms}ms")]
    Timeout {
        /// Time since the resync began.
        elapsed_ms: u64,
    },

    /// The authority peer disconnected.
    #[error("Authority peer {0} disconnected")]
    AuthorityLost(PeerId),

    /// The game was torn down.
    #[error("Session destroyed")]
    SessionDestroyed,
}

impl ResyncError {
    /// Check if only the sending peer is at fault.
    pub fn is_sender_fatal(&self) -> bool {
        matches!(self, ResyncError::OutOfOrder { .. })
    }
}

/// Coordinator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncState {
    /// No resync running.
    Idle,
    /// Waiting for the authority's turns to catch up.
    RequestingChunks,
    /// Consuming chunks.
    ReceivingChunks,
    /// End marker processed.
    Complete,
    /// Failed.
    Aborted(ResyncError),
    /// Game torn down mid-resync.
    SessionDestroyed,
}

/// What a chunk did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Not part of the current stream, skipped.
    Ignored,
    /// Appended to the staging buffer.
    Staged,
    /// End marker; the resync is complete.
    Complete,
}

/// Receive-side resync state machine.
#[derive(Debug)]
pub struct ResyncCoordinator {
    id: Uuid,
    state: ResyncState,
    authority: Option<PeerId>,
    stream: Option<CommandTag>,
    staging: Vec<u8>,
    completed: usize,
    started_at: Option<Instant>,
    authority_wait: Duration,
    timeout: Duration,
}

impl ResyncCoordinator {
    /// Create an idle coordinator.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            id: Uuid::nil(),
            state: ResyncState::Idle,
            authority: None,
            stream: None,
            staging: Vec::with_capacity(STAGING_CAPACITY),
            completed: 0,
            started_at: None,
            authority_wait: config.authority_wait(),
            timeout: config.resync_timeout(),
        }
    }

    /// Current resync id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> &ResyncState {
        &self.state
    }

    /// Peer feeding the current stream.
    pub fn authority(&self) -> Option<PeerId> {
        self.authority
    }

    /// Check if a resync is running.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ResyncState::RequestingChunks | ResyncState::ReceivingChunks)
    }

    /// Start a resync.
    pub fn begin(&mut self, now: Instant) {
        self.id = Uuid::new_v4();
        self.state = ResyncState::RequestingChunks;
        self.authority = None;
        self.stream = None;
        self.staging.clear();
        self.completed = 0;
        self.started_at = Some(now);
        info!(resync = %self.id, "Resync started");
    }

    /// Progress in percent, for display.
    pub fn progress_percent(&self) -> u8 {
        match self.state {
            ResyncState::Complete => 100,
            _ => (100 * self.completed.min(TOTAL_CHUNKS) / TOTAL_CHUNKS) as u8,
        }
    }

    /// Mark the game as torn down.
    pub fn destroy(&mut self) {
        if self.is_active() {
            info!(resync = %self.id, "Resync cancelled, session destroyed");
        }
        self.state = ResyncState::SessionDestroyed;
        self.staging.clear();
    }

    fn abort(&mut self, err: ResyncError) -> ResyncError {
        error!(resync = %self.id, authority = ?self.authority, %err, "Resync aborted");
        self.state = ResyncState::Aborted(err.clone());
        self.staging.clear();
        err
    }

    /// Advance the state machine on the tick loop.
    ///
    /// `RequestingChunks` ends once the owner's waiting turns catch up with
    /// the turns in transit, or the authority wait window elapses. Returns
    /// the progress percentage.
    pub fn poll(
        &mut self,
        now: Instant,
        owner_turns_waiting: u32,
        turns_in_transit: u32,
        authority_connected: bool,
    ) -> Result<u8, ResyncError> {
        let started_at = self.started_at.unwrap_or(now);
        let elapsed = now.saturating_duration_since(started_at);

        match self.state {
            ResyncState::RequestingChunks => {
                if owner_turns_waiting >= turns_in_transit || elapsed >= self.authority_wait {
                    debug!(resync = %self.id, owner_turns_waiting, turns_in_transit, "Authority ready");
                    self.state = ResyncState::ReceivingChunks;
                    self.completed = self.completed.max(1);
                }
            }
            ResyncState::Aborted(ref err) => return Err(err.clone()),
            ResyncState::SessionDestroyed => return Err(ResyncError::SessionDestroyed),
            _ => {}
        }

        if self.is_active() {
            if let Some(peer) = self.authority {
                if !authority_connected {
                    return Err(self.abort(ResyncError::AuthorityLost(peer)));
                }
            }
            if elapsed >= self.timeout {
                return Err(self.abort(ResyncError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                }));
            }
        }
        Ok(self.progress_percent())
    }

    /// Handle one delta-transfer chunk.
    pub fn on_chunk(
        &mut self,
        sender: PeerId,
        tag: CommandTag,
        offset: u16,
        data: &[u8],
        registry: &mut DeltaRegistry,
        catalog: &dyn CatalogProvider,
    ) -> Result<ChunkOutcome, ResyncError> {
        if !self.is_active() {
            return Ok(ChunkOutcome::Ignored);
        }
        let starts_stream = tag != CommandTag::EndDelta && offset == 0;

        if self.authority != Some(sender) {
            if self.stream.is_some() {
                debug!(resync = %self.id, peer = sender, %tag, "Ignoring chunk from non-authority mid-transfer");
                return Ok(ChunkOutcome::Ignored);
            }
            if tag != CommandTag::EndDelta && !starts_stream {
                return Ok(ChunkOutcome::Ignored);
            }
            debug!(resync = %self.id, authority = sender, "Adopting resync authority");
            self.authority = Some(sender);
        }
        if self.state == ResyncState::RequestingChunks {
            self.state = ResyncState::ReceivingChunks;
            self.completed = self.completed.max(1);
        }

        match self.stream {
            None => {
                if tag == CommandTag::EndDelta {
                    return Ok(self.complete(registry, catalog));
                }
                if !starts_stream {
                    return Ok(ChunkOutcome::Ignored);
                }
                self.start_stream(tag);
            }
            Some(stream) if stream != tag || offset == 0 => {
                if let Err(err) = self.import_staged(stream, registry, catalog) {
                    return Err(self.abort(err));
                }
                if tag == CommandTag::EndDelta {
                    return Ok(self.complete(registry, catalog));
                }
                self.start_stream(tag);
            }
            Some(_) => {}
        }

        let needed = self.staging.len() + data.len();
        if needed > STAGING_CAPACITY {
            return Err(self.abort(ResyncError::StagingOverflow {
                needed,
                capacity: STAGING_CAPACITY,
            }));
        }
        if offset as usize != self.staging.len() {
            let expected = self.staging.len();
            return Err(self.abort(ResyncError::OutOfOrder {
                peer: sender,
                offset: offset as usize,
                expected,
            }));
        }
        self.staging.extend_from_slice(data);
        Ok(ChunkOutcome::Staged)
    }

    fn start_stream(&mut self, tag: CommandTag) {
        self.stream = Some(tag);
        self.staging.clear();
    }

    fn import_staged(
        &mut self,
        stream: CommandTag,
        registry: &mut DeltaRegistry,
        catalog: &dyn CatalogProvider,
    ) -> Result<(), ResyncError> {
        let payload = unpack_chunk(&self.staging).map_err(ResyncError::Decompression)?;
        match stream {
            CommandTag::LevelDelta => {
                let level = registry.import_level(&payload, catalog).map_err(ResyncError::Import)?;
                debug!(resync = %self.id, %level, bytes = payload.len(), "Level stream imported");
            }
            _ => {
                registry.import_junk(&payload, catalog).map_err(ResyncError::Import)?;
                debug!(resync = %self.id, bytes = payload.len(), "Junk stream imported");
            }
        }
        self.stream = None;
        self.staging.clear();
        self.completed += 1;
        Ok(())
    }

    fn complete(&mut self, registry: &DeltaRegistry, catalog: &dyn CatalogProvider) -> ChunkOutcome {
        let elapsed_ms = self
            .started_at
            .map_or(0, |started| started.elapsed().as_millis() as u64);
        info!(
            resync = %self.id,
            authority = ?self.authority,
            levels = registry.level_ids().count(),
            digest = %short_hex(&registry.digest(catalog)),
            elapsed_ms,
            "Resync complete"
        );
        self.state = ResyncState::Complete;
        self.stream = None;
        self.completed = TOTAL_CHUNKS;
        ChunkOutcome::Complete
    }
}

// =============================================================================
// SERVING
// =============================================================================

/// Chunk commands that bring a peer up to date with `registry`.
///
/// Every level store goes out as its own stream, followed by the junk
/// stream and the end marker.
pub fn serve_chunks(registry: &DeltaRegistry, catalog: &dyn CatalogProvider, config: &SyncConfig) -> Vec<Command> {
    let chunk_body = config.max_chunk_body.clamp(1, MAX_CHUNK_BODY);
    let compression = config.chunk_compression();
    let mut commands = Vec::new();

    for level in registry.level_ids() {
        let packed = pack_chunk(&registry.export_level(level), compression);
        push_stream(&mut commands, CommandTag::LevelDelta, &packed, chunk_body);
    }
    let packed = pack_chunk(&registry.export_junk(catalog), compression);
    push_stream(&mut commands, CommandTag::JunkDelta, &packed, chunk_body);
    commands.push(Command::chunk(CommandTag::EndDelta, 0, vec![0]));
    commands
}

fn push_stream(commands: &mut Vec<Command>, tag: CommandTag, packed: &[u8], chunk_body: usize) {
    for (index, piece) in packed.chunks(chunk_body).enumerate() {
        let offset = (index * chunk_body) as u16;
        commands.push(Command::chunk(tag, offset, piece.to_vec()));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::core::tile::{LevelId, TilePosition};
    use crate::delta::{ItemEvent, ObjectAction};
    use crate::protocol::{ItemDef, ItemRecord};

    fn chunk_parts(command: &Command) -> (CommandTag, u16, Vec<u8>) {
        match command {
            Command::Chunk { tag, body } => (*tag, body.offset, body.data.clone()),
            other => panic!("not a chunk: {other:?}"),
        }
    }

    fn source() -> DeltaRegistry {
        let mut registry = DeltaRegistry::new();
        registry
            .level_mut(LevelId(3))
            .apply_item_event(ItemEvent::FloorSpawn {
                position: TilePosition::new(10, 12),
                item: ItemRecord::from_def(ItemDef {
                    seed: 1234,
                    index: 7,
                    create_info: 1,
                }),
            })
            .unwrap();
        registry
            .level_mut(LevelId(8))
            .apply_object_event(TilePosition::new(4, 4), ObjectAction::Open)
            .unwrap();
        registry
    }

    fn feed(
        coordinator: &mut ResyncCoordinator,
        commands: &[Command],
        sender: PeerId,
        registry: &mut DeltaRegistry,
    ) -> Result<ChunkOutcome, ResyncError> {
        let catalog = StaticCatalog::default();
        let mut last = ChunkOutcome::Ignored;
        for command in commands {
            let (tag, offset, data) = chunk_parts(command);
            last = coordinator.on_chunk(sender, tag, offset, &data, registry, &catalog)?;
        }
        Ok(last)
    }

    fn small_chunks() -> SyncConfig {
        SyncConfig {
            max_chunk_body: 64,
            compress_chunks: false,
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_full_transfer() {
        let catalog = StaticCatalog::default();
        let config = small_chunks();
        let commands = serve_chunks(&source(), &catalog, &config);
        assert!(commands.len() > 3);

        let mut coordinator = ResyncCoordinator::new(&config);
        let mut registry = DeltaRegistry::new();
        let now = Instant::now();
        coordinator.begin(now);
        assert_eq!(coordinator.poll(now, 0, 0, true), Ok(2));
        assert_eq!(*coordinator.state(), ResyncState::ReceivingChunks);

        let outcome = feed(&mut coordinator, &commands, 1, &mut registry).unwrap();
        assert_eq!(outcome, ChunkOutcome::Complete);
        assert_eq!(coordinator.progress_percent(), 100);
        assert_eq!(registry.digest(&catalog), source().digest(&catalog));
    }

    #[test]
    fn test_compressed_transfer() {
        let catalog = StaticCatalog::default();
        let config = SyncConfig::default();
        let commands = serve_chunks(&source(), &catalog, &config);
        let mut coordinator = ResyncCoordinator::new(&config);
        let mut registry = DeltaRegistry::new();
        coordinator.begin(Instant::now());
        feed(&mut coordinator, &commands, 1, &mut registry).unwrap();
        assert_eq!(registry.digest(&catalog), source().digest(&catalog));
    }

    #[test]
    fn test_out_of_order_aborts() {
        let catalog = StaticCatalog::default();
        let config = small_chunks();
        let mut commands = serve_chunks(&source(), &catalog, &config);
        commands.swap(1, 2);

        let mut coordinator = ResyncCoordinator::new(&config);
        let mut registry = DeltaRegistry::new();
        coordinator.begin(Instant::now());
        let err = feed(&mut coordinator, &commands, 1, &mut registry).unwrap_err();
        assert!(matches!(err, ResyncError::OutOfOrder { peer: 1, offset: 128, expected: 64 }));
        assert!(err.is_sender_fatal());
        assert!(matches!(coordinator.state(), ResyncState::Aborted(_)));
    }

    #[test]
    fn test_other_peer_mid_stream_ignored() {
        let catalog = StaticCatalog::default();
        let mut coordinator = ResyncCoordinator::new(&SyncConfig::default());
        let mut registry = DeltaRegistry::new();
        coordinator.begin(Instant::now());
        coordinator
            .on_chunk(1, CommandTag::LevelDelta, 0, &[0], &mut registry, &catalog)
            .unwrap();
        let outcome = coordinator
            .on_chunk(2, CommandTag::LevelDelta, 1, &[0], &mut registry, &catalog)
            .unwrap();
        assert_eq!(outcome, ChunkOutcome::Ignored);
        assert_eq!(coordinator.authority(), Some(1));
    }

    #[test]
    fn test_second_authority_cannot_cut_in() {
        let catalog = StaticCatalog::default();
        let config = small_chunks();
        let first = serve_chunks(&source(), &catalog, &config);
        let mut other = DeltaRegistry::new();
        other
            .level_mut(LevelId(5))
            .apply_object_event(TilePosition::new(9, 9), ObjectAction::Break)
            .unwrap();
        let second = serve_chunks(&other, &catalog, &config);

        let mut coordinator = ResyncCoordinator::new(&config);
        let mut registry = DeltaRegistry::new();
        coordinator.begin(Instant::now());
        let mut last = ChunkOutcome::Ignored;
        for index in 0..first.len().max(second.len()) {
            if let Some(command) = first.get(index) {
                let (tag, offset, data) = chunk_parts(command);
                last = coordinator
                    .on_chunk(1, tag, offset, &data, &mut registry, &catalog)
                    .unwrap();
            }
            if let Some(command) = second.get(index) {
                let (tag, offset, data) = chunk_parts(command);
                let outcome = coordinator
                    .on_chunk(2, tag, offset, &data, &mut registry, &catalog)
                    .unwrap();
                assert_eq!(outcome, ChunkOutcome::Ignored);
            }
        }

        assert_eq!(last, ChunkOutcome::Complete);
        assert_eq!(coordinator.authority(), Some(1));
        assert_eq!(registry.digest(&catalog), source().digest(&catalog));
        assert!(registry.level(LevelId(5)).is_none());
    }

    #[test]
    fn test_stray_end_marker_mid_stream_ignored() {
        let catalog = StaticCatalog::default();
        let config = small_chunks();
        let commands = serve_chunks(&source(), &catalog, &config);

        let mut coordinator = ResyncCoordinator::new(&config);
        let mut registry = DeltaRegistry::new();
        coordinator.begin(Instant::now());
        let (tag, offset, data) = chunk_parts(&commands[0]);
        coordinator
            .on_chunk(1, tag, offset, &data, &mut registry, &catalog)
            .unwrap();
        let stray = coordinator
            .on_chunk(2, CommandTag::EndDelta, 0, &[0], &mut registry, &catalog)
            .unwrap();
        assert_eq!(stray, ChunkOutcome::Ignored);
        assert_eq!(*coordinator.state(), ResyncState::ReceivingChunks);

        let outcome = feed(&mut coordinator, &commands[1..], 1, &mut registry).unwrap();
        assert_eq!(outcome, ChunkOutcome::Complete);
        assert_eq!(registry.digest(&catalog), source().digest(&catalog));
    }

    #[test]
    fn test_staging_overflow() {
        let catalog = StaticCatalog::default();
        let mut coordinator = ResyncCoordinator::new(&SyncConfig::default());
        let mut registry = DeltaRegistry::new();
        coordinator.begin(Instant::now());
        let big = vec![0u8; MAX_CHUNK_BODY];
        let mut result = Ok(ChunkOutcome::Staged);
        for index in 0..3 {
            result = coordinator.on_chunk(
                1,
                CommandTag::LevelDelta,
                (index * MAX_CHUNK_BODY) as u16,
                &big,
                &mut registry,
                &catalog,
            );
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ResyncError::StagingOverflow { .. })));
    }

    #[test]
    fn test_bad_stream_aborts_import() {
        let catalog = StaticCatalog::default();
        let mut coordinator = ResyncCoordinator::new(&SyncConfig::default());
        let mut registry = DeltaRegistry::new();
        coordinator.begin(Instant::now());
        coordinator
            .on_chunk(1, CommandTag::LevelDelta, 0, &[1, 9, 9, 9], &mut registry, &catalog)
            .unwrap();
        let err = coordinator
            .on_chunk(1, CommandTag::EndDelta, 0, &[0], &mut registry, &catalog)
            .unwrap_err();
        assert!(matches!(err, ResyncError::Decompression(_)));
    }

    #[test]
    fn test_timeout_and_authority_loss() {
        let config = SyncConfig::default();
        let start = Instant::now();

        let mut coordinator = ResyncCoordinator::new(&config);
        coordinator.begin(start);
        assert_eq!(coordinator.poll(start, 0, 5, true), Ok(0));
        assert_eq!(*coordinator.state(), ResyncState::RequestingChunks);
        let later = start + config.resync_timeout();
        assert!(matches!(
            coordinator.poll(later, 0, 5, true),
            Err(ResyncError::Timeout { .. })
        ));

        let catalog = StaticCatalog::default();
        let mut registry = DeltaRegistry::new();
        coordinator.begin(start);
        coordinator
            .on_chunk(3, CommandTag::JunkDelta, 0, &[0], &mut registry, &catalog)
            .unwrap();
        assert_eq!(
            coordinator.poll(start, 0, 0, false),
            Err(ResyncError::AuthorityLost(3))
        );
    }

    #[test]
    fn test_authority_wait_window() {
        let config = SyncConfig::default();
        let start = Instant::now();
        let mut coordinator = ResyncCoordinator::new(&config);
        coordinator.begin(start);
        coordinator.poll(start + Duration::from_millis(10), 0, 5, true).unwrap();
        assert_eq!(*coordinator.state(), ResyncState::RequestingChunks);
        coordinator.poll(start + config.authority_wait(), 0, 5, true).unwrap();
        assert_eq!(*coordinator.state(), ResyncState::ReceivingChunks);
    }

    #[test]
    fn test_progress_counts_imported_streams() {
        let catalog = StaticCatalog::default();
        let config = small_chunks();
        let commands = serve_chunks(&source(), &catalog, &config);
        let (end, streams) = commands.split_last().unwrap();

        let mut coordinator = ResyncCoordinator::new(&config);
        let mut registry = DeltaRegistry::new();
        coordinator.begin(Instant::now());
        feed(&mut coordinator, streams, 1, &mut registry).unwrap();
        // Started, then both level streams imported; junk is still staged.
        assert_eq!(coordinator.progress_percent() as usize, 100 * 3 / TOTAL_CHUNKS);

        feed(&mut coordinator, std::slice::from_ref(end), 1, &mut registry).unwrap();
        assert_eq!(coordinator.progress_percent(), 100);
    }

    #[test]
    fn test_destroy() {
        let mut coordinator = ResyncCoordinator::new(&SyncConfig::default());
        coordinator.begin(Instant::now());
        coordinator.destroy();
        assert_eq!(
            coordinator.poll(Instant::now(), 0, 0, true),
            Err(ResyncError::SessionDestroyed)
        );
    }
}
