//! Dungeon Sync Demo
//!
//! Runs two peers over an in-memory transport: the host records some
//! world changes, a second peer joins late, pulls the delta stores, and
//! both end with the same digest.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dungeon_sync::{
    core::hash::short_hex,
    network::{RecordingSimulation, SyncConfig, SyncSession},
    protocol::{ItemDef, ItemRecord},
    Command, CommandTag, Destination, LevelId, LoopbackHub, StaticCatalog, TilePosition, VERSION,
};

const DEMO_LEVEL: LevelId = LevelId(3);

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Dungeon Sync v{}", VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("Reading config {path}"))?;
            SyncConfig::from_json(&json).with_context(|| format!("Parsing config {path}"))?
        }
        None => SyncConfig::default(),
    };

    demo_resync(config)
}

fn demo_resync(config: SyncConfig) -> Result<()> {
    let hub = LoopbackHub::shared();
    let sim = || RecordingSimulation::new().with_players_on(DEMO_LEVEL, &[0, 1]);

    let mut host = SyncSession::new(
        0,
        config.clone(),
        Box::new(StaticCatalog::default()),
        LoopbackHub::connect(&hub, 0),
        sim(),
    );

    let scroll = ItemRecord::from_def(ItemDef {
        seed: 1234,
        index: 7,
        create_info: 5,
    });
    host.send(
        Destination::Broadcast,
        &Command::put_item(CommandTag::SpawnItem, TilePosition::new(10, 12), scroll),
    )?;
    host.send(
        Destination::Broadcast,
        &Command::at_tile(CommandTag::OpenDoor, TilePosition::new(20, 21)),
    )?;
    host.send(
        Destination::Broadcast,
        &Command::LocParam1 {
            tag: CommandTag::MonsterDeath,
            position: TilePosition::new(30, 31),
            param: 12,
        },
    )?;
    host.end_tick();

    let host_digest = host.registry().digest(host.catalog());
    info!(digest = %short_hex(&host_digest), "Host recorded level {}", DEMO_LEVEL);

    let mut joiner = SyncSession::new(
        1,
        config,
        Box::new(StaticCatalog::default()),
        LoopbackHub::connect(&hub, 1),
        sim(),
    );
    joiner.begin_resync();
    host.serve_resync(joiner.local())?;
    host.end_tick();
    joiner
        .wait_for_resync(|percent| {
            info!(percent, "Resync progress");
            true
        })
        .context("Resync failed")?;
    joiner.replay_captured();

    let restored = joiner.load_level(DEMO_LEVEL);
    let joiner_digest = joiner.registry().digest(joiner.catalog());
    info!(
        restored,
        digest = %short_hex(&joiner_digest),
        "Joiner restored level {}",
        DEMO_LEVEL
    );

    if joiner_digest != host_digest {
        bail!(
            "Digest mismatch: host {} joiner {}",
            short_hex(&host_digest),
            short_hex(&joiner_digest)
        );
    }
    info!("Peers agree");
    Ok(())
}
