//! Wire Protocol
//!
//! Command tags, typed records and the binary codec. Everything here is a
//! pure function of its input bytes.

pub mod codec;
pub mod command;
pub mod error;
pub mod tag;

pub use codec::{decode, encode, encode_into, WireReader, WireWriter, MAX_CHUNK_BODY, MAX_TEXT_LEN};
pub use command::{
    ChangeItemBody, ChunkBody, Command, Destination, GetItemBody, ItemDef, ItemRecord,
    MonsterDamageBody, PeerId, PlayerDamageBody, PutItemBody, QuestBody, SpawnMonsterBody,
};
pub use error::CodecError;
pub use tag::{CapturePolicy, CommandTag, Layout};
