//! Wire Codec
//!
//! Little-endian, packed encoding of [`Command`] records. Decoding never
//! reads past the supplied slice: fixed layouts are length-checked up
//! front, variable layouts bound their declared length before reading the
//! body.

use crate::core::tile::TilePosition;

use super::command::{
    ChangeItemBody, ChunkBody, Command, Destination, GetItemBody, ItemDef, ItemRecord,
    MonsterDamageBody, PlayerDamageBody, PutItemBody, QuestBody, SpawnMonsterBody,
};
use super::error::CodecError;
use super::tag::{CommandTag, Layout};

/// Ceiling on a chunk body's declared length.
pub const MAX_CHUNK_BODY: usize = 4096;

/// Maximum chat text length, excluding the terminator.
pub const MAX_TEXT_LEN: usize = 80;

// =============================================================================
// READER
// =============================================================================

/// Bounds-checked little-endian reader.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Read from the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Peek at the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Read a u8.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take::<2>()?))
    }

    /// Read a little-endian i16.
    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_le_bytes(self.take::<2>()?))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }

    /// Read a tile as `x, y`.
    pub fn read_tile(&mut self) -> Result<TilePosition, CodecError> {
        let [x, y] = self.take::<2>()?;
        Ok(TilePosition::new(x, y))
    }

    /// Read an item record.
    pub fn read_item(&mut self) -> Result<ItemRecord, CodecError> {
        Ok(ItemRecord {
            def: ItemDef {
                index: self.read_u16()?,
                create_info: self.read_u16()?,
                seed: self.read_u32()?,
            },
            identified: self.read_u8()? != 0,
            durability: self.read_u8()?,
            max_durability: self.read_u8()?,
            charges: self.read_u8()?,
            max_charges: self.read_u8()?,
            value: self.read_u16()?,
            to_hit: self.read_u16()?,
            max_damage: self.read_u16()?,
            buff: self.read_u32()?,
        })
    }

    fn read_params<const N: usize>(&mut self) -> Result<[u16; N], CodecError> {
        let mut params = [0u16; N];
        for param in params.iter_mut() {
            *param = self.read_u16()?;
        }
        Ok(params)
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Little-endian writer appending to a byte vector.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a little-endian u16.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian i16.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian i32.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a tile as `x, y`.
    pub fn write_tile(&mut self, position: TilePosition) {
        self.buf.push(position.x);
        self.buf.push(position.y);
    }

    /// Write an item record.
    pub fn write_item(&mut self, item: &ItemRecord) {
        self.write_u16(item.def.index);
        self.write_u16(item.def.create_info);
        self.write_u32(item.def.seed);
        self.write_u8(item.identified as u8);
        self.write_u8(item.durability);
        self.write_u8(item.max_durability);
        self.write_u8(item.charges);
        self.write_u8(item.max_charges);
        self.write_u16(item.value);
        self.write_u16(item.to_hit);
        self.write_u16(item.max_damage);
        self.write_u32(item.buff);
    }

    fn write_params(&mut self, params: &[u16]) {
        for &param in params {
            self.write_u16(param);
        }
    }
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encode a record into a fresh buffer.
pub fn encode(command: &Command) -> Result<Vec<u8>, CodecError> {
    let mut writer = WireWriter::with_capacity(command.encoded_len());
    encode_into(command, &mut writer)?;
    Ok(writer.into_inner())
}

/// Encode a record, appending to `writer`.
pub fn encode_into(command: &Command, writer: &mut WireWriter) -> Result<(), CodecError> {
    let tag = command.tag();
    if tag.layout() != command.layout() {
        return Err(CodecError::LayoutMismatch { tag });
    }

    // Validate variable tails before writing anything.
    match command {
        Command::Chunk { body, .. } if body.data.len() > MAX_CHUNK_BODY => {
            return Err(CodecError::BodyTooLarge {
                declared: body.data.len(),
                max: MAX_CHUNK_BODY,
            });
        }
        Command::Chat { text } => {
            if text.len() > MAX_TEXT_LEN {
                return Err(CodecError::TextTooLong { max: MAX_TEXT_LEN });
            }
            if text.as_bytes().contains(&0) {
                return Err(CodecError::InvalidText);
            }
        }
        _ => {}
    }

    writer.write_u8(tag as u8);
    match command {
        Command::Bare(_) => {}
        Command::Loc { position, .. } => writer.write_tile(*position),
        Command::LocParam1 { position, param, .. } => {
            writer.write_tile(*position);
            writer.write_u16(*param);
        }
        Command::LocParam2 { position, params, .. } => {
            writer.write_tile(*position);
            writer.write_params(params);
        }
        Command::LocParam3 { position, params, .. } => {
            writer.write_tile(*position);
            writer.write_params(params);
        }
        Command::LocParam4 { position, params, .. } => {
            writer.write_tile(*position);
            writer.write_params(params);
        }
        Command::Param1 { param, .. } => writer.write_u16(*param),
        Command::Param2 { params, .. } => writer.write_params(params),
        Command::Param4 { params, .. } => writer.write_params(params),
        Command::GetItem { body, .. } => {
            writer.write_u8(body.master);
            writer.write_u8(body.player);
            writer.write_u8(body.cursor_item);
            writer.write_u8(body.level);
            writer.write_tile(body.position);
            writer.write_item(&body.item);
            writer.write_i32(body.timestamp);
        }
        Command::PutItem { body, .. } => {
            writer.write_tile(body.position);
            writer.write_item(&body.item);
        }
        Command::ChangeItem { body, .. } => {
            writer.write_u8(body.slot);
            writer.write_item(&body.item);
            writer.write_u8(body.force_spell as u8);
        }
        Command::DeleteBodyItem { slot } => writer.write_u8(*slot),
        Command::PlayerDamage(body) => {
            writer.write_u8(body.target);
            writer.write_u32(body.damage);
            writer.write_u8(body.kind);
        }
        Command::MonsterDamage(body) => {
            writer.write_u16(body.monster);
            writer.write_u32(body.hit_points);
        }
        Command::Quest(body) => {
            writer.write_u8(body.quest);
            writer.write_u8(body.state);
            writer.write_u8(body.log);
            writer.write_u8(body.var1);
            writer.write_u8(body.var2);
            writer.write_i16(body.message);
        }
        Command::SpawnMonster(body) => {
            writer.write_tile(body.position);
            writer.write_u8(body.direction);
            writer.write_u16(body.type_index);
            writer.write_u16(body.slot);
            writer.write_u32(body.seed);
            writer.write_u8(body.owner);
            writer.write_u8(body.spell_level);
        }
        Command::Chunk { body, .. } => {
            writer.write_u16(body.offset);
            writer.write_u16(body.data.len() as u16);
            writer.write_bytes(&body.data);
        }
        Command::Chat { text } => {
            writer.write_bytes(text.as_bytes());
            writer.write_u8(0);
        }
        Command::SetDestination(dest) => writer.write_u8(dest.to_byte()),
    }
    Ok(())
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode one record from the front of `bytes`.
///
/// Returns the record and the number of bytes it occupied.
pub fn decode(bytes: &[u8]) -> Result<(Command, usize), CodecError> {
    let tag_byte = *bytes.first().ok_or(CodecError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let tag = CommandTag::from_u8(tag_byte).ok_or(CodecError::UnknownTag(tag_byte))?;
    let layout = tag.layout();

    if bytes.len() < layout.fixed_size() {
        return Err(CodecError::Truncated {
            needed: layout.fixed_size(),
            available: bytes.len(),
        });
    }

    let mut r = WireReader::new(bytes);
    r.read_u8()?;

    let command = match layout {
        Layout::Bare => Command::Bare(tag),
        Layout::Loc => Command::Loc {
            tag,
            position: r.read_tile()?,
        },
        Layout::LocParam1 => Command::LocParam1 {
            tag,
            position: r.read_tile()?,
            param: r.read_u16()?,
        },
        Layout::LocParam2 => Command::LocParam2 {
            tag,
            position: r.read_tile()?,
            params: r.read_params()?,
        },
        Layout::LocParam3 => Command::LocParam3 {
            tag,
            position: r.read_tile()?,
            params: r.read_params()?,
        },
        Layout::LocParam4 => Command::LocParam4 {
            tag,
            position: r.read_tile()?,
            params: r.read_params()?,
        },
        Layout::Param1 => Command::Param1 {
            tag,
            param: r.read_u16()?,
        },
        Layout::Param2 => Command::Param2 {
            tag,
            params: r.read_params()?,
        },
        Layout::Param4 => Command::Param4 {
            tag,
            params: r.read_params()?,
        },
        Layout::GetItem => Command::GetItem {
            tag,
            body: GetItemBody {
                master: r.read_u8()?,
                player: r.read_u8()?,
                cursor_item: r.read_u8()?,
                level: r.read_u8()?,
                position: r.read_tile()?,
                item: r.read_item()?,
                timestamp: r.read_i32()?,
            },
        },
        Layout::PutItem => Command::PutItem {
            tag,
            body: PutItemBody {
                position: r.read_tile()?,
                item: r.read_item()?,
            },
        },
        Layout::ChangeItem => Command::ChangeItem {
            tag,
            body: ChangeItemBody {
                slot: r.read_u8()?,
                item: r.read_item()?,
                force_spell: r.read_u8()? != 0,
            },
        },
        Layout::DeleteBodyItem => Command::DeleteBodyItem { slot: r.read_u8()? },
        Layout::PlayerDamage => Command::PlayerDamage(PlayerDamageBody {
            target: r.read_u8()?,
            damage: r.read_u32()?,
            kind: r.read_u8()?,
        }),
        Layout::MonsterDamage => Command::MonsterDamage(MonsterDamageBody {
            monster: r.read_u16()?,
            hit_points: r.read_u32()?,
        }),
        Layout::Quest => Command::Quest(QuestBody {
            quest: r.read_u8()?,
            state: r.read_u8()?,
            log: r.read_u8()?,
            var1: r.read_u8()?,
            var2: r.read_u8()?,
            message: r.read_i16()?,
        }),
        Layout::SpawnMonster => Command::SpawnMonster(SpawnMonsterBody {
            position: r.read_tile()?,
            direction: r.read_u8()?,
            type_index: r.read_u16()?,
            slot: r.read_u16()?,
            seed: r.read_u32()?,
            owner: r.read_u8()?,
            spell_level: r.read_u8()?,
        }),
        Layout::Chunk => {
            let offset = r.read_u16()?;
            let declared = r.read_u16()? as usize;
            if declared > MAX_CHUNK_BODY {
                return Err(CodecError::BodyTooLarge {
                    declared,
                    max: MAX_CHUNK_BODY,
                });
            }
            Command::Chunk {
                tag,
                body: ChunkBody {
                    offset,
                    data: r.read_bytes(declared)?.to_vec(),
                },
            }
        }
        Layout::Marker => Command::SetDestination(Destination::from_byte(r.read_u8()?)),
        Layout::Text => return decode_text(bytes),
    };

    Ok((command, r.position()))
}

fn decode_text(bytes: &[u8]) -> Result<(Command, usize), CodecError> {
    let tail = &bytes[1..];
    let window = &tail[..tail.len().min(MAX_TEXT_LEN + 1)];
    match window.iter().position(|&b| b == 0) {
        Some(len) => {
            let text = std::str::from_utf8(&window[..len]).map_err(|_| CodecError::InvalidText)?;
            Ok((Command::chat(text), 1 + len + 1))
        }
        None if tail.len() > MAX_TEXT_LEN => Err(CodecError::TextTooLong { max: MAX_TEXT_LEN }),
        None => Err(CodecError::Truncated {
            needed: bytes.len() + 1,
            available: bytes.len(),
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================
