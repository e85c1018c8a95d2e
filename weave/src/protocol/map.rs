//! Map payload framing (§4.7): a sequence of chunks, each prefixed with a
//! chunk size and a header byte describing the key/value shape that chunk
//! shares, terminated by a chunk of size 0.
//!
//! Real-world maps are overwhelmingly homogeneous in both key and value
//! type, so — exactly as [`collection`](super::collection) does for lists —
//! every chunk this module writes declares `KEY_DECLARED_TYPE`,
//! `VALUE_DECLARED_TYPE` and one key/value pair's worth of entries; nothing
//! here emits more than one chunk. A reader still walks the chunk sequence
//! generically, since nothing stops a future writer (or another language's
//! binding) from splitting entries across several chunks.

use crate::context::{ReadContext, WriteContext};
use crate::error::Result;
use crate::protocol::value::{read_value_element, write_value_element, ReadOutcome};
use crate::protocol::ValueCodec;
use crate::refs::RefMode;
use crate::types::WireKind;
use std::collections::{BTreeMap, HashMap};

/// Entries per chunk are capped at this so the chunk-size byte (`u8`) never
/// overflows.
const MAX_CHUNK_SIZE: usize = u8::MAX as usize;

bitflags::bitflags! {
    /// Per-chunk header bits, LSB first. Key and value each get their own
    /// null/tracking pair since a map's keys and values are framed
    /// independently (§4.7: "the key stream and the value stream carry
    /// their own ref bytes").
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct MapChunkHeader: u8 {
        const KEY_DECLARED_TYPE = 0b0000_0001;
        const VALUE_DECLARED_TYPE = 0b0000_0010;
        const KEY_HAS_NULL = 0b0000_0100;
        const KEY_TRACKING_REF = 0b0000_1000;
        const VALUE_HAS_NULL = 0b0001_0000;
        const VALUE_TRACKING_REF = 0b0010_0000;
    }
}

fn mode_from(has_null: bool, tracking: bool) -> RefMode {
    if tracking {
        RefMode::Tracking
    } else if has_null {
        RefMode::NullOnly
    } else {
        RefMode::None
    }
}

fn header_bits(key_mode: RefMode, value_mode: RefMode) -> MapChunkHeader {
    let mut header = MapChunkHeader::KEY_DECLARED_TYPE | MapChunkHeader::VALUE_DECLARED_TYPE;
    match key_mode {
        RefMode::None => {}
        RefMode::NullOnly => header |= MapChunkHeader::KEY_HAS_NULL,
        RefMode::Tracking => header |= MapChunkHeader::KEY_HAS_NULL | MapChunkHeader::KEY_TRACKING_REF,
    }
    match value_mode {
        RefMode::None => {}
        RefMode::NullOnly => header |= MapChunkHeader::VALUE_HAS_NULL,
        RefMode::Tracking => header |= MapChunkHeader::VALUE_HAS_NULL | MapChunkHeader::VALUE_TRACKING_REF,
    }
    header
}

/// Writes `entries` as one or more chunks, split every [`MAX_CHUNK_SIZE`]
/// entries. The leading `var_uint32(len)` lets the reader know exactly how
/// many entries to expect, so there is no zero-size terminator chunk.
fn write_chunks<K, V>(
    ctx: &mut WriteContext,
    len: usize,
    value_mode: RefMode,
    mut write_entry: impl FnMut(&mut WriteContext, usize) -> Result<()>,
) -> Result<()>
where
    K: ValueCodec,
    V: ValueCodec,
{
    ctx.buffer().write_var_uint32(len as u32);
    let header = header_bits(RefMode::None, value_mode).bits();
    let mut written = 0;
    while written < len {
        let chunk_len = (len - written).min(MAX_CHUNK_SIZE);
        ctx.buffer().write_fixed_u8(chunk_len as u8);
        ctx.buffer().write_fixed_u8(header);
        for i in written..written + chunk_len {
            write_entry(ctx, i)?;
        }
        written += chunk_len;
    }
    Ok(())
}

fn read_chunks<K, V>(
    ctx: &mut ReadContext,
    mut read_entry: impl FnMut(&mut ReadContext, RefMode, RefMode) -> Result<()>,
) -> Result<usize>
where
    K: ValueCodec,
    V: ValueCodec,
{
    let len = ctx.buffer().read_var_uint32()? as usize;
    let mut remaining = len;
    while remaining > 0 {
        let chunk_len = ctx.buffer().read_fixed_u8()? as usize;
        let header = MapChunkHeader::from_bits_truncate(ctx.buffer().read_fixed_u8()?);
        let key_mode = mode_from(
            header.contains(MapChunkHeader::KEY_HAS_NULL),
            header.contains(MapChunkHeader::KEY_TRACKING_REF),
        );
        let value_mode = mode_from(
            header.contains(MapChunkHeader::VALUE_HAS_NULL),
            header.contains(MapChunkHeader::VALUE_TRACKING_REF),
        );
        for _ in 0..chunk_len {
            read_entry(ctx, key_mode, value_mode)?;
        }
        remaining -= chunk_len;
    }
    Ok(len)
}

/// Non-nullable keys and values — `HashMap<K, V>`/`BTreeMap<K, V>`.
pub fn write_map<'a, K, V>(ctx: &mut WriteContext, entries: impl ExactSizeIterator<Item = (&'a K, &'a V)>) -> Result<()>
where
    K: ValueCodec + 'a,
    V: ValueCodec + 'a,
{
    let pairs: Vec<(&K, &V)> = entries.collect();
    write_chunks::<K, V>(ctx, pairs.len(), RefMode::None, |ctx, i| {
        let (key, value) = pairs[i];
        write_value_element(ctx, RefMode::None, Some(key), None)?;
        write_value_element(ctx, RefMode::None, Some(value), None)
    })
}

pub fn read_map<K, V>(ctx: &mut ReadContext) -> Result<Vec<(K, V)>>
where
    K: ValueCodec,
    V: ValueCodec,
{
    let mut out = Vec::new();
    read_chunks::<K, V>(ctx, |ctx, key_mode, value_mode| {
        let key = match read_value_element::<K>(ctx, key_mode)? {
            ReadOutcome::Value(k) => k,
            ReadOutcome::Null => {
                return Err(crate::error::Error::InvalidData("unexpected null map key".into()))
            }
        };
        let value = match read_value_element::<V>(ctx, value_mode)? {
            ReadOutcome::Value(v) => v,
            ReadOutcome::Null => {
                return Err(crate::error::Error::InvalidData(
                    "unexpected null value in a non-nullable map".into(),
                ))
            }
        };
        out.push((key, value));
        Ok(())
    })?;
    Ok(out)
}

/// Non-nullable keys, nullable values — for `HashMap<K, Option<V>>`.
pub fn write_map_nullable_values<'a, K, V>(
    ctx: &mut WriteContext,
    entries: impl ExactSizeIterator<Item = (&'a K, &'a Option<V>)>,
) -> Result<()>
where
    K: ValueCodec + 'a,
    V: ValueCodec + 'a,
{
    let pairs: Vec<(&K, &Option<V>)> = entries.collect();
    write_chunks::<K, V>(ctx, pairs.len(), RefMode::NullOnly, |ctx, i| {
        let (key, value) = pairs[i];
        write_value_element(ctx, RefMode::None, Some(key), None)?;
        write_value_element(ctx, RefMode::NullOnly, value.as_ref(), None)
    })
}

pub fn read_map_nullable_values<K, V>(ctx: &mut ReadContext) -> Result<Vec<(K, Option<V>)>>
where
    K: ValueCodec,
    V: ValueCodec,
{
    let mut out = Vec::new();
    read_chunks::<K, V>(ctx, |ctx, key_mode, value_mode| {
        let key = match read_value_element::<K>(ctx, key_mode)? {
            ReadOutcome::Value(k) => k,
            ReadOutcome::Null => {
                return Err(crate::error::Error::InvalidData("unexpected null map key".into()))
            }
        };
        let value = read_value_element::<V>(ctx, value_mode)?.into_option();
        out.push((key, value));
        Ok(())
    })?;
    Ok(out)
}

impl<K: ValueCodec + Eq + std::hash::Hash, V: ValueCodec> ValueCodec for HashMap<K, V> {
    fn static_wire_kind() -> WireKind {
        WireKind::Map
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        write_map(ctx, self.iter())
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        Ok(read_map::<K, V>(ctx)?.into_iter().collect())
    }
}

impl<K: ValueCodec + Ord, V: ValueCodec> ValueCodec for BTreeMap<K, V> {
    fn static_wire_kind() -> WireKind {
        WireKind::Map
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        write_map(ctx, self.iter())
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        Ok(read_map::<K, V>(ctx)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::WireKind;
    use std::sync::Arc;

    #[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
    struct Key(u32);
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Val(u32);

    macro_rules! impl_varint_codec {
        ($ty:ident, $wrap:ident) => {
            impl ValueCodec for $ty {
                fn static_wire_kind() -> WireKind {
                    WireKind::VarInt32
                }
                fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
                    ctx.buffer().write_var_uint32(self.0);
                    Ok(())
                }
                fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
                    Ok($ty(ctx.buffer().read_var_uint32()?))
                }
            }
        };
    }
    impl_varint_codec!(Key, k);
    impl_varint_codec!(Val, v);

    #[test]
    fn map_round_trips_in_insertion_order() {
        let config = Config::builder().build();
        let entries = vec![(Key(1), Val(10)), (Key(2), Val(20))];
        let mut ctx = config.writer();
        write_map(&mut ctx, entries.iter().map(|(k, v)| (k, v))).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());
        let mut ctx = config.reader(bytes);
        assert_eq!(read_map::<Key, Val>(&mut ctx).unwrap(), entries);
    }

    #[test]
    fn map_splits_into_multiple_chunks_past_the_byte_cap() {
        let config = Config::builder().build();
        let entries: Vec<(Key, Val)> = (0..300).map(|i| (Key(i), Val(i * 2))).collect();
        let mut ctx = config.writer();
        write_map(&mut ctx, entries.iter().map(|(k, v)| (k, v))).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());
        let mut ctx = config.reader(bytes);
        assert_eq!(read_map::<Key, Val>(&mut ctx).unwrap(), entries);
    }

    #[test]
    fn nullable_values_round_trip() {
        let config = Config::builder().build();
        let entries = vec![(Key(1), Some(Val(10))), (Key(2), None)];
        let mut ctx = config.writer();
        write_map_nullable_values(&mut ctx, entries.iter().map(|(k, v)| (k, v))).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());
        let mut ctx = config.reader(bytes);
        assert_eq!(read_map_nullable_values::<Key, Val>(&mut ctx).unwrap(), entries);
    }
}
