//! [`ValueCodec`] implementations for the scalar, string, and binary wire
//! kinds (§4.7). Collection and map wire kinds live in
//! [`protocol::collection`](crate::protocol::collection) and
//! [`protocol::map`](crate::protocol::map), since they need more than a
//! single payload codec to frame their elements.
//!
//! A bare `Vec<u8>` already has an obvious meaning as the BINARY wire kind,
//! which collides with the blanket LIST impl a `Vec<T: ValueCodec>` would
//! otherwise get — Rust's coherence rules won't let both exist. [`Bytes`]
//! is the wrapper that breaks the tie: reach for it when a field is a blob,
//! not a list of bytes.

use crate::context::{ReadContext, WriteContext};
use crate::error::Result;
use crate::protocol::ValueCodec;
use crate::types::WireKind;

macro_rules! impl_fixed_scalar {
    ($ty:ty, $kind:ident, $write:ident, $read:ident) => {
        impl ValueCodec for $ty {
            fn static_wire_kind() -> WireKind {
                WireKind::$kind
            }
            fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
                ctx.buffer().$write(*self);
                Ok(())
            }
            fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
                ctx.buffer().$read()
            }
        }
    };
}

impl ValueCodec for bool {
    fn static_wire_kind() -> WireKind {
        WireKind::Bool
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        ctx.buffer().write_fixed_u8(*self as u8);
        Ok(())
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        Ok(ctx.buffer().read_fixed_u8()? != 0)
    }
}

impl ValueCodec for i8 {
    fn static_wire_kind() -> WireKind {
        WireKind::Int8
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        ctx.buffer().write_fixed_i8(*self);
        Ok(())
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        ctx.buffer().read_fixed_i8()
    }
}

impl ValueCodec for u8 {
    fn static_wire_kind() -> WireKind {
        WireKind::UInt8
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        ctx.buffer().write_fixed_u8(*self);
        Ok(())
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        ctx.buffer().read_fixed_u8()
    }
}

impl_fixed_scalar!(i16, Int16, write_fixed_i16, read_fixed_i16);
impl_fixed_scalar!(u16, UInt16, write_fixed_u16, read_fixed_u16);
impl_fixed_scalar!(i32, Int32, write_fixed_i32, read_fixed_i32);
impl_fixed_scalar!(u32, UInt32, write_fixed_u32, read_fixed_u32);
impl_fixed_scalar!(i64, Int64, write_fixed_i64, read_fixed_i64);
impl_fixed_scalar!(u64, UInt64, write_fixed_u64, read_fixed_u64);
impl_fixed_scalar!(f32, Float32, write_fixed_f32, read_fixed_f32);
impl_fixed_scalar!(f64, Float64, write_fixed_f64, read_fixed_f64);

/// Wrapper selecting the zig-zag `VarInt32` wire kind over the default fixed
/// `Int32` a bare `i32` gets — use this for fields the schema declares as
/// variable-length (§4.7 lists both forms as independent wire kinds, not a
/// per-type choice).
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarInt32(pub i32);

impl ValueCodec for VarInt32 {
    fn static_wire_kind() -> WireKind {
        WireKind::VarInt32
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        ctx.buffer().write_var_int32(self.0);
        Ok(())
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        Ok(VarInt32(ctx.buffer().read_var_int32()?))
    }
}

/// The `VarInt64` counterpart of [`VarInt32`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarInt64(pub i64);

impl ValueCodec for VarInt64 {
    fn static_wire_kind() -> WireKind {
        WireKind::VarInt64
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        ctx.buffer().write_var_int64(self.0);
        Ok(())
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        Ok(VarInt64(ctx.buffer().read_var_int64()?))
    }
}

/// A binary blob — the BINARY wire kind. See the module docs for why this
/// isn't just `impl ValueCodec for Vec<u8>`.
#[derive(Debug, Default, Clone, Eq, PartialEq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl ValueCodec for Bytes {
    fn static_wire_kind() -> WireKind {
        WireKind::Binary
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        ctx.buffer().write_var_uint32(self.0.len() as u32);
        ctx.buffer().write_bytes(&self.0);
        Ok(())
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        let len = ctx.buffer().read_var_uint32()? as usize;
        Ok(Bytes(ctx.buffer().read_bytes(len)?.to_vec()))
    }
}

// -- string payload encoding (§4.7) --------------------------------------

const STRING_TAG_LATIN1: u64 = 0;
const STRING_TAG_UTF16LE: u64 = 1;
const STRING_TAG_UTF8: u64 = 2;

/// Picks the smallest of the three wire encodings that losslessly carries
/// `s`: Latin-1 (one byte per codepoint) if every codepoint fits in
/// `0x00..=0xFF`, else whichever of UTF-8/UTF-16LE produces fewer bytes —
/// ties favor UTF-8 since it's the more interoperable of the two. This is a
/// literal byte-count comparison rather than the "ASCII ratio over a
/// sample" heuristic some peers use (see DESIGN.md for why: it's the only
/// rule that reproduces every string in spec Scenario 3, including
/// "abc世界" picking UTF-8 over UTF-16).
fn is_latin1(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xFF)
}

fn write_latin1(ctx: &mut WriteContext, s: &str) {
    let bytes: Vec<u8> = s.chars().map(|c| c as u8).collect();
    ctx.buffer().write_var_uint36_small(((bytes.len() as u64) << 2) | STRING_TAG_LATIN1);
    ctx.buffer().write_bytes(&bytes);
}

fn write_utf16le(ctx: &mut WriteContext, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let byte_len = units.len() * 2;
    ctx.buffer().write_var_uint36_small(((byte_len as u64) << 2) | STRING_TAG_UTF16LE);
    for unit in units {
        ctx.buffer().write_fixed_u16(unit);
    }
}

fn write_utf8(ctx: &mut WriteContext, s: &str) {
    let bytes = s.as_bytes();
    ctx.buffer().write_var_uint36_small(((bytes.len() as u64) << 2) | STRING_TAG_UTF8);
    ctx.buffer().write_bytes(bytes);
}

impl ValueCodec for String {
    fn static_wire_kind() -> WireKind {
        WireKind::String
    }

    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        if is_latin1(self) {
            write_latin1(ctx, self);
            return Ok(());
        }
        let utf8_len = self.len();
        let utf16_len = self.encode_utf16().count() * 2;
        if utf8_len <= utf16_len {
            write_utf8(ctx, self);
        } else {
            write_utf16le(ctx, self);
        }
        Ok(())
    }

    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        let header = ctx.buffer().read_var_uint36_small()?;
        let tag = header & 0b11;
        let byte_len = (header >> 2) as usize;
        match tag {
            STRING_TAG_LATIN1 => {
                let bytes = ctx.buffer().read_bytes(byte_len)?;
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
            STRING_TAG_UTF16LE => {
                let raw = ctx.buffer().read_bytes(byte_len)?;
                let units: Vec<u16> = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
                String::from_utf16(&units)
                    .map_err(|e| crate::error::Error::EncodingError(format!("invalid UTF-16LE string payload: {e}")))
            }
            STRING_TAG_UTF8 => {
                let bytes = ctx.buffer().read_bytes(byte_len)?.to_vec();
                String::from_utf8(bytes)
                    .map_err(|e| crate::error::Error::EncodingError(format!("invalid UTF-8 string payload: {e}")))
            }
            other => Err(crate::error::Error::InvalidData(format!("unknown string encoding tag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    fn round_trip<T: ValueCodec + PartialEq + std::fmt::Debug>(value: T) {
        let config = Config::builder().build();
        let mut ctx = config.writer();
        value.write_payload(&mut ctx).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());
        let mut ctx = config.reader(bytes);
        assert_eq!(T::read_payload(&mut ctx).unwrap(), value);
    }

    #[test]
    fn scalars_round_trip() {
        round_trip(true);
        round_trip(-7i8);
        round_trip(200u8);
        round_trip(-1234i32);
        round_trip(4_000_000_000u32);
        round_trip(i64::MIN);
        round_trip(3.5f32);
        round_trip(2.718281828f64);
        round_trip(VarInt32(-70000));
        round_trip(VarInt64(i64::MAX));
    }

    #[test]
    fn bytes_round_trip() {
        round_trip(Bytes(vec![1, 2, 3, 255, 0]));
        round_trip(Bytes(Vec::new()));
    }

    fn string_tag(s: &str) -> u64 {
        let config = Config::builder().build();
        let mut ctx = config.writer();
        s.to_string().write_payload(&mut ctx).unwrap();
        let bytes = ctx.finish();
        let mut buf = crate::buffer::Buffer::from_owned(bytes);
        buf.read_var_uint36_small().unwrap() & 0b11
    }

    #[test]
    fn string_encoding_selection_matches_scenario_3() {
        assert_eq!(string_tag("Helloéÿ"), STRING_TAG_LATIN1);
        assert_eq!(string_tag("abc世界"), STRING_TAG_UTF8);
        assert_eq!(string_tag("你好世界a"), STRING_TAG_UTF16LE);
        let mixed: String = "a".repeat(64) + "世";
        assert_eq!(string_tag(&mixed), STRING_TAG_UTF8);
    }

    #[test]
    fn strings_round_trip_through_all_three_encodings() {
        round_trip("Helloéÿ".to_string());
        round_trip("abc世界".to_string());
        round_trip("你好世界a".to_string());
        round_trip(String::new());
    }
}
