//! List/set payload framing (§4.7): `var_uint32(length)`, a header byte of
//! shape bits, then the elements themselves.
//!
//! A statically-typed Rust collection (`Vec<T>`, `HashSet<T>`) always holds
//! one concrete `T`, so the runtime-polymorphism bits the wire format
//! allows (`IS_SAME_TYPE = false`, heterogeneous elements needing per-
//! element type info) never apply here — that path belongs to the
//! reflection-driven dynamic-language bindings §1 puts out of scope. Every
//! collection this module writes sets `IS_DECLARED_ELEMENT_TYPE` and
//! `IS_SAME_TYPE`, so elements are framed with `write_value_element`/
//! `read_value_element` instead of `write_value`/`read_value`: the element
//! type is the declared generic parameter, and repeating a per-element tag
//! for it would just be dead weight on every entry.

use crate::context::{ReadContext, WriteContext};
use crate::error::Result;
use crate::protocol::value::{read_value_element, write_value_element, ReadOutcome};
use crate::protocol::ValueCodec;
use crate::refs::RefMode;
use crate::types::WireKind;
use std::collections::{BTreeSet, HashSet};

bitflags::bitflags! {
    /// Collection header bits, LSB first, exactly as spec.md §4.7 lists
    /// them.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct CollectionHeader: u8 {
        const TRACKING_REF = 0b0001;
        const HAS_NULL = 0b0010;
        const IS_DECLARED_ELEMENT_TYPE = 0b0100;
        const IS_SAME_TYPE = 0b1000;
    }
}

fn element_mode(header: CollectionHeader) -> RefMode {
    if header.contains(CollectionHeader::TRACKING_REF) {
        RefMode::Tracking
    } else if header.contains(CollectionHeader::HAS_NULL) {
        RefMode::NullOnly
    } else {
        RefMode::None
    }
}

fn header_for(mode: RefMode) -> CollectionHeader {
    let mut header = CollectionHeader::IS_DECLARED_ELEMENT_TYPE | CollectionHeader::IS_SAME_TYPE;
    match mode {
        RefMode::None => {}
        RefMode::NullOnly => header |= CollectionHeader::HAS_NULL,
        RefMode::Tracking => header |= CollectionHeader::TRACKING_REF | CollectionHeader::HAS_NULL,
    }
    header
}

/// Writes `len`, the header byte, then delegates each element to `write_one`.
fn write_collection<T>(
    ctx: &mut WriteContext,
    len: usize,
    mode: RefMode,
    mut write_one: impl FnMut(&mut WriteContext, usize) -> Result<()>,
) -> Result<()>
where
    T: ValueCodec,
{
    ctx.buffer().write_var_uint32(len as u32);
    if len == 0 {
        return Ok(());
    }
    ctx.buffer().write_fixed_u8(header_for(mode).bits());
    for i in 0..len {
        write_one(ctx, i)?;
    }
    Ok(())
}

fn read_collection<T>(ctx: &mut ReadContext) -> Result<(usize, RefMode)>
where
    T: ValueCodec,
{
    let len = ctx.buffer().read_var_uint32()? as usize;
    if len == 0 {
        return Ok((0, RefMode::None));
    }
    let header = CollectionHeader::from_bits_truncate(ctx.buffer().read_fixed_u8()?);
    Ok((len, element_mode(header)))
}

/// Non-nullable, non-tracked elements — the common case for `Vec<T>` and
/// `HashSet<T>`/`BTreeSet<T>`.
pub fn write_list<T: ValueCodec>(ctx: &mut WriteContext, items: &[T]) -> Result<()> {
    write_collection::<T>(ctx, items.len(), RefMode::None, |ctx, i| {
        write_value_element(ctx, RefMode::None, Some(&items[i]), None)
    })
}

pub fn read_list<T: ValueCodec>(ctx: &mut ReadContext) -> Result<Vec<T>> {
    let (len, mode) = read_collection::<T>(ctx)?;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        match read_value_element::<T>(ctx, mode)? {
            ReadOutcome::Value(v) => out.push(v),
            ReadOutcome::Null => {
                return Err(crate::error::Error::InvalidData(
                    "unexpected null element in a non-nullable list".into(),
                ))
            }
        }
    }
    Ok(out)
}

/// Elements framed with `RefMode::NullOnly`, for fields shaped
/// `Vec<Option<T>>`. A dedicated entry point rather than a blanket
/// `ValueCodec` impl for `Vec<Option<T>>` — Rust's coherence rules won't
/// let that coexist with the plain `Vec<T>` impl above.
pub fn write_list_nullable<T: ValueCodec>(ctx: &mut WriteContext, items: &[Option<T>]) -> Result<()> {
    write_collection::<T>(ctx, items.len(), RefMode::NullOnly, |ctx, i| {
        write_value_element(ctx, RefMode::NullOnly, items[i].as_ref(), None)
    })
}

pub fn read_list_nullable<T: ValueCodec>(ctx: &mut ReadContext) -> Result<Vec<Option<T>>> {
    let (len, mode) = read_collection::<T>(ctx)?;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_value_element::<T>(ctx, mode)?.into_option());
    }
    Ok(out)
}

impl<T: ValueCodec> ValueCodec for Vec<T> {
    fn static_wire_kind() -> WireKind {
        WireKind::List
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        write_list(ctx, self)
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        read_list(ctx)
    }
}

impl<T: ValueCodec + Eq + std::hash::Hash> ValueCodec for HashSet<T> {
    fn static_wire_kind() -> WireKind {
        WireKind::Set
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        let items: Vec<&T> = self.iter().collect();
        write_collection::<T>(ctx, items.len(), RefMode::None, |ctx, i| {
            write_value_element(ctx, RefMode::None, Some(items[i]), None)
        })
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        Ok(read_list::<T>(ctx)?.into_iter().collect())
    }
}

impl<T: ValueCodec + Ord> ValueCodec for BTreeSet<T> {
    fn static_wire_kind() -> WireKind {
        WireKind::Set
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
        let items: Vec<&T> = self.iter().collect();
        write_collection::<T>(ctx, items.len(), RefMode::None, |ctx, i| {
            write_value_element(ctx, RefMode::None, Some(items[i]), None)
        })
    }
    fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
        Ok(read_list::<T>(ctx)?.into_iter().collect())
    }
}
