//! The per-value framing state machine (§4.7, §4.8): ref byte, type info,
//! payload — the three steps every value passes through regardless of
//! scalar/string/collection/struct shape. Collection and map element
//! framing (§4.7) reuse these same two entry points per element/entry.

use crate::context::{IdentityKey, ReadContext, WriteContext};
use crate::error::{Error, Result};
use crate::protocol::ValueCodec;
use crate::refs::{RefFlag, RefMode, WriteDecision};
use std::any::Any;
use std::sync::Arc;

/// The result of decoding one framed value: either a concrete value, or the
/// null sentinel — callers map the latter to `T::default()` or `None`.
#[derive(Debug, Clone)]
pub enum ReadOutcome<T> {
    Value(T),
    Null,
}

impl<T> ReadOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            ReadOutcome::Value(v) => Some(v),
            ReadOutcome::Null => None,
        }
    }
}

/// Writes one framed value: ref byte (unless `mode == RefMode::None`), type
/// info, payload (awaiting_ref_flag → awaiting_type_info → awaiting_payload
/// in §4.8's terms). `identity` is consulted only when `mode ==
/// RefMode::Tracking` and `value.is_some()`.
pub fn write_value<T: ValueCodec>(
    ctx: &mut WriteContext,
    mode: RefMode,
    value: Option<&T>,
    identity: Option<IdentityKey>,
) -> Result<()> {
    write_value_impl::<T>(ctx, mode, value, identity, true)
}

/// The counterpart of [`write_value`] for a collection/map element whose
/// type was already declared once at the container header
/// (`IS_DECLARED_ELEMENT_TYPE`, §4.7) — every element skips the per-value
/// type-info tag [`write_value`] would otherwise repeat.
pub fn write_value_element<T: ValueCodec>(
    ctx: &mut WriteContext,
    mode: RefMode,
    value: Option<&T>,
    identity: Option<IdentityKey>,
) -> Result<()> {
    write_value_impl::<T>(ctx, mode, value, identity, false)
}

fn write_value_impl<T: ValueCodec>(
    ctx: &mut WriteContext,
    mode: RefMode,
    value: Option<&T>,
    identity: Option<IdentityKey>,
    emit_type_info: bool,
) -> Result<()> {
    let Some(value) = value else {
        return write_value_null(ctx, mode);
    };

    match mode {
        RefMode::None => {
            if emit_type_info {
                T::write_type_info(ctx)?;
            }
            value.write_payload(ctx)
        }
        RefMode::NullOnly => {
            RefFlag::NotNullValue.write(ctx.buffer());
            if emit_type_info {
                T::write_type_info(ctx)?;
            }
            value.write_payload(ctx)
        }
        RefMode::Tracking => {
            let identity = identity
                .ok_or_else(|| Error::RefError("RefMode::Tracking requires an identity key".into()))?;
            match ctx.refs().visit(identity) {
                WriteDecision::FirstOccurrence => {
                    RefFlag::RefValue.write(ctx.buffer());
                    if emit_type_info {
                        T::write_type_info(ctx)?;
                    }
                    value.write_payload(ctx)
                }
                WriteDecision::BackReference(id) => {
                    RefFlag::Ref.write(ctx.buffer());
                    ctx.buffer().write_var_uint32(id);
                    Ok(())
                }
            }
        }
    }
}

/// Writes the null sentinel for `mode`. `RefMode::None` refuses: a call
/// site that declared no ref byte has no way to represent a missing value
/// (§4.8: "the writer must refuse to serialize a missing value").
pub fn write_value_null(ctx: &mut WriteContext, mode: RefMode) -> Result<()> {
    match mode {
        RefMode::None => {
            Err(Error::InvalidData("cannot serialize a null value at a call site with RefMode::None".into()))
        }
        RefMode::NullOnly | RefMode::Tracking => {
            RefFlag::Null.write(ctx.buffer());
            Ok(())
        }
    }
}

/// Reads one framed value under `mode`, mirroring [`write_value`].
pub fn read_value<T: ValueCodec>(ctx: &mut ReadContext, mode: RefMode) -> Result<ReadOutcome<T>> {
    read_value_impl::<T>(ctx, mode, true)
}

/// The counterpart of [`write_value_element`]: reads a collection/map
/// element whose type was already declared once at the container header,
/// so no per-value type-info tag precedes the payload.
pub fn read_value_element<T: ValueCodec>(ctx: &mut ReadContext, mode: RefMode) -> Result<ReadOutcome<T>> {
    read_value_impl::<T>(ctx, mode, false)
}

fn read_value_impl<T: ValueCodec>(ctx: &mut ReadContext, mode: RefMode, expect_type_info: bool) -> Result<ReadOutcome<T>> {
    match mode {
        RefMode::None => {
            if expect_type_info {
                T::read_type_info(ctx)?;
            }
            Ok(ReadOutcome::Value(T::read_payload(ctx)?))
        }
        RefMode::NullOnly => match RefFlag::read(ctx.buffer())? {
            RefFlag::Null => Ok(ReadOutcome::Null),
            RefFlag::NotNullValue => {
                if expect_type_info {
                    T::read_type_info(ctx)?;
                }
                Ok(ReadOutcome::Value(T::read_payload(ctx)?))
            }
            other => {
                Err(Error::InvalidData(format!("unexpected ref flag {other:?} at a RefMode::NullOnly call site")))
            }
        },
        RefMode::Tracking => match RefFlag::read(ctx.buffer())? {
            RefFlag::Null => Ok(ReadOutcome::Null),
            RefFlag::Ref => {
                let id = ctx.buffer().read_var_uint32()?;
                let any = ctx.refs().resolve(id)?;
                let value = any
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or_else(|| Error::RefError(format!("ref id {id} resolved to an unexpected type")))?;
                Ok(ReadOutcome::Value(value))
            }
            RefFlag::RefValue => {
                // Reserve and bind a placeholder before decoding the payload,
                // so a value that contains a reference to itself resolves
                // that nested `RefFlag::Ref` against the placeholder instead
                // of an empty slot (§4.6, §9 "cyclic graphs require
                // forward-reference reservation"). The placeholder is
                // overwritten with the real value once `read_payload`
                // returns; a later, non-cyclic reference to this id always
                // sees the final value, never the placeholder, because
                // binding happens synchronously before control returns to
                // any caller that could resolve the id again.
                let id = ctx.refs().reserve();
                ctx.refs().bind(id, Arc::new(T::default()) as Arc<dyn Any>);
                if expect_type_info {
                    T::read_type_info(ctx)?;
                }
                let value = T::read_payload(ctx)?;
                ctx.refs().bind(id, Arc::new(value.clone()) as Arc<dyn Any>);
                Ok(ReadOutcome::Value(value))
            }
            RefFlag::NotNullValue => {
                if expect_type_info {
                    T::read_type_info(ctx)?;
                }
                Ok(ReadOutcome::Value(T::read_payload(ctx)?))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::WireKind;
    use std::sync::Arc;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Counter(u32);

    impl ValueCodec for Counter {
        fn static_wire_kind() -> WireKind {
            WireKind::VarInt32
        }
        fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
            ctx.buffer().write_var_uint32(self.0);
            Ok(())
        }
        fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
            Ok(Counter(ctx.buffer().read_var_uint32()?))
        }
    }

    #[test]
    fn null_only_round_trips_value_and_null() {
        let config = Config::builder().build();
        let mut ctx = config.writer();
        write_value(&mut ctx, RefMode::NullOnly, Some(&Counter(7)), None).unwrap();
        write_value::<Counter>(&mut ctx, RefMode::NullOnly, None, None).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());

        let mut ctx = config.reader(bytes);
        assert!(matches!(read_value::<Counter>(&mut ctx, RefMode::NullOnly).unwrap(), ReadOutcome::Value(Counter(7))));
        assert!(matches!(read_value::<Counter>(&mut ctx, RefMode::NullOnly).unwrap(), ReadOutcome::Null));
    }

    #[test]
    fn element_entry_points_omit_the_type_info_tag() {
        let config = Config::builder().build();

        let mut ctx = config.writer();
        write_value(&mut ctx, RefMode::None, Some(&Counter(7)), None).unwrap();
        let with_tag = ctx.finish().len();

        let mut ctx = config.writer();
        write_value_element(&mut ctx, RefMode::None, Some(&Counter(7)), None).unwrap();
        let without_tag = ctx.finish();
        assert_eq!(without_tag.len(), with_tag - 1, "the element entry point must skip the one-byte wire-kind tag");

        let mut ctx = config.reader(Arc::from(without_tag));
        assert!(matches!(read_value_element::<Counter>(&mut ctx, RefMode::None).unwrap(), ReadOutcome::Value(Counter(7))));
    }

    #[test]
    fn none_mode_refuses_null() {
        let config = Config::builder().build();
        let mut ctx = config.writer();
        let err = write_value_null(&mut ctx, RefMode::None).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn tracking_mode_emits_back_reference_for_repeated_identity() {
        let config = Config::builder().build();
        let mut ctx = config.writer();
        write_value(&mut ctx, RefMode::Tracking, Some(&Counter(1)), Some(42)).unwrap();
        write_value(&mut ctx, RefMode::Tracking, Some(&Counter(1)), Some(42)).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());

        let mut ctx = config.reader(bytes);
        let first = read_value::<Counter>(&mut ctx, RefMode::Tracking).unwrap();
        let second = read_value::<Counter>(&mut ctx, RefMode::Tracking).unwrap();
        assert!(matches!(first, ReadOutcome::Value(Counter(1))));
        assert!(matches!(second, ReadOutcome::Value(Counter(1))));
    }

    /// A struct whose payload contains a reference back to its own identity
    /// — `next` pointing at the node currently being written/read. Since an
    /// owned `Box<Self>` can never literally alias `self`, the wire-level
    /// cycle is modeled the way the spec's identity tracking models any
    /// shared or cyclic reference: by reusing the same `IdentityKey` for the
    /// outer call and the nested one, rather than by an actual recursive
    /// field.
    #[derive(Debug, Default, Clone, PartialEq)]
    struct CyclicNode {
        id: IdentityKey,
        value: u32,
    }

    impl ValueCodec for CyclicNode {
        fn static_wire_kind() -> WireKind {
            WireKind::Struct
        }
        fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
            ctx.buffer().write_var_uint32(self.value);
            ctx.buffer().write_fixed_u64(self.id);
            write_value(ctx, RefMode::Tracking, Some(self), Some(self.id))
        }
        fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
            let value = ctx.buffer().read_var_uint32()?;
            let id = ctx.buffer().read_fixed_u64()?;
            // Resolves against the in-flight placeholder bound by `read_value`
            // before this function was called, not the fully-decoded node —
            // the point of this test is that it resolves at all.
            read_value::<CyclicNode>(ctx, RefMode::Tracking)?;
            Ok(CyclicNode { id, value })
        }
    }

    #[test]
    fn self_referential_value_decodes_through_read_value_without_erroring() {
        let config = Config::builder().build();
        let mut ctx = config.writer();
        let node = CyclicNode { id: 42, value: 99 };
        write_value(&mut ctx, RefMode::Tracking, Some(&node), Some(node.id)).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());

        let mut ctx = config.reader(bytes);
        let outcome = read_value::<CyclicNode>(&mut ctx, RefMode::Tracking).unwrap();
        assert!(matches!(outcome, ReadOutcome::Value(CyclicNode { value: 99, .. })));
    }
}
