//! The object envelope, the per-value framing state machine, and the
//! capability interface (§4.7, §9) that user types implement to plug into
//! both.

pub mod collection;
pub mod map;
pub mod value;

pub use value::{read_value, read_value_element, write_value, write_value_element, write_value_null, ReadOutcome};

use crate::config::Config;
use crate::context::{IdentityKey, ReadContext, WriteContext};
use crate::error::{Error, Result};
use crate::type_meta::TypeMeta;
use crate::types::registry::RegistrationForm;
use crate::types::WireKind;
use std::any::{Any, TypeId};
use std::sync::Arc;

bitflags::bitflags! {
    /// Envelope header bits (§6.2). Everything past bit 1 is reserved and
    /// must stay zero.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct EnvelopeFlags: u8 {
        const IS_NULL = 0b01;
        const IS_XLANG = 0b10;
    }
}

/// The capability interface every serializable type implements (§9): a
/// static wire kind, payload codecs, and type-info framing with a default
/// implementation in terms of the wire kind. User code implements this by
/// hand, or a host-language binding generates it — both out of scope here.
pub trait ValueCodec: Sized + Any + Clone + Default {
    fn static_wire_kind() -> WireKind;

    fn write_payload(&self, ctx: &mut WriteContext) -> Result<()>;
    fn read_payload(ctx: &mut ReadContext) -> Result<Self>;

    /// Default: a bare one-byte wire-kind tag, correct for every scalar,
    /// string, binary, and container kind. User types (STRUCT/ENUM/
    /// NAMED_STRUCT/TAGGED_UNION) override this to additionally frame a
    /// user-type-id or namespace/name pair (§4.7).
    fn write_type_info(ctx: &mut WriteContext) -> Result<()> {
        ctx.buffer().write_fixed_u8(Self::static_wire_kind() as u8);
        Ok(())
    }

    fn read_type_info(ctx: &mut ReadContext) -> Result<WireKind> {
        let tag = ctx.buffer().read_fixed_u8()?;
        let kind = WireKind::from_repr(tag)
            .ok_or_else(|| Error::InvalidData(format!("unknown wire kind tag {tag}")))?;
        if kind != Self::static_wire_kind() {
            return Err(Error::TypeMismatch {
                expected: format!("{:?}", Self::static_wire_kind()),
                actual: format!("{kind:?}"),
            });
        }
        Ok(kind)
    }
}

/// Type-info framing for a registered user type (STRUCT/ENUM/NAMED_STRUCT/
/// TAGGED_UNION — §4.7): the wire-kind byte, then the registration form
/// (`var_uint32(user_id)` or a namespace/name MetaString pair), then one of:
/// the full TypeMeta block (compatibility mode), a 4-byte struct-hash prefix
/// (`check_struct_version`, non-compatibility mode), or nothing. A
/// hand-written `ValueCodec` implementation for a user type calls this from
/// its own `write_type_info` override instead of relying on the trait's
/// default (which only covers the unregistered scalar/container kinds).
/// `meta` feeds whichever of those two optional suffixes the config calls
/// for. Compatibility mode always needs the TypeMeta block to do field
/// reconciliation, so `meta` being `None` there is an error rather than a
/// silently shorter write. In `check_struct_version` mode the 4-byte prefix
/// is always written, even when `meta` is `None` (as a zero hash, which will
/// simply never match on the read side), so the reader's framing never
/// desyncs regardless of whether it was built with a `TypeMeta` to check
/// against.
pub fn write_struct_type_info(ctx: &mut WriteContext, type_handle: TypeId, meta: Option<&TypeMeta>) -> Result<()> {
    let registered = ctx.config().registry().lookup_by_type_handle(type_handle)?.clone();
    {
        let parts = ctx.parts();
        parts.buf.write_fixed_u8(registered.wire_kind as u8);
        match &registered.form {
            RegistrationForm::ById(id) => {
                parts.buf.write_var_uint32(*id);
            }
            RegistrationForm::ByName { namespace, name } => {
                parts.strings.write(parts.buf, namespace);
                parts.strings.write(parts.buf, name);
            }
        }
    }
    if ctx.config().compatible() {
        let meta = meta.ok_or_else(|| {
            Error::InvalidData("compatible mode requires a TypeMeta to write the type-info block".into())
        })?;
        let parts = ctx.parts();
        parts.type_meta.write(parts.buf, parts.strings, type_handle, meta);
    } else if ctx.config().check_struct_version() {
        let hash = meta.map_or(0, |meta| meta.hash as u32);
        ctx.buffer().write_fixed_u32(hash);
    }
    Ok(())
}

/// Reads the framing [`write_struct_type_info`] wrote, verifying the
/// decoded wire kind matches `type_handle`'s registration. Returns the
/// decoded `TypeMeta` when the reader is in compatibility mode, so the
/// caller can reconcile it against its own field set (§4.5). In
/// `check_struct_version` mode the 4-byte hash prefix is always consumed to
/// keep the cursor aligned with the writer's framing; `expected` — when
/// supplied — is additionally compared against it, so a caller that passes
/// `None` reads past the prefix without verifying it.
pub fn read_struct_type_info(ctx: &mut ReadContext, type_handle: TypeId, expected: Option<&TypeMeta>) -> Result<Option<TypeMeta>> {
    let registered = ctx.config().registry().lookup_by_type_handle(type_handle)?.clone();
    {
        let parts = ctx.parts();
        let tag = parts.buf.read_fixed_u8()?;
        let kind = WireKind::from_repr(tag).ok_or_else(|| Error::InvalidData(format!("unknown wire kind tag {tag}")))?;
        if kind != registered.wire_kind {
            return Err(Error::TypeMismatch { expected: format!("{:?}", registered.wire_kind), actual: format!("{kind:?}") });
        }
        match &registered.form {
            RegistrationForm::ById(_) => {
                parts.buf.read_var_uint32()?;
            }
            RegistrationForm::ByName { .. } => {
                parts.strings.read(parts.buf)?;
                parts.strings.read(parts.buf)?;
            }
        }
    }
    if ctx.config().compatible() {
        let parts = ctx.parts();
        let meta = parts.type_meta.read(parts.buf, parts.strings)?.clone();
        return Ok(Some(meta));
    }
    if ctx.config().check_struct_version() {
        let hash = ctx.buffer().read_fixed_u32()?;
        if let Some(expected) = expected {
            let expected_hash = expected.hash as u32;
            if hash != expected_hash {
                #[cfg(feature = "tracing")]
                tracing::warn!(expected_hash, hash, "check_struct_version: struct hash prefix mismatch");
                return Err(Error::TypeMismatch {
                    expected: format!("struct hash {expected_hash:#010x}"),
                    actual: format!("{hash:#010x}"),
                });
            }
        }
    }
    Ok(None)
}

/// The top-level value's ref-byte framing: `RefMode::Tracking` with a fixed
/// identity when `config.track_ref()` turns tracking on by default (§6.3),
/// `RefMode::NullOnly` otherwise. The identity is fixed rather than
/// caller-supplied because exactly one top-level value exists per call —
/// nothing else in the same `serialize`/`deserialize` call could alias it —
/// so any constant serves; `0` is as good as any other.
const TOP_LEVEL_IDENTITY: IdentityKey = 0;

fn top_level_mode(config: &Config) -> crate::refs::RefMode {
    if config.track_ref() {
        crate::refs::RefMode::Tracking
    } else {
        crate::refs::RefMode::NullOnly
    }
}

/// Writes the envelope header, then `value` under [`top_level_mode`] (a
/// top-level value is never itself a back-reference on its first and only
/// visit, but it may be the null sentinel — §3.1 "object envelope"; the
/// `RefMode::Tracking` arm instead emits the one-time ref-value byte).
/// `config.track_ref()` sets this default (§6.3); individual call sites
/// still win over it regardless — list/set/map elements always frame with
/// `RefMode::None` (§4.7) no matter what the config says, and
/// [`serialize_tracked`] lets a caller request tracking (with its own
/// identity) even when `track_ref()` is `false`.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub fn serialize<T: ValueCodec>(config: &Config, value: &T) -> Result<Vec<u8>> {
    let mut ctx = config.writer();
    let mut flags = EnvelopeFlags::empty();
    if config.xlang() {
        flags |= EnvelopeFlags::IS_XLANG;
    }
    ctx.buffer().write_fixed_u8(flags.bits());
    let identity = config.track_ref().then_some(TOP_LEVEL_IDENTITY);
    write_value(&mut ctx, top_level_mode(config), Some(value), identity)?;
    Ok(ctx.finish())
}

/// The one-byte-envelope null encoding of Scenario 6: `IS_XLANG | IS_NULL`
/// when `config.xlang()`, `IS_NULL` alone otherwise.
pub fn serialize_null(config: &Config) -> Vec<u8> {
    let mut flags = EnvelopeFlags::IS_NULL;
    if config.xlang() {
        flags |= EnvelopeFlags::IS_XLANG;
    }
    vec![flags.bits()]
}

/// Reads the envelope header, validating it against `config`, and returns a
/// context positioned right after it plus whether the top-level value is
/// the null sentinel. Shared by [`deserialize`] and [`deserialize_tracked`],
/// which differ only in which `RefMode` they read the value itself with.
fn read_envelope<'c>(config: &'c Config, data: Arc<[u8]>) -> Result<(ReadContext<'c>, bool)> {
    let mut ctx = ReadContext::from_shared(config, data);
    let header = ctx.buffer().read_fixed_u8()?;
    let flags = EnvelopeFlags::from_bits_truncate(header);
    if (header & !EnvelopeFlags::all().bits()) != 0 {
        return Err(Error::InvalidData(format!("envelope header {header:#04x} sets reserved bits")));
    }
    if flags.contains(EnvelopeFlags::IS_XLANG) != config.xlang() {
        return Err(Error::InvalidData("envelope IS_XLANG bit does not match the reader's configuration".into()));
    }
    Ok((ctx, flags.contains(EnvelopeFlags::IS_NULL)))
}

/// Reads the envelope header and, unless it declares the top-level value
/// null, the value itself under [`top_level_mode`] — the counterpart of
/// [`serialize`]. A top-level null yields `T::default()`.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub fn deserialize<T: ValueCodec>(config: &Config, data: Arc<[u8]>) -> Result<T> {
    let (mut ctx, is_null) = read_envelope(config, data)?;
    if is_null {
        return Ok(T::default());
    }
    match read_value::<T>(&mut ctx, top_level_mode(config))? {
        ReadOutcome::Value(v) => Ok(v),
        ReadOutcome::Null => Ok(T::default()),
    }
}

/// The counterpart of [`serialize_tracked`]: reads the top-level value under
/// `RefMode::Tracking` so the ref-value/ref-id bytes that call wrote are
/// framed the way this side expects. The read side never needs a
/// caller-supplied identity — `ReadRefTracker` assigns ids in the order it
/// encounters them, mirroring the write side's first-encounter order.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub fn deserialize_tracked<T: ValueCodec>(config: &Config, data: Arc<[u8]>) -> Result<T> {
    let (mut ctx, is_null) = read_envelope(config, data)?;
    if is_null {
        return Ok(T::default());
    }
    match read_value::<T>(&mut ctx, crate::refs::RefMode::Tracking)? {
        ReadOutcome::Value(v) => Ok(v),
        ReadOutcome::Null => Ok(T::default()),
    }
}

/// A variant of [`serialize`] for reference-tracked top-level values, used
/// when the caller wants identity preserved for values reachable from
/// elsewhere in the same call (most callers should prefer `serialize`). Read
/// the result back with [`deserialize_tracked`], not `deserialize` — the two
/// plain functions and the two tracked functions frame the ref byte
/// differently and are not interchangeable.
pub fn serialize_tracked<T: ValueCodec>(config: &Config, value: &T, identity: IdentityKey) -> Result<Vec<u8>> {
    let mut ctx = config.writer();
    let mut flags = EnvelopeFlags::empty();
    if config.xlang() {
        flags |= EnvelopeFlags::IS_XLANG;
    }
    ctx.buffer().write_fixed_u8(flags.bits());
    write_value(&mut ctx, crate::refs::RefMode::Tracking, Some(value), Some(identity))?;
    Ok(ctx.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Flag(bool);

    impl ValueCodec for Flag {
        fn static_wire_kind() -> WireKind {
            WireKind::Bool
        }
        fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
            ctx.buffer().write_fixed_u8(self.0 as u8);
            Ok(())
        }
        fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
            Ok(Flag(ctx.buffer().read_fixed_u8()? != 0))
        }
    }

    #[test]
    fn top_level_null_is_exactly_one_byte_and_decodes_to_default() {
        let config = Config::builder().build();
        let bytes = serialize_null(&config);
        assert_eq!(bytes, vec![0x03]);
        let decoded: Flag = deserialize(&config, Arc::from(bytes)).unwrap();
        assert_eq!(decoded, Flag::default());
    }

    #[test]
    fn non_null_value_round_trips() {
        let config = Config::builder().build();
        let bytes = serialize(&config, &Flag(true)).unwrap();
        let decoded: Flag = deserialize(&config, Arc::from(bytes)).unwrap();
        assert_eq!(decoded, Flag(true));
    }

    #[test]
    fn track_ref_config_default_is_honored_by_plain_serialize_and_deserialize() {
        // With `track_ref(true)` the top-level value is framed as
        // `RefMode::Tracking` instead of `RefMode::NullOnly`, so bytes
        // written under one setting must not be readable under the other.
        let tracking_config = Config::builder().track_ref(true).build();
        let bytes = serialize(&tracking_config, &Flag(true)).unwrap();
        let decoded: Flag = deserialize(&tracking_config, Arc::from(bytes.clone())).unwrap();
        assert_eq!(decoded, Flag(true));

        let default_config = Config::builder().build();
        let err = deserialize::<Flag>(&default_config, Arc::from(bytes)).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn mismatched_xlang_setting_is_rejected() {
        let writer_config = Config::builder().xlang(true).build();
        let reader_config = Config::builder().xlang(false).build();
        let bytes = serialize(&writer_config, &Flag(true)).unwrap();
        let err = deserialize::<Flag>(&reader_config, Arc::from(bytes)).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn serialize_tracked_round_trips_through_deserialize_tracked() {
        // `serialize`/`deserialize` frame the top-level ref byte as
        // NullOnly; `serialize_tracked`/`deserialize_tracked` frame it as
        // Tracking (REF_VALUE/REF rather than NOT_NULL_VALUE/NULL) — reading
        // one pairing's bytes with the other's mode would misparse the ref
        // byte, so this checks the two tracked functions agree with each
        // other, not with their untracked counterparts.
        let config = Config::builder().build();
        let value = Flag(true);
        let bytes = serialize_tracked(&config, &value, 7).unwrap();
        let decoded: Flag = deserialize_tracked(&config, Arc::from(bytes)).unwrap();
        assert_eq!(decoded, value);
    }

    #[derive(Debug, Clone)]
    struct Node;

    fn node_meta() -> crate::type_meta::TypeMeta {
        use crate::meta_string::{MetaString, SpecialChars};
        use crate::type_meta::{FieldDescriptor, FieldFlags};
        crate::type_meta::TypeMeta::new(
            MetaString::encode("demo", SpecialChars::NAMESPACE).unwrap(),
            MetaString::encode("Node", SpecialChars::NAMESPACE).unwrap(),
            vec![FieldDescriptor {
                name: MetaString::encode("value", SpecialChars::default()).unwrap(),
                wire_kind: WireKind::Int32,
                flags: FieldFlags::empty(),
            }],
        )
    }

    #[test]
    fn check_struct_version_accepts_a_matching_hash_prefix() {
        let mut config = Config::builder().check_struct_version(true).build();
        config.registry_mut().register_by_id(std::any::TypeId::of::<Node>(), WireKind::Struct, 7).unwrap();
        let meta = node_meta();

        let mut ctx = config.writer();
        write_struct_type_info(&mut ctx, std::any::TypeId::of::<Node>(), Some(&meta)).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());

        let mut ctx = ReadContext::from_shared(&config, bytes);
        let result = read_struct_type_info(&mut ctx, std::any::TypeId::of::<Node>(), Some(&meta)).unwrap();
        assert!(result.is_none(), "non-compatible mode never returns a decoded TypeMeta");
    }

    #[test]
    fn check_struct_version_rejects_a_mismatched_hash_prefix() {
        let mut writer_config = Config::builder().check_struct_version(true).build();
        writer_config.registry_mut().register_by_id(std::any::TypeId::of::<Node>(), WireKind::Struct, 7).unwrap();
        let mut reader_config = Config::builder().check_struct_version(true).build();
        reader_config.registry_mut().register_by_id(std::any::TypeId::of::<Node>(), WireKind::Struct, 7).unwrap();

        let writer_meta = node_meta();
        let mut ctx = writer_config.writer();
        write_struct_type_info(&mut ctx, std::any::TypeId::of::<Node>(), Some(&writer_meta)).unwrap();
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());

        use crate::meta_string::{MetaString, SpecialChars};
        use crate::type_meta::FieldDescriptor;
        let reader_meta = crate::type_meta::TypeMeta::new(
            MetaString::encode("demo", SpecialChars::NAMESPACE).unwrap(),
            MetaString::encode("Node", SpecialChars::NAMESPACE).unwrap(),
            vec![FieldDescriptor {
                name: MetaString::encode("value", SpecialChars::default()).unwrap(),
                wire_kind: WireKind::String,
                flags: crate::type_meta::FieldFlags::empty(),
            }],
        );

        let mut ctx = ReadContext::from_shared(&reader_config, bytes);
        let err = read_struct_type_info(&mut ctx, std::any::TypeId::of::<Node>(), Some(&reader_meta)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn check_struct_version_without_expected_still_consumes_the_hash_prefix() {
        let mut config = Config::builder().check_struct_version(true).build();
        config.registry_mut().register_by_id(std::any::TypeId::of::<Node>(), WireKind::Struct, 7).unwrap();
        let meta = node_meta();

        let mut ctx = config.writer();
        write_struct_type_info(&mut ctx, std::any::TypeId::of::<Node>(), Some(&meta)).unwrap();
        ctx.buffer().write_fixed_u8(0xAB);
        let bytes: Arc<[u8]> = Arc::from(ctx.finish());

        let mut ctx = ReadContext::from_shared(&config, bytes);
        let result = read_struct_type_info(&mut ctx, std::any::TypeId::of::<Node>(), None).unwrap();
        assert!(result.is_none());
        assert_eq!(ctx.buffer().read_fixed_u8().unwrap(), 0xAB, "cursor must land right after the hash prefix");
    }
}
