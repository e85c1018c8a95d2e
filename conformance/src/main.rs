//! Runs the literal byte-exact scenarios against fixed expected vectors,
//! plus a handful of larger round-trip fixtures. A failed assertion aborts
//! the process — this binary is a conformance harness, not a test runner.

use std::collections::HashMap;
use std::sync::Arc;

use weave::buffer::Buffer;
use weave::types::WireKind;
use weave::{Config, ReadContext, ValueCodec, WriteContext};

fn scenario_1_varint_byte_counts() {
    let cases: &[(u32, usize)] =
        &[(1, 1), (64, 1), (128, 2), (8191, 2), (8192, 3), (1_048_575, 3), (1_048_576, 4), (134_217_727, 4), (134_217_728, 5)];
    for &(value, expected_len) in cases {
        let mut buf = Buffer::new();
        let written = buf.write_var_uint32(value);
        assert_eq!(written, expected_len, "var_uint32({value}) wrote {written} bytes, expected {expected_len}");
        assert_eq!(buf.read_var_uint32().unwrap(), value);
    }
    println!("scenario 1 (varint byte counts): ok");
}

fn scenario_2_tagged_u64() {
    let mut buf = Buffer::new();
    buf.write_tagged_u64(0x1_2345_6789);
    assert_eq!(buf.as_slice(), [0x01, 0x89, 0x67, 0x45, 0x23, 0x01, 0x00, 0x00, 0x00]);
    assert_eq!(buf.read_tagged_u64().unwrap(), 0x1_2345_6789);

    let mut buf = Buffer::new();
    buf.write_tagged_u64(0x7FFF_FFFF);
    assert_eq!(buf.as_slice(), [0xFE, 0xFF, 0xFF, 0xFF]);
    assert_eq!(buf.read_tagged_u64().unwrap(), 0x7FFF_FFFF);
    println!("scenario 2 (tagged u64): ok");
}

fn string_encoding_tag(config: &Config, s: &str) -> u64 {
    let mut ctx = config.writer();
    s.to_string().write_payload(&mut ctx).unwrap();
    let bytes = ctx.finish();
    let mut buf = Buffer::from_owned(bytes);
    buf.read_var_uint36_small().unwrap() & 0b11
}

fn scenario_3_string_encoding_selection(config: &Config) {
    assert_eq!(string_encoding_tag(config, "Helloéÿ"), 0, "Latin-1");
    assert_eq!(string_encoding_tag(config, "abc世界"), 2, "UTF-8");
    assert_eq!(string_encoding_tag(config, "你好世界a"), 1, "UTF-16LE");
    let mixed = "a".repeat(64) + "世";
    assert_eq!(string_encoding_tag(config, &mixed), 2, "UTF-8 past the 64-byte Latin sample");
    println!("scenario 3 (string encoding selection): ok");
}

/// A node whose `next` points back at itself, identified by `id` rather than
/// by address (an owned `Box<Self>` can never literally alias `self`). The
/// outer call and the nested `next` field reuse the same identity, so the
/// write side's second visit is a back-reference and the read side's nested
/// resolve hits the placeholder `read_value` binds before decoding the
/// payload — see DESIGN.md for the read-side placeholder-then-rebind fix.
#[derive(Debug, Default, Clone, PartialEq)]
struct CyclicNode {
    id: u64,
    value: i32,
}

impl ValueCodec for CyclicNode {
    fn static_wire_kind() -> WireKind {
        WireKind::Struct
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> weave::Result<()> {
        ctx.buffer().write_fixed_i32(self.value);
        ctx.buffer().write_fixed_u64(self.id);
        weave::protocol::write_value(ctx, weave::RefMode::Tracking, Some(self), Some(self.id))
    }
    fn read_payload(ctx: &mut ReadContext) -> weave::Result<Self> {
        let value = ctx.buffer().read_fixed_i32()?;
        let id = ctx.buffer().read_fixed_u64()?;
        weave::protocol::read_value::<CyclicNode>(ctx, weave::RefMode::Tracking)?;
        Ok(CyclicNode { id, value })
    }
}

fn scenario_4_reference_cycle(config: &Config) {
    let node = CyclicNode { id: 7, value: 7 };
    let bytes = weave::serialize_tracked(config, &node, node.id).unwrap();
    let decoded: CyclicNode = weave::deserialize_tracked(config, Arc::from(bytes)).unwrap();
    assert_eq!(decoded, node, "a node whose own `next` points back at itself decodes cleanly");
    println!("scenario 4 (reference cycle): ok");
}

fn scenario_5_schema_evolution() {
    use weave::meta_string::{MetaString, SpecialChars};
    use weave::type_meta::{FieldDescriptor, FieldFlags, TypeMeta};

    let writer_meta = TypeMeta::new(
        MetaString::encode("demo", SpecialChars::NAMESPACE).unwrap(),
        MetaString::encode("T200", SpecialChars::NAMESPACE).unwrap(),
        vec![FieldDescriptor {
            name: MetaString::encode("f1", SpecialChars::default()).unwrap(),
            wire_kind: WireKind::String,
            flags: FieldFlags::empty(),
        }],
    );

    let config = Config::builder().compatible(true).build();
    let mut ctx = config.writer();
    "hello".to_string().write_payload(&mut ctx).unwrap();
    let payload_bytes = ctx.finish();

    // The reader's local schema declares f2, which the writer never sent.
    let f1 = writer_meta.field("f1", SpecialChars::default());
    let f2 = writer_meta.field("f2", SpecialChars::default());
    assert!(f1.is_some());
    assert!(f2.is_none(), "the writer's TypeMeta has no f2 descriptor");

    let mut read_ctx = ReadContext::from_owned(&config, payload_bytes);
    let f1_value = String::read_payload(&mut read_ctx).unwrap();
    let f2_value = String::default(); // f2 missing from the writer meta -> declared default
    assert_eq!(f1_value, "hello");
    assert_eq!(f2_value, "");

    // Field removed on the writer's side: the writer's own TypeMeta simply
    // never declared it, same lookup-miss path as above, opposite direction.
    let writer_after_removal = TypeMeta::new(
        MetaString::encode("demo", SpecialChars::NAMESPACE).unwrap(),
        MetaString::encode("T200", SpecialChars::NAMESPACE).unwrap(),
        vec![],
    );
    assert!(writer_after_removal.field("f1", SpecialChars::default()).is_none(), "writer removed the field entirely");

    // Field retyped incompatibly: same field name, different wire kind,
    // which changes the struct hash and check_struct_version rejects.
    struct RetypedNode;
    let mut writer_config = Config::builder().check_struct_version(true).build();
    writer_config.registry_mut().register_by_id(std::any::TypeId::of::<RetypedNode>(), WireKind::Struct, 55).unwrap();
    let mut reader_config = Config::builder().check_struct_version(true).build();
    reader_config.registry_mut().register_by_id(std::any::TypeId::of::<RetypedNode>(), WireKind::Struct, 55).unwrap();

    let before_retype = TypeMeta::new(
        MetaString::encode("demo", SpecialChars::NAMESPACE).unwrap(),
        MetaString::encode("RetypedNode", SpecialChars::NAMESPACE).unwrap(),
        vec![FieldDescriptor {
            name: MetaString::encode("f1", SpecialChars::default()).unwrap(),
            wire_kind: WireKind::String,
            flags: FieldFlags::empty(),
        }],
    );
    let after_retype = TypeMeta::new(
        MetaString::encode("demo", SpecialChars::NAMESPACE).unwrap(),
        MetaString::encode("RetypedNode", SpecialChars::NAMESPACE).unwrap(),
        vec![FieldDescriptor {
            name: MetaString::encode("f1", SpecialChars::default()).unwrap(),
            wire_kind: WireKind::Int32,
            flags: FieldFlags::empty(),
        }],
    );

    let mut ctx = writer_config.writer();
    weave::write_struct_type_info(&mut ctx, std::any::TypeId::of::<RetypedNode>(), Some(&before_retype)).unwrap();
    let bytes: Arc<[u8]> = Arc::from(ctx.finish());

    let mut ctx = ReadContext::from_shared(&reader_config, bytes);
    let err = weave::read_struct_type_info(&mut ctx, std::any::TypeId::of::<RetypedNode>(), Some(&after_retype)).unwrap_err();
    assert!(matches!(err, weave::Error::TypeMismatch { .. }), "retyping a field changes the struct hash");

    println!("scenario 5 (schema evolution): ok");
}

/// Two fields that share one identity when `same_identity` is set, else two
/// distinct ones — the harness for comparing a tracked pair that dedupes
/// against one that doesn't.
#[derive(Debug, Default, Clone, PartialEq)]
struct SharedPair {
    first: Point,
    second: Point,
    same_identity: bool,
}

impl ValueCodec for SharedPair {
    fn static_wire_kind() -> WireKind {
        WireKind::Struct
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> weave::Result<()> {
        ctx.buffer().write_fixed_u8(self.same_identity as u8);
        let second_identity = if self.same_identity { 0 } else { 1 };
        weave::protocol::write_value(ctx, weave::RefMode::Tracking, Some(&self.first), Some(0))?;
        weave::protocol::write_value(ctx, weave::RefMode::Tracking, Some(&self.second), Some(second_identity))?;
        Ok(())
    }
    fn read_payload(ctx: &mut ReadContext) -> weave::Result<Self> {
        let same_identity = ctx.buffer().read_fixed_u8()? != 0;
        let first = weave::protocol::read_value::<Point>(ctx, weave::RefMode::Tracking)?.into_option().unwrap();
        let second = weave::protocol::read_value::<Point>(ctx, weave::RefMode::Tracking)?.into_option().unwrap();
        Ok(SharedPair { first, second, same_identity })
    }
}

fn fixture_reference_tracking_on_vs_off() {
    // Two fields holding the same point: one pair shares an identity (the
    // second field collapses to a two-byte back-reference), the other does
    // not (the second field writes a full second payload). The shared-
    // identity encoding must be strictly smaller.
    let point = Point { x: 3, y: 4 };

    let distinct = SharedPair { first: point.clone(), second: point.clone(), same_identity: false };
    let distinct_bytes = weave::serialize(&Config::builder().build(), &distinct).unwrap();
    let decoded_distinct: SharedPair = weave::deserialize(&Config::builder().build(), Arc::from(distinct_bytes.clone())).unwrap();
    assert_eq!(decoded_distinct, distinct);

    let shared = SharedPair { first: point.clone(), second: point.clone(), same_identity: true };
    let shared_bytes = weave::serialize(&Config::builder().build(), &shared).unwrap();
    let decoded_shared: SharedPair = weave::deserialize(&Config::builder().build(), Arc::from(shared_bytes.clone())).unwrap();
    assert_eq!(decoded_shared, shared);

    assert!(
        shared_bytes.len() < distinct_bytes.len(),
        "a second field sharing the first field's identity must collapse to a back-reference"
    );
    println!("fixture (reference tracking on vs off): ok");
}

fn fixture_track_ref_config_default() {
    // `track_ref(true)` makes plain `serialize`/`deserialize` frame the
    // top-level value as `RefMode::Tracking` instead of `RefMode::NullOnly`
    // without the caller reaching for `serialize_tracked` at all.
    let tracking_config = Config::builder().track_ref(true).build();
    let point = Point { x: 5, y: -5 };
    let bytes = weave::serialize(&tracking_config, &point).unwrap();
    let decoded: Point = weave::deserialize(&tracking_config, Arc::from(bytes)).unwrap();
    assert_eq!(decoded, point);
    println!("fixture (track_ref config default): ok");
}

fn scenario_6_envelope_null() {
    let config = Config::builder().build();
    let bytes = weave::serialize_null(&config);
    assert_eq!(bytes, vec![0x03]);
    let decoded: i32 = weave::deserialize(&config, Arc::from(bytes)).unwrap();
    assert_eq!(decoded, i32::default());
    println!("scenario 6 (envelope null): ok");
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

impl ValueCodec for Point {
    fn static_wire_kind() -> WireKind {
        WireKind::Struct
    }
    fn write_payload(&self, ctx: &mut WriteContext) -> weave::Result<()> {
        ctx.buffer().write_fixed_i32(self.x);
        ctx.buffer().write_fixed_i32(self.y);
        Ok(())
    }
    fn read_payload(ctx: &mut ReadContext) -> weave::Result<Self> {
        Ok(Point { x: ctx.buffer().read_fixed_i32()?, y: ctx.buffer().read_fixed_i32()? })
    }
}

fn fixture_list_of_structs(config: &Config) {
    let points = vec![Point { x: 1, y: -1 }, Point { x: 2, y: -2 }, Point { x: 3, y: -3 }];
    let bytes = weave::serialize(config, &points).unwrap();
    let decoded: Vec<Point> = weave::deserialize(config, Arc::from(bytes)).unwrap();
    assert_eq!(decoded, points);
    println!("fixture (list of structs): ok");
}

fn fixture_map_of_lists(config: &Config) {
    let mut fixture: HashMap<String, Vec<i32>> = HashMap::new();
    fixture.insert("evens".to_string(), vec![2, 4, 6]);
    fixture.insert("odds".to_string(), vec![1, 3, 5, 7]);
    fixture.insert("empty".to_string(), vec![]);
    let bytes = weave::serialize(config, &fixture).unwrap();
    let decoded: HashMap<String, Vec<i32>> = weave::deserialize(config, Arc::from(bytes)).unwrap();
    assert_eq!(decoded, fixture);
    println!("fixture (map of lists): ok");
}

fn fixture_tracked_shared_value(config: &Config) {
    let shared = Point { x: 9, y: 9 };
    let list = vec![shared.clone(), shared.clone()];
    let bytes = weave::serialize_tracked(config, &list, 0xAB).unwrap();
    let decoded: Vec<Point> = weave::deserialize_tracked(config, Arc::from(bytes)).unwrap();
    assert_eq!(decoded, list);
    println!("fixture (tracked top-level value): ok");
}

fn main() {
    let config = Config::builder().build();

    scenario_1_varint_byte_counts();
    scenario_2_tagged_u64();
    scenario_3_string_encoding_selection(&config);
    scenario_4_reference_cycle(&config);
    scenario_5_schema_evolution();
    scenario_6_envelope_null();

    fixture_list_of_structs(&config);
    fixture_map_of_lists(&config);
    fixture_tracked_shared_value(&config);
    fixture_reference_tracking_on_vs_off();
    fixture_track_ref_config_default();

    println!("all conformance checks passed");
}
