//! weave — a language-independent engine for cross-language binary
//! object-graph serialization.
//!
//! The crate is organized the way the wire format itself layers:
//!
//! - [`buffer`] — the byte store and every integer/varint codec.
//! - [`meta_string`] — compact identifier encoding for names.
//! - [`types`] — the wire-kind enumeration and the type registry.
//! - [`type_meta`] — structural schema descriptors for compatibility mode.
//! - [`refs`] — reference/identity tracking for shared and cyclic values.
//! - [`context`] — the per-call state ([`WriteContext`](context::WriteContext)/
//!   [`ReadContext`](context::ReadContext)) every other layer writes through.
//! - [`config`] — the long-lived, shared [`Config`](config::Config).
//! - [`protocol`] — the object envelope, per-value ref-byte framing, and the
//!   [`ValueCodec`](protocol::ValueCodec) capability interface user types
//!   implement.
//! - [`codecs`] — [`ValueCodec`](protocol::ValueCodec) implementations for
//!   the built-in scalar, string, and binary wire kinds.
//!
//! What this crate deliberately does not do: generate per-struct
//! `ValueCodec` implementations from derive macros, or provide host-language
//! FFI bindings. Both are jobs for a layer built on top of this one.

pub mod buffer;
pub mod codecs;
pub mod config;
pub mod context;
pub mod error;
pub mod meta_string;
pub mod protocol;
pub mod refs;
pub mod type_meta;
pub mod types;

pub use codecs::{Bytes, VarInt32, VarInt64};
pub use config::{Config, ConfigBuilder};
pub use context::{IdentityKey, ReadContext, WriteContext};
pub use error::{Error, Result};
pub use protocol::{
    deserialize, deserialize_tracked, read_struct_type_info, serialize, serialize_null, serialize_tracked,
    write_struct_type_info, ReadOutcome, ValueCodec,
};
pub use refs::RefMode;
pub use types::{TypeRegistry, WireKind};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl ValueCodec for Point {
        fn static_wire_kind() -> WireKind {
            WireKind::Struct
        }
        fn write_payload(&self, ctx: &mut WriteContext) -> Result<()> {
            ctx.buffer().write_fixed_i32(self.x);
            ctx.buffer().write_fixed_i32(self.y);
            Ok(())
        }
        fn read_payload(ctx: &mut ReadContext) -> Result<Self> {
            Ok(Point { x: ctx.buffer().read_fixed_i32()?, y: ctx.buffer().read_fixed_i32()? })
        }
    }

    #[test]
    fn struct_round_trips_through_the_envelope() {
        let config = Config::builder().build();
        let bytes = serialize(&config, &Point { x: 3, y: -4 }).unwrap();
        let decoded: Point = deserialize(&config, std::sync::Arc::from(bytes)).unwrap();
        assert_eq!(decoded, Point { x: 3, y: -4 });
    }

    #[test]
    fn list_of_structs_round_trips() {
        let config = Config::builder().build();
        let points = vec![Point { x: 1, y: 1 }, Point { x: 2, y: 2 }];
        let bytes = serialize(&config, &points).unwrap();
        let decoded: Vec<Point> = deserialize(&config, std::sync::Arc::from(bytes)).unwrap();
        assert_eq!(decoded, points);
    }

    #[test]
    fn map_of_strings_to_points_round_trips() {
        let config = Config::builder().build();
        let mut map = HashMap::new();
        map.insert("origin".to_string(), Point::default());
        map.insert("unit".to_string(), Point { x: 1, y: 1 });
        let bytes = serialize(&config, &map).unwrap();
        let decoded: HashMap<String, Point> = deserialize(&config, std::sync::Arc::from(bytes)).unwrap();
        assert_eq!(decoded, map);
    }
}
