//! The wire type kind enumeration and the registry mapping language types to
//! it. See [`registry`] for the write/read lookup tables.

pub mod registry;

pub use registry::{RegisteredType, RegistrationForm, TypeRegistry};

use weave_derive::FromRepr;

/// The small enumeration of value shapes every peer language agrees on.
/// Discriminants are the wire-format tag bytes (§6.2) and must never be
/// renumbered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
#[repr(u8)]
pub enum WireKind {
    Bool = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float32 = 9,
    Float64 = 10,
    VarInt32 = 11,
    VarInt64 = 12,
    String = 13,
    Binary = 14,
    List = 15,
    Set = 16,
    Map = 17,
    Enum = 18,
    Struct = 19,
    NamedStruct = 20,
    TaggedUnion = 21,
    None = 22,
    Unknown = 23,
}

impl WireKind {
    /// Kinds that frame a user-registered type and therefore carry either a
    /// `var_uint32(user_id)` or a namespace/name MetaString pair in their
    /// type-info prefix, and a TypeMeta block in compatibility mode.
    pub fn is_user_type(self) -> bool {
        matches!(self, WireKind::Struct | WireKind::Enum | WireKind::NamedStruct | WireKind::TaggedUnion)
    }

    /// Kinds whose payload can be skipped without knowing the target
    /// language type — used by the type-meta fallback path (§4.5) to
    /// recover from a field the reader no longer declares.
    pub fn is_statically_skippable(self) -> bool {
        matches!(
            self,
            WireKind::Bool
                | WireKind::Int8
                | WireKind::Int16
                | WireKind::Int32
                | WireKind::Int64
                | WireKind::UInt8
                | WireKind::UInt16
                | WireKind::UInt32
                | WireKind::UInt64
                | WireKind::Float32
                | WireKind::Float64
                | WireKind::VarInt32
                | WireKind::VarInt64
                | WireKind::String
                | WireKind::Binary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_repr_round_trips_every_discriminant() {
        for tag in 0u8..=23 {
            let kind = WireKind::from_repr(tag).unwrap();
            assert_eq!(kind as u8, tag);
        }
        assert!(WireKind::from_repr(24).is_none());
    }
}
