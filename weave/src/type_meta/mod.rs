//! Structural schema descriptors for named composite values, used so that a
//! reader in compatibility mode (§6.3 `compatible`) can decode a struct even
//! when its locally-declared fields don't exactly match the writer's.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::meta_string::{MetaString, MetaStringReadTable, MetaStringWriteTable};
use crate::types::WireKind;
use fxhash::FxHashMap;
use std::any::TypeId;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[inline]
fn fnv_mix(hash: u64, byte: u8) -> u64 {
    (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
}

bitflags::bitflags! {
    /// Bit 0 = nullable, bit 1 = track-ref, bit 2 = has-generic-params
    /// (the field is a list/map/set carrying an element descriptor).
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct FieldFlags: u8 {
        const NULLABLE = 0b001;
        const TRACK_REF = 0b010;
        const HAS_GENERIC_PARAMS = 0b100;
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: MetaString,
    pub wire_kind: WireKind,
    pub flags: FieldFlags,
}

impl FieldDescriptor {
    pub fn nullable(&self) -> bool {
        self.flags.contains(FieldFlags::NULLABLE)
    }

    pub fn track_ref(&self) -> bool {
        self.flags.contains(FieldFlags::TRACK_REF)
    }

    pub fn has_generic_params(&self) -> bool {
        self.flags.contains(FieldFlags::HAS_GENERIC_PARAMS)
    }
}

/// `{namespace, type_name, hash, fields}` (§4.5). `hash` is mixed solely
/// from the fields, in declared order, from their *encoded* MetaString
/// bytes — never the decoded text — so the hash is stable regardless of
/// which sub-encoding a given field name happened to pick.
#[derive(Debug, Clone)]
pub struct TypeMeta {
    pub namespace: MetaString,
    pub type_name: MetaString,
    pub hash: u64,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeMeta {
    pub fn new(namespace: MetaString, type_name: MetaString, fields: Vec<FieldDescriptor>) -> Self {
        let hash = Self::compute_hash(&fields);
        TypeMeta { namespace, type_name, hash, fields }
    }

    fn compute_hash(fields: &[FieldDescriptor]) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        for field in fields {
            for &byte in field.name.encoded_bytes() {
                hash = fnv_mix(hash, byte);
            }
            hash = fnv_mix(hash, field.wire_kind as u8);
            hash = fnv_mix(hash, field.flags.bits());
        }
        hash
    }

    /// Looks up a field by decoded name, used by the reader when
    /// reconciling its local struct definition against this meta.
    pub fn field(&self, name: &str, special: crate::meta_string::SpecialChars) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name.decode(special).map(|n| n == name).unwrap_or(false))
    }

    fn write_full(&self, buf: &mut Buffer, table: &mut MetaStringWriteTable) {
        table.write(buf, &self.namespace);
        table.write(buf, &self.type_name);
        buf.write_fixed_u64(self.hash);
        buf.write_var_uint32(self.fields.len() as u32);
        for field in &self.fields {
            table.write(buf, &field.name);
            buf.write_fixed_u8(field.wire_kind as u8);
            buf.write_fixed_u8(field.flags.bits());
        }
    }

    fn read_full(buf: &mut Buffer, table: &mut MetaStringReadTable) -> Result<Self> {
        let namespace = table.read(buf)?;
        let type_name = table.read(buf)?;
        let hash = buf.read_fixed_u64()?;
        let field_count = buf.read_var_uint32()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let name = table.read(buf)?;
            let wire_kind_tag = buf.read_fixed_u8()?;
            let wire_kind = WireKind::from_repr(wire_kind_tag)
                .ok_or_else(|| Error::InvalidData(format!("unknown wire kind tag {wire_kind_tag} in type meta")))?;
            let flags = FieldFlags::from_bits_truncate(buf.read_fixed_u8()?);
            fields.push(FieldDescriptor { name, wire_kind, flags });
        }
        Ok(TypeMeta { namespace, type_name, hash, fields })
    }
}

/// Per-envelope write-side TypeMeta cache (§3.2: "Type meta is written at
/// most once per (envelope, type) pair"), keyed by the writer's own
/// language type handle rather than by content hash, since two distinct
/// types could in principle collide on a 64-bit hash.
#[derive(Default)]
pub struct TypeMetaWriteCache {
    seen: FxHashMap<TypeId, u32>,
    next_index: u32,
}

impl TypeMetaWriteCache {
    pub fn new() -> Self {
        TypeMetaWriteCache::default()
    }

    /// `strings` is the context's shared MetaString table: type meta field
    /// names and the type-info namespace/name prefix (§4.7) draw from the
    /// same envelope-scoped cache.
    pub fn write(&mut self, buf: &mut Buffer, strings: &mut MetaStringWriteTable, type_handle: TypeId, meta: &TypeMeta) {
        if let Some(&idx) = self.seen.get(&type_handle) {
            buf.write_var_uint32((idx << 1) | 1);
            return;
        }
        let idx = self.next_index;
        self.next_index += 1;
        self.seen.insert(type_handle, idx);
        buf.write_var_uint32(idx << 1);
        meta.write_full(buf, strings);
    }
}

/// Read-side mirror of [`TypeMetaWriteCache`].
#[derive(Default)]
pub struct TypeMetaReadCache {
    table: Vec<TypeMeta>,
}

impl TypeMetaReadCache {
    pub fn new() -> Self {
        TypeMetaReadCache::default()
    }

    pub fn read(&mut self, buf: &mut Buffer, strings: &mut MetaStringReadTable) -> Result<&TypeMeta> {
        let tag = buf.read_var_uint32()?;
        let back_ref = tag & 1 != 0;
        let idx = tag >> 1;
        if back_ref {
            self.table
                .get(idx as usize)
                .ok_or_else(|| Error::RefError(format!("type meta back-reference {idx} out of range")))
        } else {
            let meta = TypeMeta::read_full(buf, strings)?;
            self.table.push(meta);
            Ok(self.table.last().unwrap())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta_string::SpecialChars;

    fn field(name: &str, wire_kind: WireKind, flags: FieldFlags) -> FieldDescriptor {
        FieldDescriptor { name: MetaString::encode(name, SpecialChars::default()).unwrap(), wire_kind, flags }
    }

    #[test]
    fn hash_depends_only_on_encoded_field_bytes_order_and_flags() {
        let fields_a = vec![field("f1", WireKind::String, FieldFlags::NULLABLE)];
        let fields_b = vec![field("f1", WireKind::String, FieldFlags::NULLABLE)];
        assert_eq!(TypeMeta::compute_hash(&fields_a), TypeMeta::compute_hash(&fields_b));

        let fields_c = vec![field("f1", WireKind::String, FieldFlags::empty())];
        assert_ne!(TypeMeta::compute_hash(&fields_a), TypeMeta::compute_hash(&fields_c));
    }

    #[test]
    fn write_cache_emits_back_reference_for_repeated_type() {
        struct Node;
        let meta = TypeMeta::new(
            MetaString::encode("demo", SpecialChars::NAMESPACE).unwrap(),
            MetaString::encode("Node", SpecialChars::NAMESPACE).unwrap(),
            vec![field("next", WireKind::Struct, FieldFlags::NULLABLE | FieldFlags::TRACK_REF)],
        );
        let mut cache = TypeMetaWriteCache::new();
        let mut write_strings = MetaStringWriteTable::new();
        let mut buf = Buffer::new();
        cache.write(&mut buf, &mut write_strings, TypeId::of::<Node>(), &meta);
        cache.write(&mut buf, &mut write_strings, TypeId::of::<Node>(), &meta);

        let mut read_cache = TypeMetaReadCache::new();
        let mut read_strings = MetaStringReadTable::new();
        let first = read_cache.read(&mut buf, &mut read_strings).unwrap();
        assert_eq!(first.hash, meta.hash);
        let second = read_cache.read(&mut buf, &mut read_strings).unwrap();
        assert_eq!(second.hash, meta.hash);
    }

    #[test]
    fn schema_evolution_reader_finds_subset_of_writer_fields() {
        let writer_meta = TypeMeta::new(
            MetaString::encode("demo", SpecialChars::NAMESPACE).unwrap(),
            MetaString::encode("T200", SpecialChars::NAMESPACE).unwrap(),
            vec![field("f1", WireKind::String, FieldFlags::empty())],
        );
        assert!(writer_meta.field("f1", SpecialChars::default()).is_some());
        assert!(writer_meta.field("f2", SpecialChars::default()).is_none());
    }
}
