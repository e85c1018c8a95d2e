//! Compact encoding for short Latin-alphabet identifiers: namespaces, type
//! names, and field names. See spec §4.3 for the selection rule this module
//! implements exactly.

mod tables;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use fxhash::FxHashMap;
use weave_derive::FromRepr;

/// Which of the five sub-encodings a [`MetaString`] was packed with.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
#[repr(u8)]
pub enum Encoding {
    Utf8 = 0,
    LowerSpecial = 1,
    LowerUpperDigitSpecial = 2,
    FirstToLowerSpecial = 3,
    AllToLowerSpecial = 4,
}

const MAX_DECODED_LEN: usize = 32_767;

/// The two characters that fill slots 62 and 63 of the 6-bit
/// `LowerUpperDigitSpecial` table for a given identifier context. Both
/// members of every pair this crate uses also live in the fixed 5-bit
/// `LowerSpecial` table (`. _ $ |`), which is what lets
/// `FirstToLowerSpecial` and `AllToLowerSpecial` — whose eligibility check
/// is LUDS-shaped but whose packing is 5-bit — round-trip.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SpecialChars {
    pub special1: char,
    pub special2: char,
}

impl SpecialChars {
    pub const fn new(special1: char, special2: char) -> Self {
        SpecialChars { special1, special2 }
    }
}

impl Default for SpecialChars {
    /// Used for field names.
    fn default() -> Self {
        SpecialChars::new('_', '$')
    }
}

impl SpecialChars {
    /// Used for namespaces and type names, where `.` separates path
    /// segments.
    pub const NAMESPACE: SpecialChars = SpecialChars::new('.', '_');
}

/// An identifier plus the sub-encoding it was packed with.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MetaString {
    encoding: Encoding,
    bytes: Vec<u8>,
}

impl MetaString {
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The raw encoded bytes — NOT the decoded text. [`TypeMeta`](crate::type_meta::TypeMeta)'s
    /// content hash is mixed from these bytes so that the choice of
    /// sub-encoding never changes the hash two peers compute for the same
    /// logical name.
    pub fn encoded_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encode(s: &str, special: SpecialChars) -> Result<MetaString> {
        if s.chars().count() >= MAX_DECODED_LEN {
            return Err(Error::EncodingError(format!(
                "meta-string length {} exceeds the {} character limit",
                s.chars().count(),
                MAX_DECODED_LEN
            )));
        }

        let is_latin1 = s.chars().all(|c| (c as u32) <= 0xFF);
        if !is_latin1 {
            return Ok(MetaString { encoding: Encoding::Utf8, bytes: s.as_bytes().to_vec() });
        }

        let eligible_lower_special = s.chars().all(|c| tables::lower_special_code(c).is_some());
        let eligible_luds = s.chars().all(|c| {
            c.is_ascii_alphanumeric() || c == special.special1 || c == special.special2
        });
        let digit_count = s.chars().filter(|c| c.is_ascii_digit()).count();
        let upper_count = s.chars().filter(|c| c.is_ascii_uppercase()).count();
        let len = s.chars().count();

        if eligible_lower_special {
            let codes: Vec<u8> = s.chars().map(|c| tables::lower_special_code(c).unwrap()).collect();
            return Ok(MetaString {
                encoding: Encoding::LowerSpecial,
                bytes: tables::pack_bits(&codes, tables::LOWER_SPECIAL_BITS),
            });
        }

        if eligible_luds && digit_count > 0 {
            return Ok(encode_luds(s, special));
        }

        let first_is_upper = s.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false);
        if eligible_luds && upper_count == 1 && first_is_upper {
            return encode_first_to_lower(s, special);
        }

        if eligible_luds && (len + upper_count) * 5 < len * 6 {
            return encode_all_to_lower(s, special);
        }

        if eligible_luds {
            return Ok(encode_luds(s, special));
        }

        Ok(MetaString { encoding: Encoding::Utf8, bytes: s.as_bytes().to_vec() })
    }

    pub fn decode(&self, special: SpecialChars) -> Result<String> {
        match self.encoding {
            Encoding::Utf8 => String::from_utf8(self.bytes.clone())
                .map_err(|e| Error::EncodingError(format!("invalid utf-8 meta-string: {e}"))),
            Encoding::LowerSpecial => decode_lower_special(&self.bytes),
            Encoding::LowerUpperDigitSpecial => decode_luds(&self.bytes, special),
            Encoding::FirstToLowerSpecial => decode_first_to_lower(&self.bytes),
            Encoding::AllToLowerSpecial => decode_all_to_lower(&self.bytes),
        }
    }
}

fn encode_luds(s: &str, special: SpecialChars) -> MetaString {
    let codes: Vec<u8> =
        s.chars().map(|c| tables::luds_code(c, special.special1, special.special2).unwrap()).collect();
    MetaString { encoding: Encoding::LowerUpperDigitSpecial, bytes: tables::pack_bits(&codes, tables::LUDS_BITS) }
}

fn decode_luds(bytes: &[u8], special: SpecialChars) -> Result<String> {
    let codes = tables::unpack_bits(bytes, tables::LUDS_BITS)?;
    codes
        .into_iter()
        .map(|c| {
            tables::luds_char(c, special.special1, special.special2)
                .ok_or_else(|| Error::EncodingError(format!("invalid LUDS code {c}")))
        })
        .collect()
}

fn encode_first_to_lower(s: &str, special: SpecialChars) -> Result<MetaString> {
    let mut chars: Vec<char> = s.chars().collect();
    chars[0] = chars[0].to_ascii_lowercase();
    let codes: Vec<u8> = chars
        .iter()
        .map(|&c| {
            tables::lower_special_code(c).ok_or_else(|| {
                Error::EncodingError(format!(
                    "FirstToLowerSpecial requires every character to be in the 5-bit alphabet after lower-casing the first letter, found '{c}' (special chars must be a subset of `. _ $ |`)"
                ))
            })
        })
        .collect::<Result<_>>()?;
    Ok(MetaString {
        encoding: Encoding::FirstToLowerSpecial,
        bytes: tables::pack_bits(&codes, tables::LOWER_SPECIAL_BITS),
    })
}

fn decode_first_to_lower(bytes: &[u8]) -> Result<String> {
    let mut s = decode_lower_special(bytes)?;
    if let Some(first) = s.chars().next() {
        let upper: String = first.to_uppercase().collect();
        s.replace_range(0..first.len_utf8(), &upper);
    }
    Ok(s)
}

fn encode_all_to_lower(s: &str, _special: SpecialChars) -> Result<MetaString> {
    let mut codes = Vec::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            codes.push(tables::lower_special_code('|').unwrap());
            codes.push(tables::lower_special_code(c.to_ascii_lowercase()).unwrap());
        } else {
            let code = tables::lower_special_code(c).ok_or_else(|| {
                Error::EncodingError(format!(
                    "AllToLowerSpecial requires every non-uppercase character to be in the 5-bit alphabet, found '{c}'"
                ))
            })?;
            codes.push(code);
        }
    }
    Ok(MetaString {
        encoding: Encoding::AllToLowerSpecial,
        bytes: tables::pack_bits(&codes, tables::LOWER_SPECIAL_BITS),
    })
}

fn decode_all_to_lower(bytes: &[u8]) -> Result<String> {
    let codes = tables::unpack_bits(bytes, tables::LOWER_SPECIAL_BITS)?;
    let mut out = String::with_capacity(codes.len());
    let mut iter = codes.into_iter();
    while let Some(code) = iter.next() {
        let c = tables::lower_special_char(code)
            .ok_or_else(|| Error::EncodingError(format!("invalid LowerSpecial code {code}")))?;
        if c == '|' {
            let next = iter
                .next()
                .ok_or_else(|| Error::EncodingError("AllToLowerSpecial: '|' marker at end of blob".into()))?;
            let next_char = tables::lower_special_char(next)
                .ok_or_else(|| Error::EncodingError(format!("invalid LowerSpecial code {next}")))?;
            out.extend(next_char.to_uppercase());
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn decode_lower_special(bytes: &[u8]) -> Result<String> {
    let codes = tables::unpack_bits(bytes, tables::LOWER_SPECIAL_BITS)?;
    codes
        .into_iter()
        .map(|c| {
            tables::lower_special_char(c).ok_or_else(|| Error::EncodingError(format!("invalid LowerSpecial code {c}")))
        })
        .collect()
}

/// Below this field-count, the entry header fits the encoded length inline
/// (§6.2 open question, resolved per SPEC_FULL.md §4.3: `encoding_tag |
/// (byte_length << 3)`, byte_length < 31). `0x1F` (31) in that field is the
/// escape value signalling that `var_uint32(byte_length)` follows instead.
const INLINE_LENGTH_LIMIT: usize = 31;

fn write_entry_header_and_bytes(buf: &mut Buffer, ms: &MetaString) {
    let tag = ms.encoding as u8;
    let len = ms.bytes.len();
    if len < INLINE_LENGTH_LIMIT {
        buf.write_fixed_u8(tag | ((len as u8) << 3));
    } else {
        buf.write_fixed_u8(tag | ((INLINE_LENGTH_LIMIT as u8) << 3));
        buf.write_var_uint32(len as u32);
    }
    buf.write_bytes(&ms.bytes);
}

fn read_entry_header_and_bytes(buf: &mut Buffer) -> Result<MetaString> {
    let header = buf.read_fixed_u8()?;
    let tag = header & 0x07;
    let len_field = (header >> 3) as usize;
    let len = if len_field == INLINE_LENGTH_LIMIT { buf.read_var_uint32()? as usize } else { len_field };
    let bytes = buf.read_bytes(len)?.to_vec();
    let encoding = Encoding::from_repr(tag)
        .ok_or_else(|| Error::InvalidData(format!("unsupported meta-string encoding tag {tag}")))?;
    Ok(MetaString { encoding, bytes })
}

/// Envelope-scoped write-side cache of MetaString table entries (§6.2):
/// the first occurrence of a given (encoding, bytes) pair writes the full
/// entry, later occurrences write a back-reference index.
#[derive(Default)]
pub struct MetaStringWriteTable {
    seen: FxHashMap<(Encoding, Vec<u8>), u32>,
    next_index: u32,
}

impl MetaStringWriteTable {
    pub fn new() -> Self {
        MetaStringWriteTable::default()
    }

    pub fn write(&mut self, buf: &mut Buffer, ms: &MetaString) {
        let key = (ms.encoding, ms.bytes.clone());
        if let Some(&idx) = self.seen.get(&key) {
            buf.write_var_uint32((idx << 1) | 1);
            return;
        }
        let idx = self.next_index;
        self.next_index += 1;
        self.seen.insert(key, idx);
        buf.write_var_uint32(idx << 1);
        write_entry_header_and_bytes(buf, ms);
    }
}

/// Read-side mirror of [`MetaStringWriteTable`].
#[derive(Default)]
pub struct MetaStringReadTable {
    table: Vec<MetaString>,
}

impl MetaStringReadTable {
    pub fn new() -> Self {
        MetaStringReadTable::default()
    }

    pub fn read(&mut self, buf: &mut Buffer) -> Result<MetaString> {
        let tag = buf.read_var_uint32()?;
        let back_ref = tag & 1 != 0;
        let idx = tag >> 1;
        if back_ref {
            self.table
                .get(idx as usize)
                .cloned()
                .ok_or_else(|| Error::RefError(format!("meta-string back-reference {idx} out of range")))
        } else {
            let ms = read_entry_header_and_bytes(buf)?;
            self.table.push(ms.clone());
            Ok(ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(s: &str, special: SpecialChars) {
        let encoded = MetaString::encode(s, special).unwrap();
        let decoded = encoded.decode(special).unwrap();
        assert_eq!(decoded, s, "round trip failed for {s:?} ({:?})", encoded.encoding());
    }

    #[test]
    fn lower_special_round_trip() {
        let ms = MetaString::encode("hello.world_x$y|z", SpecialChars::default()).unwrap();
        assert_eq!(ms.encoding(), Encoding::LowerSpecial);
        round_trip("hello.world_x$y|z", SpecialChars::default());
    }

    #[test]
    fn luds_round_trip_with_digits() {
        let ms = MetaString::encode("field_1", SpecialChars::default()).unwrap();
        assert_eq!(ms.encoding(), Encoding::LowerUpperDigitSpecial);
        round_trip("field_1", SpecialChars::default());
    }

    #[test]
    fn first_to_lower_round_trip() {
        let ms = MetaString::encode("Namespace", SpecialChars::NAMESPACE).unwrap();
        assert_eq!(ms.encoding(), Encoding::FirstToLowerSpecial);
        round_trip("Namespace", SpecialChars::NAMESPACE);
    }

    #[test]
    fn all_to_lower_round_trip() {
        round_trip("fooBar", SpecialChars::default());
        let ms = MetaString::encode("fooBar", SpecialChars::default()).unwrap();
        assert_eq!(ms.encoding(), Encoding::AllToLowerSpecial);
    }

    #[test]
    fn non_latin1_forces_utf8() {
        let ms = MetaString::encode("caf\u{e9}\u{1F600}", SpecialChars::default()).unwrap();
        assert_eq!(ms.encoding(), Encoding::Utf8);
        round_trip("caf\u{e9}\u{1F600}", SpecialChars::default());
    }

    #[test]
    fn hash_is_stable_across_equal_decoded_strings_with_same_encoding() {
        let a = MetaString::encode("namespace", SpecialChars::default()).unwrap();
        let b = MetaString::encode("namespace", SpecialChars::default()).unwrap();
        assert_eq!(a.encoded_bytes(), b.encoded_bytes());
    }

    #[test]
    fn write_table_back_references_repeated_entries() {
        let a = MetaString::encode("demo.Node", SpecialChars::NAMESPACE).unwrap();
        let b = MetaString::encode("demo.Edge", SpecialChars::NAMESPACE).unwrap();
        let mut writer = MetaStringWriteTable::new();
        let mut buf = Buffer::new();
        writer.write(&mut buf, &a);
        writer.write(&mut buf, &b);
        writer.write(&mut buf, &a);

        let mut reader = MetaStringReadTable::new();
        let r1 = reader.read(&mut buf).unwrap();
        let r2 = reader.read(&mut buf).unwrap();
        let r3 = reader.read(&mut buf).unwrap();
        assert_eq!(r1.decode(SpecialChars::NAMESPACE).unwrap(), "demo.Node");
        assert_eq!(r2.decode(SpecialChars::NAMESPACE).unwrap(), "demo.Edge");
        assert_eq!(r3.decode(SpecialChars::NAMESPACE).unwrap(), "demo.Node");
    }
}
