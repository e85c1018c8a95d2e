//! Byte buffer with a write cursor, a read cursor, and in-place codecs for
//! every fixed-width, variable-length, and tagged integer encoding the wire
//! format uses. See [`varint`] for the variable-length codecs and
//! [`stream`] for the incremental read adapter.

mod stream;
mod varint;

pub use stream::StreamSource;

use crate::error::{Error, Result};
use owning_ref::ArcRef;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Doubling a capacity and rounding up to the machine word size keeps every
/// grow a whole number of words, which is what lets the varint fast paths
/// below do unaligned-safe word-sized reads near the end of the buffer.
const WORD_SIZE: usize = std::mem::size_of::<usize>();

#[inline]
const fn round_up_to_word(n: usize) -> usize {
    (n + (WORD_SIZE - 1)) & !(WORD_SIZE - 1)
}

enum Storage {
    Owned(Vec<u8>),
    /// A caller-provided, possibly-shared byte region. Used to decode
    /// without copying input the caller already owns in an `Arc`. Writing
    /// to a buffer backed by this storage converts it to `Owned` first.
    Shared(ArcRef<[u8]>),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Shared(s) => s.as_ref(),
        }
    }

    fn to_owned_mut(&mut self) -> &mut Vec<u8> {
        if let Storage::Shared(s) = self {
            *self = Storage::Owned(s.as_ref().to_vec());
        }
        match self {
            Storage::Owned(v) => v,
            Storage::Shared(_) => unreachable!(),
        }
    }
}

/// A growable byte region with independent read and write cursors.
///
/// Every safe read consults `reader_index` and either succeeds, pulls more
/// bytes from an attached [`StreamSource`], or fails with
/// [`Error::BufferOutOfBound`] — the cursor is left untouched on failure.
/// Writes always succeed: `grow` is called unconditionally before a write
/// that would not fit.
pub struct Buffer {
    data: Storage,
    writer_index: usize,
    reader_index: usize,
    stream: Option<Box<dyn StreamSource>>,
}

/// How many leading bytes [`Buffer`]'s `Debug` impl hex-dumps before
/// eliding the rest — a full dump of a multi-megabyte payload is never
/// what a test failure or a log line wants to see.
const DEBUG_PREVIEW_LEN: usize = 32;

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let slice = self.as_slice();
        let preview_len = slice.len().min(DEBUG_PREVIEW_LEN);
        let mut preview = String::with_capacity(preview_len * 2);
        for byte in &slice[..preview_len] {
            preview.push_str(&format!("{byte:02x}"));
        }
        if slice.len() > preview_len {
            preview.push_str("..");
        }

        let mut dbg = f.debug_struct("Buffer");
        dbg.field("size", &self.size());
        dbg.field("writer_index", &self.writer_index);
        dbg.field("reader_index", &self.reader_index);
        dbg.field("streaming", &self.stream.is_some());
        dbg.field("bytes", &preview);
        dbg.finish()
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Buffer { data: Storage::Owned(Vec::new()), writer_index: 0, reader_index: 0, stream: None }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            data: Storage::Owned(Vec::with_capacity(capacity)),
            writer_index: 0,
            reader_index: 0,
            stream: None,
        }
    }

    /// Takes ownership of an existing byte vector as the buffer's backing
    /// store; the writer cursor starts at the vector's current length.
    pub fn from_owned(data: Vec<u8>) -> Self {
        let len = data.len();
        Buffer { data: Storage::Owned(data), writer_index: len, reader_index: 0, stream: None }
    }

    /// Wraps a shared, caller-owned byte region for reading without a copy.
    pub fn from_shared(data: Arc<[u8]>) -> Self {
        let len = data.len();
        let data = Storage::Shared(ArcRef::new(data));
        Buffer { data, writer_index: len, reader_index: 0, stream: None }
    }

    pub(crate) fn with_stream(stream: Box<dyn StreamSource>) -> Self {
        Buffer { data: Storage::Owned(Vec::new()), writer_index: 0, reader_index: 0, stream: Some(stream) }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.writer_index
    }

    #[inline]
    pub fn writer_index(&self) -> usize {
        self.writer_index
    }

    #[inline]
    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    #[inline]
    pub fn set_reader_index(&mut self, index: usize) {
        self.reader_index = index;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        match &self.data {
            Storage::Owned(v) => v.capacity(),
            Storage::Shared(s) => s.as_ref().len(),
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data.as_slice()[..self.writer_index]
    }

    /// Consumes the buffer, returning its written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        match self.data {
            Storage::Owned(mut v) => {
                v.truncate(self.writer_index);
                v
            }
            Storage::Shared(s) => s.as_ref()[..self.writer_index].to_vec(),
        }
    }

    /// Ensures at least `additional` bytes are writable past `writer_index`
    /// without reallocating again on the very next write.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.writer_index + additional;
        if needed > self.data.as_slice().len() {
            self.grow(needed);
        }
    }

    /// Ensures the backing store's length is at least `min_capacity`,
    /// doubling the current capacity (rounded up to the machine word size)
    /// when that isn't already enough.
    pub fn grow(&mut self, min_capacity: usize) {
        let vec = self.data.to_owned_mut();
        if vec.len() >= min_capacity {
            return;
        }
        let doubled = round_up_to_word(vec.capacity().max(1) * 2);
        let target = round_up_to_word(min_capacity).max(doubled);
        vec.resize(target, 0);
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.writer_index.saturating_sub(self.reader_index)
    }

    fn ensure_readable(&mut self, len: usize) -> Result<()> {
        self.fill_buffer(len)
    }

    fn fill_from(&mut self, stream: &mut dyn StreamSource, min_fill: usize) -> Result<()> {
        let vec = self.data.to_owned_mut();
        let mut filled = 0;
        while filled < min_fill {
            let need = self.writer_index + (min_fill - filled);
            if need > vec.len() {
                let target = need.max(vec.len().max(1) * 2);
                vec.resize(round_up_to_word(target), 0);
            }
            let n = stream.read_into(&mut vec[self.writer_index..], vec.len() - self.writer_index)?;
            if n == 0 {
                break;
            }
            self.writer_index += n;
            filled += n;
        }
        if filled < min_fill {
            #[cfg(feature = "tracing")]
            tracing::warn!(min_fill, filled, "stream source exhausted before min_fill bytes were available");
            let kind = std::io::ErrorKind::UnexpectedEof;
            return Err(Error::from(std::io::Error::new(
                kind,
                "stream source exhausted before min_fill bytes were available",
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure_readable(n)?;
        self.reader_index += n;
        Ok(())
    }

    pub fn copy(&self, start: usize, n: usize, dst: &mut [u8]) -> Result<()> {
        let slice = self.data.as_slice();
        if start + n > self.writer_index || dst.len() < n {
            return Err(Error::bounds(start, n, self.writer_index));
        }
        dst[..n].copy_from_slice(&slice[start..start + n]);
        Ok(())
    }

    pub fn equals(&self, other: &Buffer) -> bool {
        self.as_slice() == other.as_slice()
    }

    pub fn hex(&self) -> String {
        self.as_slice().iter().map(|b| format!("{b:02x}")).collect()
    }

    // -- raw byte I/O -----------------------------------------------------

    pub fn write_bytes(&mut self, src: &[u8]) {
        self.reserve(src.len());
        let vec = self.data.to_owned_mut();
        vec[self.writer_index..self.writer_index + src.len()].copy_from_slice(src);
        self.writer_index += src.len();
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.ensure_readable(n)?;
        let start = self.reader_index;
        self.reader_index += n;
        Ok(&self.data.as_slice()[start..start + n])
    }

    /// Skips [`Buffer::reserve`] and the writer-index bounds arithmetic
    /// `write_bytes` performs. Safety: the caller must have already
    /// reserved at least `src.len()` bytes past `writer_index` (e.g. via a
    /// prior [`Buffer::reserve`] call covering the whole batch of unchecked
    /// writes), or this indexes past the backing allocation.
    #[inline]
    pub unsafe fn write_bytes_unchecked(&mut self, src: &[u8]) {
        let len = src.len();
        let vec = self.data.to_owned_mut();
        vec.get_unchecked_mut(self.writer_index..self.writer_index + len).copy_from_slice(src);
        self.writer_index += len;
    }

    /// Skips the `reader_index + n <= size` check `read_bytes` performs.
    /// Safety: the caller must have already established that at least `n`
    /// bytes are available at the current reader index (e.g. because
    /// `remaining()` was checked immediately beforehand), or this reads
    /// past the valid region.
    #[inline]
    pub unsafe fn read_bytes_unchecked(&mut self, n: usize) -> &[u8] {
        let start = self.reader_index;
        self.reader_index += n;
        self.data.as_slice().get_unchecked(start..start + n)
    }

    // -- fixed width --------------------------------------------------

    pub fn write_fixed_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }
    pub fn write_fixed_i8(&mut self, value: i8) {
        self.write_fixed_u8(value as u8);
    }
    pub fn read_fixed_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }
    pub fn read_fixed_i8(&mut self) -> Result<i8> {
        Ok(self.read_fixed_u8()? as i8)
    }

    /// See [`Buffer::write_bytes_unchecked`]'s safety contract.
    #[inline]
    pub unsafe fn write_fixed_u8_unchecked(&mut self, value: u8) {
        self.write_bytes_unchecked(&[value]);
    }
    /// See [`Buffer::read_bytes_unchecked`]'s safety contract.
    #[inline]
    pub unsafe fn read_fixed_u8_unchecked(&mut self) -> u8 {
        self.read_bytes_unchecked(1)[0]
    }
}

macro_rules! impl_fixed_width {
    ($($write:ident / $read:ident : $ty:ty),* $(,)?) => {
        impl Buffer {
            $(
                #[inline]
                pub fn $write(&mut self, value: $ty) {
                    self.write_bytes(&value.to_le_bytes());
                }

                #[inline]
                pub fn $read(&mut self) -> Result<$ty> {
                    let bytes = self.read_bytes(std::mem::size_of::<$ty>())?;
                    Ok(<$ty>::from_le_bytes(bytes.try_into().unwrap()))
                }
            )*
        }
    };
}

impl_fixed_width! {
    write_fixed_u16 / read_fixed_u16: u16,
    write_fixed_i16 / read_fixed_i16: i16,
    write_fixed_u32 / read_fixed_u32: u32,
    write_fixed_i32 / read_fixed_i32: i32,
    write_fixed_u64 / read_fixed_u64: u64,
    write_fixed_i64 / read_fixed_i64: i64,
    write_fixed_f32 / read_fixed_f32: f32,
    write_fixed_f64 / read_fixed_f64: f64,
}

/// Unchecked counterparts of [`impl_fixed_width`], for hot paths (the
/// varint codecs) that have already reserved/verified the bytes they're
/// about to read or write in one batch up front. Carries the same safety
/// contract as [`Buffer::write_bytes_unchecked`]/[`Buffer::read_bytes_unchecked`].
macro_rules! impl_fixed_width_unchecked {
    ($($write:ident / $read:ident : $ty:ty),* $(,)?) => {
        impl Buffer {
            $(
                #[inline]
                pub unsafe fn $write(&mut self, value: $ty) {
                    self.write_bytes_unchecked(&value.to_le_bytes());
                }

                #[inline]
                pub unsafe fn $read(&mut self) -> $ty {
                    let bytes = self.read_bytes_unchecked(std::mem::size_of::<$ty>());
                    <$ty>::from_le_bytes(bytes.try_into().unwrap())
                }
            )*
        }
    };
}

impl_fixed_width_unchecked! {
    write_fixed_u16_unchecked / read_fixed_u16_unchecked: u16,
    write_fixed_i16_unchecked / read_fixed_i16_unchecked: i16,
    write_fixed_u32_unchecked / read_fixed_u32_unchecked: u32,
    write_fixed_i32_unchecked / read_fixed_i32_unchecked: i32,
    write_fixed_u64_unchecked / read_fixed_u64_unchecked: u64,
    write_fixed_i64_unchecked / read_fixed_i64_unchecked: i64,
    write_fixed_f32_unchecked / read_fixed_f32_unchecked: f32,
    write_fixed_f64_unchecked / read_fixed_f64_unchecked: f64,
}

impl Buffer {
    /// Three-byte little-endian signed integer, sign-extended on read.
    pub fn write_int24(&mut self, value: i32) {
        let bytes = value.to_le_bytes();
        self.write_bytes(&bytes[..3]);
    }

    pub fn read_int24(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(3)?;
        let mut word = [bytes[0], bytes[1], bytes[2], 0];
        if bytes[2] & 0x80 != 0 {
            word[3] = 0xFF;
        }
        Ok(i32::from_le_bytes(word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_round_trip() {
        let mut buf = Buffer::new();
        buf.write_fixed_u32(0xDEADBEEF);
        buf.write_fixed_i64(-12345);
        buf.write_fixed_f64(3.5);
        assert_eq!(buf.read_fixed_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(buf.read_fixed_i64().unwrap(), -12345);
        assert_eq!(buf.read_fixed_f64().unwrap(), 3.5);
    }

    #[test]
    fn int24_round_trip_negative() {
        let mut buf = Buffer::new();
        buf.write_int24(-42);
        assert_eq!(buf.read_int24().unwrap(), -42);
    }

    #[test]
    fn read_past_end_is_bounds_error_and_cursor_unmoved() {
        let mut buf = Buffer::new();
        buf.write_fixed_u8(1);
        let before = buf.reader_index();
        let err = buf.read_bytes(5).unwrap_err();
        assert!(matches!(err, Error::BufferOutOfBound { .. }));
        assert_eq!(buf.reader_index(), before);
    }

    #[test]
    fn equals_compares_written_region_only() {
        let mut a = Buffer::new();
        let mut b = Buffer::with_capacity(128);
        a.write_fixed_u16(7);
        b.write_fixed_u16(7);
        assert!(a.equals(&b));
    }

    #[test]
    fn unchecked_fixed_width_round_trips_once_capacity_is_reserved() {
        let mut buf = Buffer::new();
        buf.reserve(1 + 4 + 8);
        unsafe {
            buf.write_fixed_u8_unchecked(0xAB);
            buf.write_fixed_u32_unchecked(0xDEADBEEF);
            buf.write_fixed_f64_unchecked(2.5);
        }
        unsafe {
            assert_eq!(buf.read_fixed_u8_unchecked(), 0xAB);
            assert_eq!(buf.read_fixed_u32_unchecked(), 0xDEADBEEF);
            assert_eq!(buf.read_fixed_f64_unchecked(), 2.5);
        }
    }

    #[test]
    fn debug_impl_hex_dumps_a_bounded_preview() {
        let mut buf = Buffer::new();
        for b in 0..40u8 {
            buf.write_fixed_u8(b);
        }
        let rendered = format!("{buf:?}");
        assert!(rendered.contains(".."), "expected truncation marker, got: {rendered}");
        assert!(!rendered.contains("1e1f2021"), "preview should stop at DEBUG_PREVIEW_LEN bytes");
    }
}
