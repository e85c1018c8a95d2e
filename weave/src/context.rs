//! Per-call state: the buffer plus every envelope-scoped table a component
//! needs (§3.3 "a context owns its reference tables and meta-string tables
//! for the duration of one top-level call").

use crate::buffer::Buffer;
use crate::config::Config;
use crate::meta_string::{MetaStringReadTable, MetaStringWriteTable};
use crate::refs::{ReadRefTracker, WriteRefTracker};
use crate::type_meta::{TypeMetaReadCache, TypeMetaWriteCache};
use std::any::Any;
use std::sync::Arc;

/// Identity key used by the write-side reference tracker: the address a
/// caller's smart pointer or arena handle reduces to. Opaque on purpose —
/// the core never dereferences it.
pub type IdentityKey = u64;

/// Owns everything a `serialize` call touches: the output buffer, the
/// ref-id table, and the meta-string/type-meta caches. Dropped at the end
/// of the call; never reused across envelopes.
pub struct WriteContext<'c> {
    config: &'c Config,
    buf: Buffer,
    refs: WriteRefTracker<IdentityKey>,
    strings: MetaStringWriteTable,
    type_meta: TypeMetaWriteCache,
}

impl<'c> WriteContext<'c> {
    pub fn new(config: &'c Config) -> Self {
        WriteContext {
            config,
            buf: Buffer::new(),
            refs: WriteRefTracker::new(),
            strings: MetaStringWriteTable::new(),
            type_meta: TypeMetaWriteCache::new(),
        }
    }

    pub fn config(&self) -> &'c Config {
        self.config
    }

    pub fn buffer(&mut self) -> &mut Buffer {
        &mut self.buf
    }

    pub fn refs(&mut self) -> &mut WriteRefTracker<IdentityKey> {
        &mut self.refs
    }

    pub fn strings(&mut self) -> &mut MetaStringWriteTable {
        &mut self.strings
    }

    pub fn type_meta(&mut self) -> (&mut TypeMetaWriteCache, &mut MetaStringWriteTable) {
        (&mut self.type_meta, &mut self.strings)
    }

    /// Every field at once, split so a caller can mix and match without the
    /// borrow checker objecting to two accessor calls in the same
    /// expression — needed by the struct type-info path, which writes to
    /// the buffer and the meta-string table in the same statement.
    pub fn parts(&mut self) -> WriteParts<'_> {
        WriteParts { buf: &mut self.buf, refs: &mut self.refs, strings: &mut self.strings, type_meta: &mut self.type_meta }
    }

    /// Consumes the context, returning the bytes written.
    pub fn finish(self) -> Vec<u8> {
        self.buf.into_vec()
    }
}

pub struct WriteParts<'a> {
    pub buf: &'a mut Buffer,
    pub refs: &'a mut WriteRefTracker<IdentityKey>,
    pub strings: &'a mut MetaStringWriteTable,
    pub type_meta: &'a mut TypeMetaWriteCache,
}

/// Read-side counterpart of [`WriteContext`]. Bound values live behind
/// `Arc<dyn Any>` so the ref tracker can hand back a previously-decoded
/// value of any concrete type without the core knowing it ahead of time.
pub struct ReadContext<'c> {
    config: &'c Config,
    buf: Buffer,
    refs: ReadRefTracker<Arc<dyn Any>>,
    strings: MetaStringReadTable,
    type_meta: TypeMetaReadCache,
}

impl<'c> ReadContext<'c> {
    pub fn from_owned(config: &'c Config, data: Vec<u8>) -> Self {
        ReadContext {
            config,
            buf: Buffer::from_owned(data),
            refs: ReadRefTracker::new(),
            strings: MetaStringReadTable::new(),
            type_meta: TypeMetaReadCache::new(),
        }
    }

    pub fn from_shared(config: &'c Config, data: Arc<[u8]>) -> Self {
        ReadContext {
            config,
            buf: Buffer::from_shared(data),
            refs: ReadRefTracker::new(),
            strings: MetaStringReadTable::new(),
            type_meta: TypeMetaReadCache::new(),
        }
    }

    pub fn config(&self) -> &'c Config {
        self.config
    }

    pub fn buffer(&mut self) -> &mut Buffer {
        &mut self.buf
    }

    pub fn refs(&mut self) -> &mut ReadRefTracker<Arc<dyn Any>> {
        &mut self.refs
    }

    pub fn strings(&mut self) -> &mut MetaStringReadTable {
        &mut self.strings
    }

    pub fn type_meta(&mut self) -> (&mut TypeMetaReadCache, &mut MetaStringReadTable) {
        (&mut self.type_meta, &mut self.strings)
    }

    /// Read-side counterpart of [`WriteContext::parts`].
    pub fn parts(&mut self) -> ReadParts<'_> {
        ReadParts { buf: &mut self.buf, refs: &mut self.refs, strings: &mut self.strings, type_meta: &mut self.type_meta }
    }
}

pub struct ReadParts<'a> {
    pub buf: &'a mut Buffer,
    pub refs: &'a mut ReadRefTracker<Arc<dyn Any>>,
    pub strings: &'a mut MetaStringReadTable,
    pub type_meta: &'a mut TypeMetaReadCache,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_context_roundtrips_buffer_bytes() {
        let config = Config::builder().build();
        let mut ctx = WriteContext::new(&config);
        ctx.buffer().write_fixed_u32(7);
        assert_eq!(ctx.finish(), 7u32.to_le_bytes());
    }

    #[test]
    fn read_context_wraps_shared_bytes_without_copy() {
        let config = Config::builder().build();
        let data: Arc<[u8]> = Arc::from(vec![1, 2, 3, 4]);
        let mut ctx = ReadContext::from_shared(&config, data);
        assert_eq!(ctx.buffer().read_fixed_u32().unwrap(), u32::from_le_bytes([1, 2, 3, 4]));
    }
}
