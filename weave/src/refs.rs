//! Reference tracking: preserves object identity across a serialize/
//! deserialize round trip when the call site asks for it (§4.6).

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use fxhash::FxHashMap;

/// Which of the three ref-framing disciplines a call site uses. Chosen
/// from the call site's static declaration plus the value's runtime
/// nullability/trackability; never mixed within one value's prefix.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RefMode {
    /// No flag byte; the value is never null and never shared.
    None,
    /// Flag byte encodes only null vs not-null.
    NullOnly,
    /// Full four-flag byte, ids honored.
    Tracking,
}

/// Signed 8-bit ref-prefix tag (§4.6, §6.2). Discriminants are the wire
/// values, not array indices — never renumber.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RefFlag {
    Null = -3,
    Ref = -2,
    NotNullValue = -1,
    RefValue = 0,
}

impl RefFlag {
    pub fn from_byte(byte: i8) -> Result<Self> {
        match byte {
            -3 => Ok(RefFlag::Null),
            -2 => Ok(RefFlag::Ref),
            -1 => Ok(RefFlag::NotNullValue),
            0 => Ok(RefFlag::RefValue),
            other => Err(Error::InvalidData(format!("invalid ref flag byte {other}"))),
        }
    }

    pub fn write(self, buf: &mut Buffer) {
        buf.write_fixed_i8(self as i8);
    }

    pub fn read(buf: &mut Buffer) -> Result<Self> {
        RefFlag::from_byte(buf.read_fixed_i8()?)
    }
}

/// Write-side identity table. `K` is whatever the caller uses as an
/// identity key — a pointer address, an arena index, a UUID — the core
/// only requires `Eq + Hash`.
#[derive(Default)]
pub struct WriteRefTracker<K: Eq + std::hash::Hash> {
    ids: FxHashMap<K, u32>,
    next_id: u32,
}

/// The outcome of probing the tracker for a value about to be written.
pub enum WriteDecision {
    /// First time seeing this identity: emit `REF_VALUE` then the payload.
    FirstOccurrence,
    /// Seen before: emit `REF` then this id, no payload.
    BackReference(u32),
}

impl<K: Eq + std::hash::Hash> WriteRefTracker<K> {
    pub fn new() -> Self {
        WriteRefTracker { ids: FxHashMap::default(), next_id: 0 }
    }

    /// Looks up `key`, assigning a fresh id on first occurrence.
    pub fn visit(&mut self, key: K) -> WriteDecision {
        if let Some(&id) = self.ids.get(&key) {
            return WriteDecision::BackReference(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(key, id);
        WriteDecision::FirstOccurrence
    }
}

/// Read-side append-only table, indexed by ref-id. Ids are reserved ahead
/// of reading the payload so a value may legally reference itself.
#[derive(Default)]
pub struct ReadRefTracker<V> {
    slots: Vec<Option<V>>,
}

impl<V: Clone> ReadRefTracker<V> {
    pub fn new() -> Self {
        ReadRefTracker { slots: Vec::new() }
    }

    /// Reserves the next id before the payload is decoded, returning it so
    /// the caller can bind it once the value is complete.
    pub fn reserve(&mut self) -> u32 {
        let id = self.slots.len() as u32;
        self.slots.push(None);
        id
    }

    pub fn bind(&mut self, id: u32, value: V) {
        self.slots[id as usize] = Some(value);
    }

    pub fn resolve(&self, id: u32) -> Result<V> {
        self.slots
            .get(id as usize)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| Error::RefError(format!("ref id {id} out of range or not yet bound")))
    }
}
