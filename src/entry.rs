//! Timestamped leaf entries.
//!
//! An [`Entry`] is the unit payload of a leaf node: an immutable
//! (key, ts, prev_ts, value) quadruple. `prev_ts` back-links to the
//! timestamp the same key held before this insertion, or 0 if this is
//! the first insertion of the key.
//!
//! Key and value are held behind `Arc` so that copy-on-write node
//! rewrites share entry payloads instead of copying bytes.

use std::sync::Arc;

/// Fixed per-entry accounting for the two timestamps (`ts` + `prev_ts`),
/// part of the on-the-wire size of an entry.
pub const ENTRY_TS_SIZE: usize = 16;

/// An immutable key-value pair tagged with its insertion timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: Arc<[u8]>,
    ts: u64,
    prev_ts: u64,
    value: Arc<[u8]>,
}

impl Entry {
    /// Create an entry. `prev_ts` is the timestamp the key held before
    /// this insertion, or 0 for a first insertion.
    #[must_use]
    pub(crate) fn new(key: Arc<[u8]>, value: Arc<[u8]>, ts: u64, prev_ts: u64) -> Self {
        Self {
            key,
            ts,
            prev_ts,
            value,
        }
    }

    /// The entry's key bytes.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Shared handle to the key bytes.
    #[inline]
    #[must_use]
    pub fn key_arc(&self) -> Arc<[u8]> {
        Arc::clone(&self.key)
    }

    /// The entry's value bytes.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Shared handle to the value bytes.
    #[inline]
    #[must_use]
    pub fn value_arc(&self) -> Arc<[u8]> {
        Arc::clone(&self.value)
    }

    /// Timestamp of this insertion.
    #[inline]
    #[must_use]
    pub const fn ts(&self) -> u64 {
        self.ts
    }

    /// Timestamp the key held immediately before this insertion (0 = none).
    #[inline]
    #[must_use]
    pub const fn prev_ts(&self) -> u64 {
        self.prev_ts
    }

    /// On-the-wire size of the entry in bytes:
    /// `ENTRY_TS_SIZE + key.len() + value.len()`.
    ///
    /// Leaf `csize` accounting and the split budget are both expressed in
    /// this measure.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        ENTRY_TS_SIZE + self.key.len() + self.value.len()
    }
}
