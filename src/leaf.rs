//! Filepath: src/leaf.rs
//!
//! Leaf node for the timestamped B-tree.
//!
//! A leaf holds an ordered run of [`Entry`] values (ascending, unique
//! keys) under a byte budget. Insertion is copy-on-write: it produces a
//! new leaf sharing entry payloads with the source and, when the budget
//! overflows, a split-off right sibling. `cts` aggregates the maximum
//! entry timestamp; `csize` sums [`Entry::size`] over the run.
//!
//! # Locator rules (leaf leg)
//!
//! `search` positions a cursor at the first entry with
//! `prefix <= key` and `key > neq_key` (ascending; an absent `neq_key`
//! reads as -inf). Descending with a `neq_key` scans from the right for
//! the first entry with `key <= prefix` and `key < neq_key`. Descending
//! without one falls back to the last entry when the ascending scan has
//! no hit.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{Result, TreeError};
use crate::node::{Node, WeakNode};

/// Ordered, size-bounded run of timestamped entries.
#[derive(Debug)]
pub struct LeafNode {
    /// Entries in ascending key order, unique keys.
    entries: Vec<Arc<Entry>>,

    /// Max entry timestamp in this leaf.
    cts: u64,

    /// Sum of `Entry::size` over the run.
    csize: usize,

    /// Byte budget; `csize` may exceed it only transiently during an
    /// insertion, resolved by split before the node is published.
    max_size: usize,

    /// Audit back-link to the leaf this one was copied from.
    prev: Option<WeakNode>,

    /// Storage offset; 0 while resident-only.
    offset: u64,
}

impl LeafNode {
    /// Create an empty leaf with the given byte budget.
    ///
    /// The initial root of every tree is such a leaf.
    #[must_use]
    pub(crate) fn empty(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            cts: 0,
            csize: 0,
            max_size,
            prev: None,
            offset: 0,
        }
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the leaf holds no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries, ascending by key.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    /// Current byte accounting.
    #[inline]
    #[must_use]
    pub const fn csize(&self) -> usize {
        self.csize
    }

    /// The byte budget.
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Max entry timestamp in this leaf.
    #[inline]
    #[must_use]
    pub const fn ts(&self) -> u64 {
        self.cts
    }

    /// Storage offset; 0 while resident-only.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Key of the last entry, or `None` for an empty leaf.
    #[must_use]
    pub fn max_key(&self) -> Option<Arc<[u8]>> {
        self.entries.last().map(|e| e.key_arc())
    }

    /// Audit back-link to the superseded leaf, if still alive.
    #[must_use]
    pub fn prev_node(&self) -> Option<Node> {
        self.prev.as_ref().and_then(WeakNode::upgrade)
    }

    /// Locate `key`: `(index, true)` when present, otherwise the
    /// position the key would occupy and `false`.
    fn index_of(&self, key: &[u8]) -> (usize, bool) {
        for (i, entry) in self.entries.iter().enumerate() {
            match entry.key().cmp(key) {
                Ordering::Equal => return (i, true),

                Ordering::Greater => return (i, false),

                Ordering::Less => {}
            }
        }

        (self.entries.len(), false)
    }

    /// Copy-on-write insertion of `(key, value, ts)`.
    ///
    /// Replacing an existing key records the replaced entry's timestamp
    /// as `prev_ts` and adjusts `csize` by the value-length delta; a new
    /// key is spliced in at its ordered position with `prev_ts = 0`.
    /// Either way the result is split when it exceeds the byte budget.
    /// `prev` becomes the replacement leaf's audit back-link.
    pub(crate) fn insert_at(
        &self,
        key: &[u8],
        value: &[u8],
        ts: u64,
        prev: Option<WeakNode>,
    ) -> (Node, Option<Node>) {
        let (i, found) = self.index_of(key);

        if found {
            let replaced = &self.entries[i];
            let entry = Arc::new(Entry::new(
                Arc::from(key),
                Arc::from(value),
                ts,
                replaced.ts(),
            ));

            // Replacement keeps the key bytes but may resize the value.
            let csize = self.csize - replaced.value().len() + value.len();

            let mut entries = self.entries.clone();
            entries[i] = entry;

            return Self::publish(entries, csize, self.max_size, prev);
        }

        let entry = Arc::new(Entry::new(Arc::from(key), Arc::from(value), ts, 0));
        let csize = self.csize + entry.size();

        let mut entries: Vec<Arc<Entry>> = Vec::with_capacity(self.entries.len() + 1);
        entries.extend_from_slice(&self.entries[..i]);
        entries.push(entry);
        entries.extend_from_slice(&self.entries[i..]);

        Self::publish(entries, csize, self.max_size, prev)
    }

    /// Wrap `entries` into one leaf, or two when `csize` exceeds the
    /// budget. Each side recomputes its own `cts`.
    fn publish(
        mut entries: Vec<Arc<Entry>>,
        csize: usize,
        max_size: usize,
        prev: Option<WeakNode>,
    ) -> (Node, Option<Node>) {
        if csize <= max_size {
            let leaf = Self {
                cts: max_ts(&entries),
                entries,
                csize,
                max_size,
                prev,
                offset: 0,
            };

            return (Node::Leaf(Arc::new(leaf)), None);
        }

        let (split_index, left_size) = split_point(&entries, max_size);
        let right_entries = entries.split_off(split_index);

        let left = Self {
            cts: max_ts(&entries),
            entries,
            csize: left_size,
            max_size,
            prev,
            offset: 0,
        };

        let right = Self {
            cts: max_ts(&right_entries),
            entries: right_entries,
            csize: csize - left_size,
            max_size,
            prev: None,
            offset: 0,
        };

        (
            Node::Leaf(Arc::new(left)),
            Some(Node::Leaf(Arc::new(right))),
        )
    }

    /// Point lookup: latest `(value, ts)` for `key`.
    pub(crate) fn get(&self, key: &[u8]) -> Result<(Arc<[u8]>, u64)> {
        let (i, found) = self.index_of(key);

        if !found {
            return Err(TreeError::KeyNotFound);
        }

        let entry = &self.entries[i];
        Ok((entry.value_arc(), entry.ts()))
    }

    /// Locator leg: index of the first qualifying entry; branch rules
    /// in the module docs.
    pub(crate) fn search(
        &self,
        prefix: &[u8],
        neq_key: Option<&[u8]>,
        ascending: bool,
    ) -> Result<usize> {
        if ascending || neq_key.is_none() {
            for (i, entry) in self.entries.iter().enumerate() {
                if prefix <= entry.key() && neq_key.map_or(true, |neq| entry.key() > neq) {
                    return Ok(i);
                }
            }

            if ascending || self.entries.is_empty() {
                return Err(TreeError::KeyNotFound);
            }

            // Descending scan starting beyond all keys.
            return Ok(self.entries.len() - 1);
        }

        let neq = neq_key.ok_or(TreeError::IllegalState)?;

        for (i, entry) in self.entries.iter().enumerate().rev() {
            if entry.key() <= prefix && entry.key() < neq {
                return Ok(i);
            }
        }

        Err(TreeError::KeyNotFound)
    }

    /// Verify leaf invariants (debug builds only).
    ///
    /// # Panics
    /// If keys are not strictly ascending, or `cts`/`csize` disagree
    /// with the recomputed aggregates.
    #[cfg(debug_assertions)]
    pub fn debug_assert_invariants(&self) {
        for pair in self.entries.windows(2) {
            assert!(
                pair[0].key() < pair[1].key(),
                "leaf keys not strictly ascending: {:?} >= {:?}",
                pair[0].key(),
                pair[1].key()
            );
        }

        assert_eq!(self.cts, max_ts(&self.entries), "leaf cts is stale");

        let recomputed: usize = self.entries.iter().map(|e| e.size()).sum();
        assert_eq!(self.csize, recomputed, "leaf csize is stale");
    }

    /// No-op in release builds.
    #[cfg(not(debug_assertions))]
    #[inline]
    pub fn debug_assert_invariants(&self) {}
}

/// Max entry timestamp, 0 for an empty run.
fn max_ts(entries: &[Arc<Entry>]) -> u64 {
    entries.iter().map(|e| e.ts()).max().unwrap_or(0)
}

/// Smallest index whose entry would push the cumulative size past
/// `max_size`, plus the cumulative size before it.
///
/// Entries `[0, split_index)` stay in the left leaf.
fn split_point(entries: &[Arc<Entry>], max_size: usize) -> (usize, usize) {
    let mut split_index = 0;
    let mut split_size = 0;

    for (i, entry) in entries.iter().enumerate() {
        split_index = i;

        if split_size + entry.size() > max_size {
            break;
        }

        split_size += entry.size();
    }

    (split_index, split_size)
}
