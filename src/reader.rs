//! Ordered range cursor over a snapshot.
//!
//! A [`Reader`] walks the entries of one frozen tree version in key
//! order, ascending or descending from an initial key, optionally
//! filtered to keys sharing the initial key as a prefix. It seeks with
//! the range locator and keeps the locator's path of traversed inner
//! nodes, so crossing a leaf boundary resumes from the deepest
//! still-useful level instead of the root: the exhausted leaf's
//! boundary key is passed back as the `neq_key` and path levels that
//! have nothing left to offer are popped.

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{Result, TreeError};
use crate::leaf::LeafNode;
use crate::node::{Node, Path};
use crate::snapshot::Snapshot;

/// What a [`Reader`] should scan.
#[derive(Debug, Clone)]
pub struct ReaderSpec {
    initial_key: Vec<u8>,
    is_prefix: bool,
    asc_order: bool,
}

/// An ascending scan over every key.
impl Default for ReaderSpec {
    fn default() -> Self {
        Self::ascending(Vec::new())
    }
}

impl ReaderSpec {
    /// Ascending scan starting at the smallest key `>= initial_key`.
    #[must_use]
    pub fn ascending(initial_key: Vec<u8>) -> Self {
        Self {
            initial_key,
            is_prefix: false,
            asc_order: true,
        }
    }

    /// Descending scan starting at the largest key `<= initial_key`.
    #[must_use]
    pub fn descending(initial_key: Vec<u8>) -> Self {
        Self {
            initial_key,
            is_prefix: false,
            asc_order: false,
        }
    }

    /// Restrict the scan to keys sharing `initial_key` as a prefix.
    #[must_use]
    pub fn with_prefix_only(mut self, is_prefix: bool) -> Self {
        self.is_prefix = is_prefix;
        self
    }

    /// The scan's starting key.
    #[inline]
    #[must_use]
    pub fn initial_key(&self) -> &[u8] {
        &self.initial_key
    }

    /// Whether only prefix-sharing keys are returned.
    #[inline]
    #[must_use]
    pub const fn is_prefix(&self) -> bool {
        self.is_prefix
    }

    /// Whether the scan ascends.
    #[inline]
    #[must_use]
    pub const fn asc_order(&self) -> bool {
        self.asc_order
    }
}

/// Cursor state: the current leaf and the index of the next entry to
/// hand out.
struct Position {
    leaf: Arc<LeafNode>,
    offset: usize,
}

/// An ordered range cursor over one snapshot.
///
/// Obtained from [`Snapshot::reader`]; must be [`close`](Reader::close)d
/// (or dropped) before the snapshot itself can close.
pub struct Reader {
    snapshot: Arc<Snapshot>,
    id: u64,
    initial_key: Vec<u8>,
    is_prefix: bool,
    asc_order: bool,
    path: Path,
    position: Option<Position>,
    closed: bool,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.id)
            .field("asc_order", &self.asc_order)
            .field("exhausted", &self.position.is_none())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Reader {
    pub(crate) fn new(snapshot: Arc<Snapshot>, id: u64, spec: ReaderSpec) -> Result<Self> {
        let root = snapshot.root();

        let mut reader = Self {
            snapshot,
            id,
            initial_key: spec.initial_key,
            is_prefix: spec.is_prefix,
            asc_order: spec.asc_order,
            path: Vec::new(),
            position: None,
            closed: false,
        };

        let seek = root.find_leaf(
            &reader.initial_key,
            Vec::new(),
            None,
            reader.asc_order,
            reader.snapshot.manager(),
        );

        match seek {
            Ok((path, leaf, offset)) => {
                reader.path = path;
                reader.position = Some(Position { leaf, offset });
            }

            // Nothing in range: the reader starts out exhausted.
            Err(TreeError::KeyNotFound) => {}

            Err(err) => return Err(err),
        }

        Ok(reader)
    }

    /// The reader's id within its snapshot.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Next entry in scan order, or `Ok(None)` once the range is
    /// exhausted. Fails `AlreadyClosed` after [`close`](Self::close).
    pub fn read(&mut self) -> Result<Option<Arc<Entry>>> {
        if self.closed {
            return Err(TreeError::AlreadyClosed);
        }

        let Some(position) = self.position.take() else {
            return Ok(None);
        };

        let entry = Arc::clone(&position.leaf.entries()[position.offset]);

        if self.is_prefix && !entry.key().starts_with(&self.initial_key) {
            // Prefix-sharing keys are contiguous; the first stranger
            // ends the scan.
            return Ok(None);
        }

        self.advance(position)?;

        Ok(Some(entry))
    }

    /// Step past the entry just returned, crossing into the next leaf
    /// through the recorded path when the current one is exhausted.
    fn advance(&mut self, position: Position) -> Result<()> {
        let Position { leaf, offset } = position;

        if self.asc_order {
            if offset + 1 < leaf.len() {
                self.position = Some(Position {
                    leaf,
                    offset: offset + 1,
                });
                return Ok(());
            }
        } else if offset > 0 {
            self.position = Some(Position {
                leaf,
                offset: offset - 1,
            });
            return Ok(());
        }

        // Leaf exhausted: its boundary key excludes everything already
        // returned when re-seeking from the path.
        let boundary = if self.asc_order {
            leaf.max_key()
        } else {
            leaf.entries().first().map(|e| e.key_arc())
        };

        let Some(boundary) = boundary else {
            return Ok(());
        };

        while let Some(parent) = self.path.pop() {
            let seek = Node::Inner(parent).find_leaf(
                &self.initial_key,
                self.path.clone(),
                Some(&boundary),
                self.asc_order,
                self.snapshot.manager(),
            );

            match seek {
                Ok((path, leaf, offset)) => {
                    self.path = path;
                    self.position = Some(Position { leaf, offset });
                    return Ok(());
                }

                // This level has nothing left; try one higher up.
                Err(TreeError::KeyNotFound) => continue,

                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Close the reader, dropping it from the snapshot's registry.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(TreeError::AlreadyClosed);
        }

        self.snapshot.reader_released(self.id);
        self.closed = true;

        Ok(())
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        if !self.closed {
            self.snapshot.reader_released(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Options, TBTree};

    fn small_node_tree(keys: &[&str]) -> Arc<TBTree> {
        let tree = TBTree::with_options(Options::default().with_max_node_size(64)).unwrap();

        for (i, key) in keys.iter().enumerate() {
            tree.insert(key.as_bytes(), b"value-000", i as u64 + 1).unwrap();
        }

        tree
    }

    fn read_keys(reader: &mut Reader) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();

        while let Some(entry) = reader.read().unwrap() {
            keys.push(entry.key().to_vec());
        }

        keys
    }

    #[test]
    fn test_ascending_full_scan_crosses_leaves() {
        let tree = small_node_tree(&["e", "c", "a", "d", "b", "f", "g"]);
        let snapshot = tree.snapshot().unwrap();

        let mut reader = snapshot.reader(ReaderSpec::ascending(Vec::new())).unwrap();
        let keys = read_keys(&mut reader);

        let expected: Vec<Vec<u8>> = ["a", "b", "c", "d", "e", "f", "g"]
            .iter()
            .map(|k| k.as_bytes().to_vec())
            .collect();
        assert_eq!(keys, expected);

        // Exhausted stays exhausted.
        assert!(reader.read().unwrap().is_none());

        reader.close().unwrap();
        snapshot.close().unwrap();
        tree.close().unwrap();
    }

    #[test]
    fn test_ascending_from_initial_key() {
        let tree = small_node_tree(&["a", "b", "c", "d", "e"]);
        let snapshot = tree.snapshot().unwrap();

        let mut reader = snapshot
            .reader(ReaderSpec::ascending(b"c".to_vec()))
            .unwrap();
        let keys = read_keys(&mut reader);

        assert_eq!(keys, vec![b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]);

        reader.close().unwrap();
        snapshot.close().unwrap();
        tree.close().unwrap();
    }

    #[test]
    fn test_descending_scan() {
        let tree = small_node_tree(&["a", "b", "c", "d", "e"]);
        let snapshot = tree.snapshot().unwrap();

        let mut reader = snapshot
            .reader(ReaderSpec::descending(b"d".to_vec()))
            .unwrap();
        let keys = read_keys(&mut reader);

        assert_eq!(
            keys,
            vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]
        );

        reader.close().unwrap();
        snapshot.close().unwrap();
        tree.close().unwrap();
    }

    #[test]
    fn test_prefix_scan_stops_at_strangers() {
        let tree = small_node_tree(&["aa", "ab1", "ab2", "ac", "b"]);
        let snapshot = tree.snapshot().unwrap();

        let mut reader = snapshot
            .reader(ReaderSpec::ascending(b"ab".to_vec()).with_prefix_only(true))
            .unwrap();
        let keys = read_keys(&mut reader);

        assert_eq!(keys, vec![b"ab1".to_vec(), b"ab2".to_vec()]);

        reader.close().unwrap();
        snapshot.close().unwrap();
        tree.close().unwrap();
    }

    #[test]
    fn test_empty_range() {
        let tree = small_node_tree(&["a", "b"]);
        let snapshot = tree.snapshot().unwrap();

        let mut reader = snapshot
            .reader(ReaderSpec::ascending(b"z".to_vec()))
            .unwrap();
        assert!(reader.read().unwrap().is_none());

        reader.close().unwrap();
        snapshot.close().unwrap();
        tree.close().unwrap();
    }

    #[test]
    fn test_read_after_close() {
        let tree = small_node_tree(&["a"]);
        let snapshot = tree.snapshot().unwrap();

        let mut reader = snapshot.reader(ReaderSpec::ascending(Vec::new())).unwrap();
        reader.close().unwrap();

        assert_eq!(reader.read().unwrap_err(), TreeError::AlreadyClosed);
        assert_eq!(reader.close().unwrap_err(), TreeError::AlreadyClosed);

        snapshot.close().unwrap();
        tree.close().unwrap();
    }

    #[test]
    fn test_dropped_reader_deregisters() {
        let tree = small_node_tree(&["a"]);
        let snapshot = tree.snapshot().unwrap();

        {
            let _reader = snapshot.reader(ReaderSpec::ascending(Vec::new())).unwrap();
        }

        // The dropped reader no longer blocks the snapshot.
        snapshot.close().unwrap();
        tree.close().unwrap();
    }
}
