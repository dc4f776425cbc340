//! Filepath: src/inner.rs
//!
//! Inner (routing) node for the timestamped B-tree.
//!
//! An inner node holds an ordered run of [`ChildRef`]s, each carrying
//! the child's max key, the child's aggregated timestamp, and a handle
//! that is either a resident node or a stored offset resolved through
//! the [`NodeManager`] seam. `csize` sums the max-key lengths; `cts` is
//! the max child timestamp.
//!
//! Insertion recurses into the covering child, then rebuilds the
//! reference run copy-on-write: a single returned child replaces its
//! slot, a split child pair occupies the slot and the one after it.
//! Either way the rebuilt run is re-measured and split when it exceeds
//! the byte budget - a replacement child can cover a longer max key, so
//! even the single-child case may overflow.

use std::sync::Arc;

use crate::error::{Result, TreeError};
use crate::manager::NodeManager;
use crate::node::{Node, WeakNode};

// ============================================================================
//  ChildRef
// ============================================================================

/// Reference to a child node: `(max_key, cts, handle)`.
#[derive(Debug, Clone)]
pub struct ChildRef {
    key: Arc<[u8]>,
    cts: u64,
    child: ChildHandle,
}

/// Handle carried by a [`ChildRef`]: the child itself, or the offset it
/// was stored at.
#[derive(Debug, Clone)]
pub enum ChildHandle {
    /// Child is resident in memory.
    Resident(Node),

    /// Child must be materialized through the node manager.
    Stored(u64),
}

impl ChildRef {
    /// Build a reference for a resident node.
    ///
    /// Fails `IllegalState` when the node has no max key (an empty leaf
    /// can never be published as a child).
    pub(crate) fn for_node(node: Node) -> Result<Self> {
        let key = node.max_key().ok_or(TreeError::IllegalState)?;

        Ok(Self {
            key,
            cts: node.ts(),
            child: ChildHandle::Resident(node),
        })
    }

    /// Largest key covered by the referenced child.
    #[inline]
    #[must_use]
    pub fn max_key(&self) -> &[u8] {
        &self.key
    }

    /// Shared handle to the max-key bytes.
    #[inline]
    #[must_use]
    pub fn max_key_arc(&self) -> Arc<[u8]> {
        Arc::clone(&self.key)
    }

    /// Aggregated timestamp of the referenced child.
    #[inline]
    #[must_use]
    pub const fn cts(&self) -> u64 {
        self.cts
    }

    /// The resident child, if the handle is in memory.
    #[must_use]
    pub fn resident(&self) -> Option<Node> {
        match &self.child {
            ChildHandle::Resident(node) => Some(node.clone()),

            ChildHandle::Stored(_) => None,
        }
    }

    /// Resolve the handle to a node, materializing through `mgr` when
    /// the child is not resident.
    pub(crate) fn resolve(&self, mgr: &dyn NodeManager) -> Result<Node> {
        match &self.child {
            ChildHandle::Resident(node) => Ok(node.clone()),

            ChildHandle::Stored(offset) => mgr.materialize(*offset),
        }
    }
}

// ============================================================================
//  InnerNode
// ============================================================================

/// Ordered, size-bounded run of child references.
#[derive(Debug)]
pub struct InnerNode {
    /// Child references in ascending max-key order.
    children: Vec<ChildRef>,

    /// Max child timestamp.
    cts: u64,

    /// Sum of max-key lengths over the run.
    csize: usize,

    /// Byte budget.
    max_size: usize,

    /// Audit back-link to the inner node this one was copied from.
    prev: Option<WeakNode>,

    /// Storage offset; 0 while resident-only.
    offset: u64,
}

impl InnerNode {
    /// Build a fresh root over `children` (the two halves of a split
    /// spine). The root is never itself split at creation.
    pub(crate) fn root(children: Vec<ChildRef>, max_size: usize, prev: Option<WeakNode>) -> Self {
        let csize = measure(&children);
        let cts = max_cts(&children);

        Self {
            children,
            cts,
            csize,
            max_size,
            prev,
            offset: 0,
        }
    }

    /// Number of child references.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// An inner node always references at least one child.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The child references, ascending by max key.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[ChildRef] {
        &self.children
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

    /// Max child timestamp.
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

    /// Max key of the right-most child.
    #[must_use]
    pub fn max_key(&self) -> Option<Arc<[u8]>> {
        self.children.last().map(ChildRef::max_key_arc)
    }

    /// Audit back-link to the superseded node, if still alive.
    #[must_use]
    pub fn prev_node(&self) -> Option<Node> {
        self.prev.as_ref().and_then(WeakNode::upgrade)
    }

    /// Index of the child covering `key`: the first reference with
    /// `key <= max_key`, or the right-most child when `key` is greater
    /// than every max key (that child's range is then extended).
    fn index_of(&self, key: &[u8]) -> usize {
        for (i, child_ref) in self.children.iter().enumerate() {
            if key <= child_ref.max_key() {
                return i;
            }
        }

        self.children.len() - 1
    }

    /// Copy-on-write insertion: recurse into the covering child and
    /// rebuild the reference run around what it returned. `prev`
    /// becomes the replacement node's audit back-link.
    pub(crate) fn insert_at(
        &self,
        key: &[u8],
        value: &[u8],
        ts: u64,
        prev: Option<WeakNode>,
        mgr: &dyn NodeManager,
    ) -> Result<(Node, Option<Node>)> {
        let i = self.index_of(key);

        let child = self.children[i].resolve(mgr)?;
        let (c1, c2) = child.insert_at(key, value, ts, mgr)?;

        let mut children = self.children.clone();
        children[i] = ChildRef::for_node(c1)?;

        if let Some(c2) = c2 {
            children.insert(i + 1, ChildRef::for_node(c2)?);
        }

        Ok(Self::publish(children, self.max_size, prev))
    }

    /// Wrap `children` into one node, or two when the re-measured run
    /// exceeds the budget. Each side recomputes its own `cts`.
    fn publish(
        mut children: Vec<ChildRef>,
        max_size: usize,
        prev: Option<WeakNode>,
    ) -> (Node, Option<Node>) {
        let csize = measure(&children);

        if csize <= max_size {
            let node = Self {
                cts: max_cts(&children),
                children,
                csize,
                max_size,
                prev,
                offset: 0,
            };

            return (Node::Inner(Arc::new(node)), None);
        }

        let (split_index, left_size) = split_point(&children, max_size);
        let right_children = children.split_off(split_index);

        let left = Self {
            cts: max_cts(&children),
            children,
            csize: left_size,
            max_size,
            prev,
            offset: 0,
        };

        let right = Self {
            cts: max_cts(&right_children),
            children: right_children,
            csize: csize - left_size,
            max_size,
            prev: None,
            offset: 0,
        };

        (
            Node::Inner(Arc::new(left)),
            Some(Node::Inner(Arc::new(right))),
        )
    }

    /// Point lookup: delegate to the covering child, missing outright
    /// when `key` lies past the right-most child's max key.
    pub(crate) fn get(&self, key: &[u8], mgr: &dyn NodeManager) -> Result<(Arc<[u8]>, u64)> {
        let i = self.index_of(key);
        let child_ref = &self.children[i];

        if key > child_ref.max_key() {
            return Err(TreeError::KeyNotFound);
        }

        child_ref.resolve(mgr)?.get(key, mgr)
    }

    /// Locator leg: pick the child to descend into.
    ///
    /// Ascending (or without a `neq_key`): the first child whose max
    /// key is `>= prefix` and beyond `neq_key`; with no hit, a
    /// descending scan falls into the last child (it starts beyond all
    /// keys) and an ascending one misses. Descending with a `neq_key`:
    /// the first child from the right with max key `<= prefix` and
    /// below `neq_key`.
    pub(crate) fn route(
        &self,
        prefix: &[u8],
        neq_key: Option<&[u8]>,
        ascending: bool,
    ) -> Result<&ChildRef> {
        if ascending || neq_key.is_none() {
            for child_ref in &self.children {
                if prefix <= child_ref.max_key()
                    && neq_key.map_or(true, |neq| child_ref.max_key() > neq)
                {
                    return Ok(child_ref);
                }
            }

            if ascending {
                return Err(TreeError::KeyNotFound);
            }

            return self.children.last().ok_or(TreeError::IllegalState);
        }

        let neq = neq_key.ok_or(TreeError::IllegalState)?;

        for child_ref in self.children.iter().rev() {
            if child_ref.max_key() <= prefix && child_ref.max_key() < neq {
                return Ok(child_ref);
            }
        }

        Err(TreeError::KeyNotFound)
    }

    /// Verify inner-node invariants (debug builds only).
    ///
    /// # Panics
    /// If max keys are not strictly ascending, or `cts`/`csize`
    /// disagree with the recomputed aggregates.
    #[cfg(debug_assertions)]
    pub fn debug_assert_invariants(&self) {
        assert!(!self.children.is_empty(), "inner node with no children");

        for pair in self.children.windows(2) {
            assert!(
                pair[0].max_key() < pair[1].max_key(),
                "child max keys not strictly ascending: {:?} >= {:?}",
                pair[0].max_key(),
                pair[1].max_key()
            );
        }

        assert_eq!(self.cts, max_cts(&self.children), "inner cts is stale");
        assert_eq!(self.csize, measure(&self.children), "inner csize is stale");
    }

    /// No-op in release builds.
    #[cfg(not(debug_assertions))]
    #[inline]
    pub fn debug_assert_invariants(&self) {}
}

/// Sum of max-key lengths over a reference run.
fn measure(children: &[ChildRef]) -> usize {
    children.iter().map(|c| c.max_key().len()).sum()
}

/// Max child timestamp, 0 for an empty run.
fn max_cts(children: &[ChildRef]) -> u64 {
    children.iter().map(ChildRef::cts).max().unwrap_or(0)
}

/// Smallest index whose max key would push the cumulative size past
/// `max_size`, plus the cumulative size before it.
fn split_point(children: &[ChildRef], max_size: usize) -> (usize, usize) {
    let mut split_index = 0;
    let mut split_size = 0;

    for (i, child_ref) in children.iter().enumerate() {
        split_index = i;

        if split_size + child_ref.max_key().len() > max_size {
            break;
        }

        split_size += child_ref.max_key().len();
    }

    (split_index, split_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::LeafNode;
    use crate::manager::ResidentNodeManager;

    const MGR: ResidentNodeManager = ResidentNodeManager;

    fn leaf_node(items: &[(&[u8], &[u8], u64)], max_size: usize) -> Node {
        let mut node = Node::Leaf(Arc::new(LeafNode::empty(max_size)));

        for (key, value, ts) in items {
            let (n1, n2) = node.insert_at(key, value, *ts, &MGR).unwrap();
            assert!(n2.is_none());
            node = n1;
        }

        node
    }

    fn node_insert(
        inner: &Arc<InnerNode>,
        key: &[u8],
        value: &[u8],
        ts: u64,
    ) -> Result<(Node, Option<Node>)> {
        Node::Inner(Arc::clone(inner)).insert_at(key, value, ts, &MGR)
    }

    fn inner_over(leaves: Vec<Node>, max_size: usize) -> Arc<InnerNode> {
        let children = leaves
            .into_iter()
            .map(|n| ChildRef::for_node(n).unwrap())
            .collect();

        Arc::new(InnerNode::root(children, max_size, None))
    }

    #[test]
    fn test_child_ref_carries_max_key_and_cts() {
        let leaf = leaf_node(&[(b"a", b"1", 1), (b"c", b"3", 5)], 4096);
        let child_ref = ChildRef::for_node(leaf).unwrap();

        assert_eq!(child_ref.max_key(), b"c");
        assert_eq!(child_ref.cts(), 5);
        assert!(child_ref.resident().is_some());
    }

    #[test]
    fn test_routing_and_get() {
        let inner = inner_over(
            vec![
                leaf_node(&[(b"a", b"1", 1), (b"b", b"2", 2)], 4096),
                leaf_node(&[(b"d", b"4", 3), (b"f", b"6", 4)], 4096),
            ],
            4096,
        );

        assert_eq!(inner.index_of(b"a"), 0);
        assert_eq!(inner.index_of(b"c"), 1);
        assert_eq!(inner.index_of(b"f"), 1);
        // Greater than every max key: routed to the right-most child.
        assert_eq!(inner.index_of(b"z"), 1);

        let (value, ts) = inner.get(b"d", &MGR).unwrap();
        assert_eq!(&*value, b"4");
        assert_eq!(ts, 3);

        // In-range gap and past-the-edge gap both miss.
        assert_eq!(inner.get(b"c", &MGR).unwrap_err(), TreeError::KeyNotFound);
        assert_eq!(inner.get(b"z", &MGR).unwrap_err(), TreeError::KeyNotFound);
    }

    #[test]
    fn test_insert_replaces_slot_and_updates_aggregates() {
        let inner = inner_over(
            vec![
                leaf_node(&[(b"a", b"1", 1)], 4096),
                leaf_node(&[(b"d", b"4", 2)], 4096),
            ],
            4096,
        );

        let (n1, n2) = node_insert(&inner, b"b", b"2", 7).unwrap();
        assert!(n2.is_none());

        // "b" routes into the second child (first max key >= "b" is "d");
        // only that slot is replaced.
        let updated = n1.as_inner().unwrap();
        assert_eq!(updated.len(), 2);
        assert_eq!(updated.ts(), 7);
        assert_eq!(updated.children()[1].max_key(), b"d");
        assert_eq!(updated.children()[1].cts(), 7);
        assert_eq!(updated.children()[0].cts(), 1);
        updated.debug_assert_invariants();

        // Source run untouched.
        assert_eq!(inner.ts(), 2);
        assert_eq!(inner.children()[1].cts(), 2);

        let prev = updated.prev_node().unwrap();
        assert!(Arc::ptr_eq(prev.as_inner().unwrap(), &inner));
    }

    #[test]
    fn test_insert_beyond_right_edge_extends_max_key() {
        let inner = inner_over(
            vec![
                leaf_node(&[(b"a", b"1", 1)], 4096),
                leaf_node(&[(b"d", b"4", 2)], 4096),
            ],
            4096,
        );

        let (n1, n2) = node_insert(&inner, b"x", b"9", 3).unwrap();
        assert!(n2.is_none());

        let updated = n1.as_inner().unwrap();
        assert_eq!(updated.children()[1].max_key(), b"x");

        let (value, _) = updated.get(b"x", &MGR).unwrap();
        assert_eq!(&*value, b"9");
    }

    #[test]
    fn test_child_split_widens_the_run() {
        // The first leaf holds two entries at 36 of its 40 bytes;
        // routing "ab" into it overflows the budget, the leaf splits and
        // the run grows by one reference.
        let inner = inner_over(
            vec![
                leaf_node(&[(b"a", b"1", 1), (b"b", b"2", 2)], 40),
                leaf_node(&[(b"x", b"8", 3)], 40),
            ],
            4096,
        );

        let (n1, n2) = node_insert(&inner, b"ab", b"3", 4).unwrap();
        assert!(n2.is_none());

        let updated = n1.as_inner().unwrap();
        assert_eq!(updated.len(), 3);

        let max_keys: Vec<&[u8]> = updated.children().iter().map(ChildRef::max_key).collect();
        assert_eq!(max_keys, vec![b"ab".as_ref(), b"b".as_ref(), b"x".as_ref()]);
        updated.debug_assert_invariants();
    }

    #[test]
    fn test_inner_split_on_key_budget_overflow() {
        // Max keys are 16 bytes each; a 40-byte budget fits two
        // references. Inserting k2 splits the second leaf (its 40-byte
        // budget holds one 33-byte entry), the run grows to three
        // references (48 bytes) and the inner node splits too.
        let k1: &[u8] = b"aaaaaaaaaaaaaaaa";
        let k2: &[u8] = b"bbbbbbbbbbbbbbbb";
        let k3: &[u8] = b"cccccccccccccccc";

        let inner = inner_over(
            vec![leaf_node(&[(k1, b"1", 1)], 40), leaf_node(&[(k3, b"3", 2)], 40)],
            40,
        );

        let (n1, n2) = node_insert(&inner, k2, b"2", 3).unwrap();
        let right = n2.expect("run of three 16-byte keys must split");

        let left = n1.as_inner().unwrap();
        let right = right.as_inner().unwrap();

        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 1);
        assert_eq!(left.csize() + right.csize(), 48);
        left.debug_assert_invariants();
        right.debug_assert_invariants();
    }

    #[test]
    fn test_find_leaf_records_path() {
        let inner = inner_over(
            vec![
                leaf_node(&[(b"a", b"1", 1), (b"b", b"2", 2)], 4096),
                leaf_node(&[(b"d", b"4", 3)], 4096),
            ],
            4096,
        );

        let (path, leaf, i) = Node::Inner(Arc::clone(&inner))
            .find_leaf(b"c", Vec::new(), None, true, &MGR)
            .unwrap();

        assert_eq!(path.len(), 1);
        assert!(Arc::ptr_eq(&path[0], &inner));
        assert_eq!(leaf.entries()[i].key(), b"d");
    }

    #[test]
    fn test_find_leaf_descending_past_all_keys() {
        let inner = inner_over(
            vec![
                leaf_node(&[(b"a", b"1", 1)], 4096),
                leaf_node(&[(b"d", b"4", 2)], 4096),
            ],
            4096,
        );

        // Ascending: nothing at or after "x".
        let err = Node::Inner(Arc::clone(&inner))
            .find_leaf(b"x", Vec::new(), None, true, &MGR)
            .unwrap_err();
        assert_eq!(err, TreeError::KeyNotFound);

        // Descending: positions at the very last entry.
        let (_, leaf, i) = Node::Inner(Arc::clone(&inner))
            .find_leaf(b"x", Vec::new(), None, false, &MGR)
            .unwrap();
        assert_eq!(leaf.entries()[i].key(), b"d");
    }
}
