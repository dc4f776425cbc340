//! Filepath: src/node.rs
//!
//! Leaf/inner dispatch for the timestamped B-tree.
//!
//! The two node shapes share the capability set
//! {`insert_at`, `get`, `find_leaf`, `max_key`, `ts`}; [`Node`] is the
//! sum type that dispatches between them. Nodes are shared behind `Arc`
//! and are never mutated after publication: every structural update
//! produces new nodes (copy-on-write), so snapshot readers traverse the
//! graph without any coordination with the writer.

use std::sync::{Arc, Weak};

use crate::error::Result;
use crate::inner::InnerNode;
use crate::leaf::LeafNode;
use crate::manager::NodeManager;

/// Inner nodes traversed on the way down to a leaf, root first.
///
/// The range locator accumulates this so cursors can resume a scan from
/// the deepest still-useful level instead of retraversing the root.
pub type Path = Vec<Arc<InnerNode>>;

/// A node of the tree: either a run of entries or a run of child
/// references.
#[derive(Debug, Clone)]
pub enum Node {
    /// Ordered run of timestamped entries.
    Leaf(Arc<LeafNode>),

    /// Ordered run of child references.
    Inner(Arc<InnerNode>),
}

impl Node {
    /// Check if this node is a leaf.
    #[inline]
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Get the leaf, if this node is one.
    #[inline]
    #[must_use]
    pub fn as_leaf(&self) -> Option<&Arc<LeafNode>> {
        match self {
            Self::Leaf(leaf) => Some(leaf),

            Self::Inner(_) => None,
        }
    }

    /// Get the inner node, if this node is one.
    #[inline]
    #[must_use]
    pub fn as_inner(&self) -> Option<&Arc<InnerNode>> {
        match self {
            Self::Leaf(_) => None,

            Self::Inner(inner) => Some(inner),
        }
    }

    /// Copy-on-write insertion.
    ///
    /// Returns the replacement node and, when the insertion overflowed
    /// the byte budget, the split-off right sibling for the caller to
    /// reference. The replacement carries a weak audit link back to
    /// this node.
    pub(crate) fn insert_at(
        &self,
        key: &[u8],
        value: &[u8],
        ts: u64,
        mgr: &dyn NodeManager,
    ) -> Result<(Node, Option<Node>)> {
        let prev = Some(self.downgrade());

        match self {
            Self::Leaf(leaf) => Ok(leaf.insert_at(key, value, ts, prev)),

            Self::Inner(inner) => inner.insert_at(key, value, ts, prev, mgr),
        }
    }

    /// Point lookup. Returns the latest `(value, ts)` for `key`.
    pub(crate) fn get(&self, key: &[u8], mgr: &dyn NodeManager) -> Result<(Arc<[u8]>, u64)> {
        match self {
            Self::Leaf(leaf) => leaf.get(key),

            Self::Inner(inner) => inner.get(key, mgr),
        }
    }

    /// Ordered-range locator: position at the first entry with key
    /// `>= prefix` (ascending) or `<= prefix` (descending), strictly
    /// beyond a previously returned `neq_key` boundary.
    ///
    /// Every traversed inner node is recorded on `path`, root first, so
    /// cursors can resume without retraversing from the top. Returns
    /// the accumulated path, the located leaf, and the entry index;
    /// `KeyNotFound` when nothing qualifies. See the module docs of
    /// [`crate::leaf`] and [`crate::inner`] for the per-shape branch
    /// rules.
    pub fn find_leaf(
        &self,
        prefix: &[u8],
        mut path: Path,
        neq_key: Option<&[u8]>,
        ascending: bool,
        mgr: &dyn NodeManager,
    ) -> Result<(Path, Arc<LeafNode>, usize)> {
        let mut current = self.clone();

        loop {
            let next = match &current {
                Self::Leaf(leaf) => {
                    let index = leaf.search(prefix, neq_key, ascending)?;
                    return Ok((path, Arc::clone(leaf), index));
                }

                Self::Inner(inner) => {
                    path.push(Arc::clone(inner));
                    inner.route(prefix, neq_key, ascending)?.resolve(mgr)?
                }
            };

            current = next;
        }
    }

    /// The largest key covered by this subtree, or `None` for an empty
    /// root leaf.
    #[must_use]
    pub fn max_key(&self) -> Option<Arc<[u8]>> {
        match self {
            Self::Leaf(leaf) => leaf.max_key(),

            Self::Inner(inner) => inner.max_key(),
        }
    }

    /// The node's creation timestamp: the maximum entry timestamp in
    /// the subtree.
    #[inline]
    #[must_use]
    pub fn ts(&self) -> u64 {
        match self {
            Self::Leaf(leaf) => leaf.ts(),

            Self::Inner(inner) => inner.ts(),
        }
    }

    /// Current byte accounting of the node.
    #[inline]
    #[must_use]
    pub fn csize(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.csize(),

            Self::Inner(inner) => inner.csize(),
        }
    }

    /// The node's byte budget.
    #[inline]
    #[must_use]
    pub fn max_size(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.max_size(),

            Self::Inner(inner) => inner.max_size(),
        }
    }

    /// Audit back-link to the node this one was copied from, if it is
    /// still alive. Never traversed by queries.
    #[must_use]
    pub fn prev_node(&self) -> Option<Node> {
        match self {
            Self::Leaf(leaf) => leaf.prev_node(),

            Self::Inner(inner) => inner.prev_node(),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakNode {
        match self {
            Self::Leaf(leaf) => WeakNode::Leaf(Arc::downgrade(leaf)),

            Self::Inner(inner) => WeakNode::Inner(Arc::downgrade(inner)),
        }
    }

    /// Verify the structural invariants of the subtree rooted here
    /// (debug builds only).
    ///
    /// Checks, recursively:
    /// - keys within every node are strictly ascending
    /// - every child reference carries the child's actual max key and cts
    /// - `cts` equals the max over immediate children/entries
    /// - `csize` matches the recomputed byte accounting
    ///
    /// # Panics
    /// If any invariant is violated.
    #[cfg(debug_assertions)]
    pub fn debug_assert_invariants(&self) {
        match self {
            Self::Leaf(leaf) => leaf.debug_assert_invariants(),

            Self::Inner(inner) => {
                inner.debug_assert_invariants();

                for child_ref in inner.children() {
                    let Some(child) = child_ref.resident() else {
                        continue;
                    };

                    assert_eq!(
                        child.max_key().as_deref(),
                        Some(child_ref.max_key()),
                        "child reference max key does not match the child"
                    );
                    assert_eq!(
                        child.ts(),
                        child_ref.cts(),
                        "child reference cts does not match the child"
                    );

                    child.debug_assert_invariants();
                }
            }
        }
    }

    /// No-op in release builds.
    #[cfg(not(debug_assertions))]
    #[inline]
    pub fn debug_assert_invariants(&self) {}
}

/// Non-owning back-link to a predecessor node.
///
/// Kept weak so audit chains do not extend the lifetime of superseded
/// tree versions; reclamation stays driven by the tree root and the
/// snapshot table alone.
#[derive(Debug, Clone)]
pub(crate) enum WeakNode {
    Leaf(Weak<LeafNode>),
    Inner(Weak<InnerNode>),
}

impl WeakNode {
    pub(crate) fn upgrade(&self) -> Option<Node> {
        match self {
            Self::Leaf(weak) => weak.upgrade().map(Node::Leaf),

            Self::Inner(weak) => weak.upgrade().map(Node::Inner),
        }
    }
}
