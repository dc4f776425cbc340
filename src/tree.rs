//! Filepath: src/tree.rs
//!
//! `TBTree` - a timestamped copy-on-write B-tree.
//!
//! The tree façade owns the current root, a monotonic insertion
//! counter and the snapshot table, and serializes writes behind a
//! single writer guard. Every insertion carries a strictly increasing
//! logical timestamp and rewrites the path from the target leaf up to
//! the root (splitting along the way when byte budgets overflow), so
//! readers holding an older root keep a consistent view without any
//! coordination.
//!
//! # Example
//!
//! ```
//! use tbtree::TBTree;
//!
//! let tree = TBTree::new().unwrap();
//! tree.insert(b"key", b"value", 1).unwrap();
//!
//! let snapshot = tree.snapshot().unwrap();
//! let (value, ts) = snapshot.get(b"key").unwrap();
//! assert_eq!(&*value, b"value");
//! assert_eq!(ts, 1);
//!
//! snapshot.close().unwrap();
//! tree.close().unwrap();
//! ```

use std::collections::HashMap;
use std::fmt as StdFmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::{Result, TreeError};
use crate::inner::{ChildRef, InnerNode};
use crate::leaf::LeafNode;
use crate::manager::{NodeManager, ResidentNodeManager};
use crate::node::Node;
use crate::snapshot::Snapshot;

/// Smallest accepted node byte budget.
pub const MIN_NODE_SIZE: usize = 64;

/// Default node byte budget.
pub const DEFAULT_MAX_NODE_SIZE: usize = 4096;

/// Default insertion count after which `snapshot()` stops reusing the
/// most recent snapshot.
pub const DEFAULT_INSERTION_COUNT_THRESHOLD: u64 = 100_000;

// ============================================================================
//  Options
// ============================================================================

/// Construction options for [`TBTree`].
///
/// ```
/// use tbtree::{Options, TBTree};
///
/// let tree = TBTree::with_options(
///     Options::default()
///         .with_max_node_size(128)
///         .with_insertion_count_threshold(10),
/// )
/// .unwrap();
/// # tree.close().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    max_node_size: usize,
    insertion_count_threshold: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_node_size: DEFAULT_MAX_NODE_SIZE,
            insertion_count_threshold: DEFAULT_INSERTION_COUNT_THRESHOLD,
        }
    }
}

impl Options {
    /// Set the node byte budget (minimum [`MIN_NODE_SIZE`]).
    #[must_use]
    pub fn with_max_node_size(mut self, max_node_size: usize) -> Self {
        self.max_node_size = max_node_size;
        self
    }

    /// Set the snapshot-reuse threshold (minimum 1).
    #[must_use]
    pub fn with_insertion_count_threshold(mut self, threshold: u64) -> Self {
        self.insertion_count_threshold = threshold;
        self
    }

    /// The configured node byte budget.
    #[inline]
    #[must_use]
    pub const fn max_node_size(&self) -> usize {
        self.max_node_size
    }

    /// The configured snapshot-reuse threshold.
    #[inline]
    #[must_use]
    pub const fn insertion_count_threshold(&self) -> u64 {
        self.insertion_count_threshold
    }

    fn validate(&self) -> Result<()> {
        if self.max_node_size < MIN_NODE_SIZE || self.insertion_count_threshold < 1 {
            return Err(TreeError::IllegalArgument);
        }

        Ok(())
    }
}

// ============================================================================
//  TBTree
// ============================================================================

/// Mutable tree state, guarded by the writer lock.
struct TreeState {
    /// Current root; replaced wholesale by each completed insert.
    root: Node,

    /// Inserts since the last fresh snapshot.
    insertion_count: u64,

    /// Live snapshots by id.
    snapshots: HashMap<u64, Arc<Snapshot>>,

    /// Next snapshot id to assign.
    max_snapshot_id: u64,

    closed: bool,
}

/// A timestamped copy-on-write B-tree.
///
/// Writes (`insert`, `snapshot`, `close`) serialize on an exclusive
/// guard held only for the root swap and snapshot-table update; reads
/// go through a [`Snapshot`], which captures the root by value and
/// never takes the guard afterwards.
pub struct TBTree {
    state: RwLock<TreeState>,
    max_node_size: usize,
    insertion_count_threshold: u64,
    manager: Arc<dyn NodeManager>,

    /// Handle to the tree's own `Arc`, passed to snapshots so they can
    /// call back on release without keeping the tree alive.
    self_ref: Weak<TBTree>,
}

impl StdFmt::Debug for TBTree {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let state = self.state.read();
        f.debug_struct("TBTree")
            .field("root_ts", &state.root.ts())
            .field("insertion_count", &state.insertion_count)
            .field("snapshots", &state.snapshots.len())
            .field("closed", &state.closed)
            .field("max_node_size", &self.max_node_size)
            .finish_non_exhaustive()
    }
}

impl TBTree {
    /// Create a tree with default [`Options`].
    pub fn new() -> Result<Arc<Self>> {
        Self::with_options(Options::default())
    }

    /// Create a tree with the given options.
    ///
    /// The initial root is an empty leaf with the configured byte
    /// budget; the root timestamp is 0.
    pub fn with_options(options: Options) -> Result<Arc<Self>> {
        Self::with_node_manager(options, Arc::new(ResidentNodeManager))
    }

    /// Create a tree resolving stored child references through
    /// `manager`. This is the seam a persistence layer plugs into; the
    /// resident-only build uses [`ResidentNodeManager`].
    pub fn with_node_manager(options: Options, manager: Arc<dyn NodeManager>) -> Result<Arc<Self>> {
        options.validate()?;

        let root = Node::Leaf(Arc::new(LeafNode::empty(options.max_node_size)));

        Ok(Arc::new_cyclic(|self_ref| Self {
            state: RwLock::new(TreeState {
                root,
                insertion_count: 0,
                snapshots: HashMap::new(),
                max_snapshot_id: 0,
                closed: false,
            }),
            max_node_size: options.max_node_size,
            insertion_count_threshold: options.insertion_count_threshold,
            manager,
            self_ref: self_ref.clone(),
        }))
    }

    /// Current root timestamp. Successive inserts must carry a strictly
    /// greater timestamp than this.
    #[must_use]
    pub fn ts(&self) -> u64 {
        self.state.read().root.ts()
    }

    /// Check if the tree has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Insert `(key, value)` at logical timestamp `ts`.
    ///
    /// Fails `IllegalArgument` when `key` is empty or `ts` is not
    /// strictly greater than the current root timestamp, and
    /// `AlreadyClosed` after [`close`](Self::close). On success the
    /// root reference is replaced atomically; a split that propagates
    /// past the old root yields a new root with exactly two children.
    pub fn insert(&self, key: &[u8], value: &[u8], ts: u64) -> Result<()> {
        let mut state = self.state.write();

        if state.closed {
            return Err(TreeError::AlreadyClosed);
        }

        if key.is_empty() || ts <= state.root.ts() {
            return Err(TreeError::IllegalArgument);
        }

        let (n1, n2) = state.root.insert_at(key, value, ts, self.manager.as_ref())?;

        // Assemble the replacement root in full before touching any
        // state: a failed insert must leave both the root and the
        // insertion count exactly as they were.
        let new_root = match n2 {
            None => n1,

            Some(n2) => {
                let prev = Some(state.root.downgrade());

                let children = vec![ChildRef::for_node(n1)?, ChildRef::for_node(n2)?];
                let root = InnerNode::root(children, self.max_node_size, prev);

                #[cfg(feature = "tracing")]
                tracing::debug!(ts, "split reached the root");

                Node::Inner(Arc::new(root))
            }
        };

        state.root = new_root;
        state.insertion_count += 1;

        #[cfg(feature = "tracing")]
        tracing::trace!(ts, key_len = key.len(), "insert");

        Ok(())
    }

    /// Obtain a read snapshot.
    ///
    /// While at least one snapshot is live and no more than the
    /// configured threshold of inserts have accumulated since the last
    /// fresh one, the most recently created snapshot is shared;
    /// otherwise a fresh snapshot of the current root is created,
    /// registered, and the insertion count resets. The threshold bounds
    /// the age-skew of cached snapshots.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        let mut state = self.state.write();

        if state.closed {
            return Err(TreeError::AlreadyClosed);
        }

        if !state.snapshots.is_empty() && state.insertion_count <= self.insertion_count_threshold {
            if let Some(snapshot) = state.snapshots.values().max_by_key(|s| s.id()).cloned() {
                #[cfg(feature = "tracing")]
                tracing::trace!(id = snapshot.id(), "snapshot reused");

                return Ok(snapshot);
            }
        }

        Ok(self.new_snapshot(&mut state))
    }

    fn new_snapshot(&self, state: &mut TreeState) -> Arc<Snapshot> {
        let id = state.max_snapshot_id;

        let snapshot = Snapshot::create(
            self.self_ref.clone(),
            id,
            state.root.clone(),
            Arc::clone(&self.manager),
        );

        state.snapshots.insert(id, Arc::clone(&snapshot));
        state.max_snapshot_id += 1;
        state.insertion_count = 0;

        #[cfg(feature = "tracing")]
        tracing::debug!(id, root_ts = snapshot.ts(), "snapshot created");

        snapshot
    }

    /// Close the tree.
    ///
    /// Fails `SnapshotsNotClosed` while any snapshot is live. Pending
    /// insertions (a non-zero count since the last fresh snapshot) are
    /// captured in a final snapshot for the durability layer to flush.
    /// Every subsequent public operation fails `AlreadyClosed`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();

        if state.closed {
            return Err(TreeError::AlreadyClosed);
        }

        if !state.snapshots.is_empty() {
            return Err(TreeError::SnapshotsNotClosed);
        }

        if state.insertion_count > 0 {
            // TODO: the durability layer must flush this snapshot.
            let _snapshot = self.new_snapshot(&mut state);
        }

        state.closed = true;

        #[cfg(feature = "tracing")]
        tracing::debug!("tree closed");

        Ok(())
    }

    /// Callback from a closing snapshot: drop it from the table.
    pub(crate) fn snapshot_released(&self, id: u64) -> Result<()> {
        let mut state = self.state.write();

        if state.closed {
            return Err(TreeError::AlreadyClosed);
        }

        state.snapshots.remove(&id);

        #[cfg(feature = "tracing")]
        tracing::trace!(id, "snapshot released");

        Ok(())
    }
}
