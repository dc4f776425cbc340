//! Read snapshots over a frozen tree version.
//!
//! A [`Snapshot`] captures the tree root at creation time. Because
//! published nodes are never mutated (every structural update is
//! copy-on-write), snapshot reads traverse the captured graph without
//! taking the tree's writer guard and can never observe a partial
//! write. The snapshot extends the lifetime of every node it reaches;
//! closing it hands the reference back to the tree.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Result, TreeError};
use crate::manager::NodeManager;
use crate::node::Node;
use crate::reader::{Reader, ReaderSpec};
use crate::tree::TBTree;

/// Registry of open readers, by id.
struct ReaderTable {
    next_id: u64,
    open: HashSet<u64>,
}

/// A frozen read view over one version of the tree.
pub struct Snapshot {
    /// Owning tree; weak so an unclosed snapshot cannot keep a dropped
    /// tree alive through the registration cycle.
    tree: Weak<TBTree>,

    /// Handle to this snapshot's own `Arc`, for handing out to readers.
    self_ref: Weak<Snapshot>,

    id: u64,

    /// Root captured at snapshot creation.
    root: Node,

    manager: Arc<dyn NodeManager>,

    readers: Mutex<ReaderTable>,

    closed: AtomicBool,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.id)
            .field("root_ts", &self.root.ts())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    pub(crate) fn create(
        tree: Weak<TBTree>,
        id: u64,
        root: Node,
        manager: Arc<dyn NodeManager>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            tree,
            self_ref: self_ref.clone(),
            id,
            root,
            manager,
            readers: Mutex::new(ReaderTable {
                next_id: 0,
                open: HashSet::new(),
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// The snapshot's id; ids increase monotonically per tree.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Timestamp of the captured root.
    #[inline]
    #[must_use]
    pub fn ts(&self) -> u64 {
        self.root.ts()
    }

    /// The captured root. Read-only traversal entry point for audit
    /// and verification tooling.
    #[must_use]
    pub fn root(&self) -> Node {
        self.root.clone()
    }

    pub(crate) fn manager(&self) -> &dyn NodeManager {
        self.manager.as_ref()
    }

    /// Latest `(value, ts)` for `key` as of this snapshot.
    ///
    /// Fails `IllegalArgument` on an empty key, `KeyNotFound` on a
    /// miss, and `AlreadyClosed` once the snapshot is closed.
    pub fn get(&self, key: &[u8]) -> Result<(Arc<[u8]>, u64)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TreeError::AlreadyClosed);
        }

        if key.is_empty() {
            return Err(TreeError::IllegalArgument);
        }

        self.root.get(key, self.manager.as_ref())
    }

    /// Open an ordered range cursor over this snapshot.
    pub fn reader(&self, spec: ReaderSpec) -> Result<Reader> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TreeError::AlreadyClosed);
        }

        let snapshot = self.self_ref.upgrade().ok_or(TreeError::IllegalState)?;

        let id = {
            let mut readers = self.readers.lock();
            let id = readers.next_id;
            readers.next_id += 1;
            readers.open.insert(id);
            id
        };

        match Reader::new(snapshot, id, spec) {
            Ok(reader) => Ok(reader),

            Err(err) => {
                self.reader_released(id);
                Err(err)
            }
        }
    }

    /// Close the snapshot, dropping it from the tree's table.
    ///
    /// Fails `ReadersNotClosed` while any reader opened from this
    /// snapshot is still live, and `AlreadyClosed` on a second close or
    /// when the tree was closed first.
    pub fn close(&self) -> Result<()> {
        if !self.readers.lock().open.is_empty() {
            return Err(TreeError::ReadersNotClosed);
        }

        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TreeError::AlreadyClosed);
        }

        let tree = self.tree.upgrade().ok_or(TreeError::AlreadyClosed)?;
        tree.snapshot_released(self.id)
    }

    /// Callback from a closing reader: drop it from the registry.
    pub(crate) fn reader_released(&self, id: u64) {
        self.readers.lock().open.remove(&id);
    }
}
