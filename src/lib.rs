//! # TBTree
//!
//! An in-memory timestamped B-tree: an ordered mapping from opaque
//! byte-string keys to `(value, timestamp)` pairs, built as the index
//! layer of a verifiable key-value store.
//!
//! Every insertion carries a monotonically increasing logical
//! timestamp, and every node keeps its own creation timestamp (the max
//! timestamp of any entry it covers), so consistent read snapshots are
//! cheap to take and durability machinery can later decide which nodes
//! need rewriting.
//!
//! ## Design
//!
//! - Structural updates are copy-on-write: insertion rewrites the path
//!   from the target leaf up to the root, splitting nodes that overflow
//!   their byte budget, and swaps the root pointer under a single
//!   writer guard.
//! - Published nodes are immutable and shared behind `Arc`; a
//!   [`Snapshot`] captures a root and reads it without any further
//!   coordination with the writer.
//! - A [`Reader`] iterates a snapshot in key order, resuming across
//!   leaf boundaries from the locator's recorded path.
//! - Storage is a seam, not a dependency: inner nodes resolve lazily
//!   stored children through [`NodeManager`], and the resident-only
//!   build plugs in the identity [`ResidentNodeManager`].
//!
//! ## Example
//!
//! ```
//! use tbtree::{ReaderSpec, TBTree};
//!
//! let tree = TBTree::new().unwrap();
//! tree.insert(b"b", b"2", 1).unwrap();
//! tree.insert(b"a", b"1", 2).unwrap();
//!
//! let snapshot = tree.snapshot().unwrap();
//! let mut reader = snapshot.reader(ReaderSpec::default()).unwrap();
//!
//! let first = reader.read().unwrap().unwrap();
//! assert_eq!(first.key(), b"a");
//!
//! reader.close().unwrap();
//! snapshot.close().unwrap();
//! tree.close().unwrap();
//! ```

pub mod entry;
pub mod error;
pub mod inner;
pub mod leaf;
pub mod manager;
pub mod node;
pub mod reader;
pub mod snapshot;
pub mod tree;

pub use entry::{Entry, ENTRY_TS_SIZE};
pub use error::{Result, TreeError};
pub use inner::{ChildHandle, ChildRef, InnerNode};
pub use leaf::LeafNode;
pub use manager::{NodeManager, ResidentNodeManager, RESIDENT_OFFSET};
pub use node::Node;
pub use reader::{Reader, ReaderSpec};
pub use snapshot::Snapshot;
pub use tree::{
    Options, TBTree, DEFAULT_INSERTION_COUNT_THRESHOLD, DEFAULT_MAX_NODE_SIZE, MIN_NODE_SIZE,
};
