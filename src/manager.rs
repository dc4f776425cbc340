//! Node-manager seam for lazily stored children.
//!
//! Inner nodes reference children either as resident in-memory nodes or
//! as stored offsets. Resolving a stored offset is delegated to a
//! [`NodeManager`], which is where a persistence layer plugs in. The
//! resident-only build ships [`ResidentNodeManager`], for which stored
//! offsets cannot exist.

use crate::error::{Result, TreeError};
use crate::node::Node;

/// Offset value of a node that only exists in memory.
pub const RESIDENT_OFFSET: u64 = 0;

/// Materializes and persists nodes on behalf of the tree core.
///
/// The core calls [`materialize`](NodeManager::materialize) only through
/// child references whose in-memory handle is absent; a resident-only
/// tree never does.
pub trait NodeManager: Send + Sync {
    /// Load the node stored at `offset`.
    fn materialize(&self, offset: u64) -> Result<Node>;

    /// Write `node` out and return the offset it was assigned.
    fn persist(&self, node: &Node) -> Result<u64>;
}

/// The identity node manager for resident-only trees.
///
/// Nothing is ever written, so no stored offset can exist to be
/// materialized; a request to do so means a child reference was
/// fabricated outside the tree core.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResidentNodeManager;

impl NodeManager for ResidentNodeManager {
    fn materialize(&self, _offset: u64) -> Result<Node> {
        Err(TreeError::IllegalState)
    }

    fn persist(&self, _node: &Node) -> Result<u64> {
        Ok(RESIDENT_OFFSET)
    }
}
