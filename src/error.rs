//! Error types for the timestamped B-tree.
//!
//! Every failure is a programmer-visible contract violation or a lookup
//! miss; nothing here crosses a trust boundary and nothing is retried.

use thiserror::Error;

/// Result type alias using [`TreeError`].
pub type Result<T> = std::result::Result<T, TreeError>;

/// Unified error type for tree, snapshot and reader operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// Empty key, non-monotonic timestamp, or invalid options.
    #[error("illegal arguments")]
    IllegalArgument,

    /// Lookup or range locator found no qualifying key.
    #[error("key not found")]
    KeyNotFound,

    /// Invariant violation detected at runtime.
    #[error("illegal state")]
    IllegalState,

    /// Operation on a closed tree, snapshot or reader.
    #[error("already closed")]
    AlreadyClosed,

    /// Close called on a tree with live snapshots.
    #[error("snapshots not closed")]
    SnapshotsNotClosed,

    /// Close called on a snapshot with open readers.
    #[error("readers not closed")]
    ReadersNotClosed,
}
