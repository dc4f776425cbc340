//! Shared test utilities: tracing bootstrap and tree verification.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ... test code ...
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: filter directives (e.g. `tbtree=trace`)
//! - `TBTREE_LOG_DIR`: log directory (default: `logs/`)
//! - `TBTREE_LOG_CONSOLE`: set to "0" to disable console output
//!
//! Logs are written to `logs/tbtree.json` in NDJSON format.

#![allow(dead_code)]

use std::env;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Once};

use tbtree::{Node, Snapshot};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Ensures tracing is only initialized once across all tests.
static INIT: Once = Once::new();

/// Initialize the tracing subscriber with console and JSON file output.
///
/// Safe to call multiple times - only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{default_level}")))
}

fn setup_tracing() {
    let log_dir = env::var("TBTREE_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from);
    let console_enabled = env::var("TBTREE_LOG_CONSOLE").map_or(true, |v| v != "0");

    fs::create_dir_all(&log_dir).expect("failed to create log directory");

    let file: File =
        File::create(log_dir.join("tbtree.json")).expect("failed to create log file");

    let console_layer = console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_target(true)
            .compact()
            .with_filter(make_filter(Level::INFO))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Arc::new(file))
        .with_thread_ids(true)
        .with_target(true)
        .json()
        .with_filter(make_filter(Level::INFO));

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// =============================================================================
// Tree verification helpers
// =============================================================================

/// Verify the structural invariants of a captured tree version:
/// child references agree with their children, keys ascend, timestamp
/// and size aggregates are consistent, and no node exceeds its byte
/// budget.
pub fn verify_tree(root: &Node) {
    root.debug_assert_invariants();
    verify_budget(root);
}

fn verify_budget(node: &Node) {
    assert!(
        node.csize() <= node.max_size(),
        "node csize {} exceeds its budget {}",
        node.csize(),
        node.max_size()
    );

    if let Some(inner) = node.as_inner() {
        for child_ref in inner.children() {
            if let Some(child) = child_ref.resident() {
                verify_budget(&child);
            }
        }
    }
}

/// Structural fingerprint of a captured tree version: per node its
/// aggregates, per leaf its full entry content. Two fingerprints are
/// equal iff the versions are structurally identical.
pub fn fingerprint(node: &Node) -> Vec<String> {
    let mut out = Vec::new();
    fingerprint_into(node, 0, &mut out);
    out
}

fn fingerprint_into(node: &Node, depth: usize, out: &mut Vec<String>) {
    out.push(format!(
        "depth={depth} leaf={} cts={} csize={}",
        node.is_leaf(),
        node.ts(),
        node.csize()
    ));

    if let Some(leaf) = node.as_leaf() {
        for entry in leaf.entries() {
            out.push(format!(
                "  entry key={:?} ts={} prev_ts={} value={:?}",
                entry.key(),
                entry.ts(),
                entry.prev_ts(),
                entry.value()
            ));
        }
        return;
    }

    if let Some(inner) = node.as_inner() {
        for child_ref in inner.children() {
            out.push(format!(
                "  ref max_key={:?} cts={}",
                child_ref.max_key(),
                child_ref.cts()
            ));

            if let Some(child) = child_ref.resident() {
                fingerprint_into(&child, depth + 1, out);
            }
        }
    }
}

/// Collect `(key, value, ts)` for every entry reachable from `root`,
/// left to right.
pub fn collect_entries(root: &Node) -> Vec<(Vec<u8>, Vec<u8>, u64)> {
    let mut out = Vec::new();
    collect_into(root, &mut out);
    out
}

fn collect_into(node: &Node, out: &mut Vec<(Vec<u8>, Vec<u8>, u64)>) {
    if let Some(leaf) = node.as_leaf() {
        for entry in leaf.entries() {
            out.push((entry.key().to_vec(), entry.value().to_vec(), entry.ts()));
        }
        return;
    }

    if let Some(inner) = node.as_inner() {
        for child_ref in inner.children() {
            if let Some(child) = child_ref.resident() {
                collect_into(&child, out);
            }
        }
    }
}

/// Drain a snapshot through an ascending full-range reader.
pub fn scan_all(snapshot: &Snapshot) -> Vec<(Vec<u8>, Vec<u8>, u64)> {
    let mut reader = snapshot
        .reader(tbtree::ReaderSpec::default())
        .expect("reader");

    let mut out = Vec::new();
    while let Some(entry) = reader.read().expect("read") {
        out.push((entry.key().to_vec(), entry.value().to_vec(), entry.ts()));
    }

    reader.close().expect("close reader");
    out
}
