//! Lightweight sync for TriBFT
//!
//! Ordinary and redundant nodes do not vote, but they stay consistent by
//! tracking the chain of committed block headers. A header is ~200 bytes
//! against ~10 KB for a full block, so storage stays small; when a node
//! actually needs a block's transactions it requests the full block on
//! demand and verifies it (block hash, Merkle root, transaction count)
//! against the header it already trusts. Individual transactions can be
//! proven with a Merkle path without fetching anything else.

pub mod sync;

pub use sync::{BlockFetcher, LightweightSync, StorageStats};
