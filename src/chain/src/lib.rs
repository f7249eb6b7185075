//! Core data model for TriBFT
//!
//! This crate holds the types shared by every other TriBFT crate:
//! transactions, consensus proposals/votes/certificates, blocks and block
//! headers, the Merkle tree used for lightweight transaction proofs, the
//! bounded transaction pool, and the clock abstraction that drives all
//! timestamps.
//!
//! Cryptographic signatures are out of scope for this system; "signature"
//! fields are opaque strings and hashes are plain SHA-256.

pub mod merkle;
pub mod pool;
pub mod time;
pub mod types;

pub use merkle::{merkle_root, MerkleProof};
pub use pool::TransactionPool;
pub use time::{Clock, SimClock, SystemClock};
pub use types::{
    Block, BlockHeader, ConsensusPhase, Proposal, QuorumCertificate, Transaction, Vote,
};

use sha2::{Digest, Sha256};

/// Node identifier in the network (opaque, e.g. "vehicle[3]" or "rsu[0]")
pub type NodeId = String;

/// Shard identifier; `NO_SHARD` means the node has no home shard
pub type ShardId = i32;

/// Sentinel for "not assigned to any shard"
pub const NO_SHARD: ShardId = -1;

/// Committed block height (monotonically non-decreasing)
pub type BlockHeight = u64;

/// Consensus view number (monotonically non-decreasing)
pub type ViewNumber = u64;

/// Simulation time in seconds
pub type Timestamp = f64;

/// SHA-256 over the concatenation of `parts`, hex-encoded.
///
/// Each part is prefixed with its length to keep the encoding unambiguous
/// under concatenation.
pub fn digest_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Stable 64-bit hash used for sortition scores and election seeds.
///
/// Derived from the first 8 bytes of a SHA-256 digest so that every
/// observer computes identical scores for identical inputs.
pub fn sortition_hash(input: &str, seed: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.update(seed.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
