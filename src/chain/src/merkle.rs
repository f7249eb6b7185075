//! Merkle tree over transaction ids
//!
//! Ordinary nodes keep only block headers; a `MerkleProof` lets them verify
//! a single transaction's inclusion against the header's root without
//! downloading the full block. Leaves are SHA-256 of the transaction id,
//! parents SHA-256 of the concatenated child hashes, with an odd trailing
//! node paired with itself.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Root of the empty tree (no transactions)
const EMPTY_ROOT: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Inclusion proof for one leaf: sibling hashes from leaf level to root.
///
/// `directions[i]` is true when `siblings[i]` sits on the LEFT of the
/// running hash at level `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub siblings: Vec<String>,
    pub directions: Vec<bool>,
}

/// Hash of a single transaction id (tree leaf).
pub fn leaf_hash(tx_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tx_id.as_bytes());
    hex::encode(hasher.finalize())
}

fn node_hash(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

fn next_level(level: &[String]) -> Vec<String> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = if pair.len() > 1 { &pair[1] } else { left };
            node_hash(left, right)
        })
        .collect()
}

/// Merkle root over the given transaction ids.
pub fn merkle_root(tx_ids: &[String]) -> String {
    if tx_ids.is_empty() {
        return EMPTY_ROOT.to_string();
    }

    let mut level: Vec<String> = tx_ids.iter().map(|id| leaf_hash(id)).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.remove(0)
}

/// Build the inclusion proof for the leaf at `index`.
pub fn generate_proof(tx_ids: &[String], index: usize) -> Option<MerkleProof> {
    if index >= tx_ids.len() {
        return None;
    }

    let mut proof = MerkleProof::default();
    let mut level: Vec<String> = tx_ids.iter().map(|id| leaf_hash(id)).collect();
    let mut idx = index;

    while level.len() > 1 {
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        let sibling = if sibling_idx < level.len() {
            level[sibling_idx].clone()
        } else {
            // Odd trailing node is paired with itself
            level[idx].clone()
        };
        proof.siblings.push(sibling);
        proof.directions.push(idx % 2 == 1);

        level = next_level(&level);
        idx /= 2;
    }

    Some(proof)
}

/// Recompute the root from a leaf hash and its proof, comparing to `root`.
pub fn verify_proof(leaf: &str, proof: &MerkleProof, root: &str) -> bool {
    if proof.siblings.len() != proof.directions.len() {
        return false;
    }

    let mut current = leaf.to_string();
    for (sibling, sibling_is_left) in proof.siblings.iter().zip(&proof.directions) {
        current = if *sibling_is_left {
            node_hash(sibling, &current)
        } else {
            node_hash(&current, sibling)
        };
    }
    current == root
}
