//! Header chain and on-demand full-block management

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tribft_chain::merkle::{self, MerkleProof};
use tribft_chain::{Block, BlockHeader, BlockHeight};
use tribft_committee::NodeRole;
use uuid::Uuid;

/// Estimated bytes per stored header
const HEADER_BYTES: usize = 200;
/// Estimated bytes per stored transaction
const TX_BYTES: usize = 500;

/// Capability for issuing full-block fetches; implemented by the node
/// harness, which turns the request into a network message.
pub trait BlockFetcher: Send + Sync {
    fn request_block(&self, request_id: &str, height: BlockHeight);
}

/// Storage footprint summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStats {
    pub header_count: usize,
    pub full_block_count: usize,
    pub header_bytes: usize,
    pub full_block_bytes: usize,
    /// Headers-only share of total storage; 1.0 when nothing is stored
    pub compression_ratio: f64,
}

pub struct LightweightSync {
    role: NodeRole,
    headers: BTreeMap<BlockHeight, BlockHeader>,
    full_blocks: BTreeMap<BlockHeight, Block>,
    pending_requests: HashMap<String, BlockHeight>,
    latest_height: BlockHeight,
    fetcher: Option<Arc<dyn BlockFetcher>>,
}

impl LightweightSync {
    pub fn new(role: NodeRole) -> Self {
        Self {
            role,
            headers: BTreeMap::new(),
            full_blocks: BTreeMap::new(),
            pending_requests: HashMap::new(),
            latest_height: 0,
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn BlockFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn set_role(&mut self, role: NodeRole) {
        self.role = role;
    }

    // ------------------------------------------------------------------
    // Header chain
    // ------------------------------------------------------------------

    /// Accept a committed header iff it chains on what we know.
    ///
    /// Genesis (height 0) and the very first header bypass chain checks;
    /// afterwards the parent must be present with a matching hash.
    pub fn sync_header(&mut self, header: BlockHeader) -> bool {
        if !self.validate_header_chain(&header) {
            warn!(height = header.height, "header failed chain validation");
            return false;
        }

        let height = header.height;
        self.headers.insert(height, header);
        if height > self.latest_height {
            self.latest_height = height;
        }
        debug!(height, latest = self.latest_height, "header synced");
        true
    }

    pub fn header(&self, height: BlockHeight) -> Option<&BlockHeader> {
        self.headers.get(&height)
    }

    pub fn has_header(&self, height: BlockHeight) -> bool {
        self.headers.contains_key(&height)
    }

    pub fn latest_height(&self) -> BlockHeight {
        self.latest_height
    }

    fn validate_header_chain(&self, header: &BlockHeader) -> bool {
        if header.height == 0 || self.headers.is_empty() {
            return true;
        }
        let Some(prev) = self.headers.get(&(header.height - 1)) else {
            warn!(height = header.height, "previous header missing");
            return false;
        };
        if header.previous_hash != prev.block_hash {
            warn!(height = header.height, "previous hash mismatch");
            return false;
        }
        header.height == prev.height + 1
    }

    // ------------------------------------------------------------------
    // Full blocks (on demand)
    // ------------------------------------------------------------------

    /// Ask the network for a full block. Returns the request id used to
    /// correlate the response.
    pub fn request_full_block(&mut self, height: BlockHeight) -> String {
        let request_id = format!("REQ_{height}_{}", Uuid::new_v4());
        self.pending_requests.insert(request_id.clone(), height);
        debug!(height, request = %request_id, "requesting full block");

        if let Some(fetcher) = &self.fetcher {
            fetcher.request_block(&request_id, height);
        }
        request_id
    }

    /// Verify a delivered block against its trusted header and store it.
    ///
    /// Requires the header to be known; checks block hash, recomputed
    /// Merkle root and transaction count before accepting.
    pub fn receive_full_block(&mut self, block: Block) -> bool {
        let Some(header) = self.headers.get(&block.height) else {
            warn!(height = block.height, "no header for delivered block");
            return false;
        };

        if header.block_hash != block.block_hash {
            warn!(height = block.height, "block hash mismatch");
            return false;
        }

        let tx_ids: Vec<String> = block.transactions.iter().map(|t| t.id.clone()).collect();
        if header.merkle_root != merkle::merkle_root(&tx_ids) {
            warn!(height = block.height, "merkle root mismatch");
            return false;
        }

        if header.tx_count != block.transactions.len() {
            warn!(height = block.height, "transaction count mismatch");
            return false;
        }

        self.pending_requests.retain(|_, h| *h != block.height);
        info!(
            height = block.height,
            txs = block.transactions.len(),
            "full block verified and stored"
        );
        self.full_blocks.insert(block.height, block);
        true
    }

    pub fn has_full_block(&self, height: BlockHeight) -> bool {
        self.full_blocks.contains_key(&height)
    }

    pub fn full_block(&self, height: BlockHeight) -> Option<&Block> {
        self.full_blocks.get(&height)
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending_requests.len()
    }

    // ------------------------------------------------------------------
    // Transaction proofs
    // ------------------------------------------------------------------

    /// Prove a transaction's inclusion at `height` from its leaf hash and
    /// a Merkle path, against the stored header's root.
    pub fn verify_transaction(
        &self,
        height: BlockHeight,
        tx_hash: &str,
        proof: &MerkleProof,
    ) -> bool {
        let Some(header) = self.headers.get(&height) else {
            return false;
        };
        merkle::verify_proof(tx_hash, proof, &header.merkle_root)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drop headers and blocks older than the last `keep_last_n` heights.
    pub fn cleanup(&mut self, keep_last_n: u64) {
        if self.latest_height <= keep_last_n {
            return;
        }
        let cutoff = self.latest_height - keep_last_n;
        self.headers.retain(|height, _| *height >= cutoff);
        self.full_blocks.retain(|height, _| *height >= cutoff);
        debug!(cutoff, kept = keep_last_n, "pruned old sync state");
    }

    pub fn storage_stats(&self) -> StorageStats {
        let header_bytes = self.headers.len() * HEADER_BYTES;
        let full_block_bytes: usize = self
            .full_blocks
            .values()
            .map(|b| b.transactions.len() * TX_BYTES)
            .sum();
        let total = header_bytes + full_block_bytes;

        StorageStats {
            header_count: self.headers.len(),
            full_block_count: self.full_blocks.len(),
            header_bytes,
            full_block_bytes,
            compression_ratio: if total == 0 {
                1.0
            } else {
                header_bytes as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tribft_chain::{QuorumCertificate, Transaction};

    fn block(height: BlockHeight, previous_hash: &str, tx_ids: &[&str]) -> Block {
        Block {
            height,
            block_hash: format!("hash-{height}"),
            previous_hash: previous_hash.to_string(),
            shard_id: 0,
            transactions: tx_ids
                .iter()
                .map(|id| Transaction::new(*id, "sender", 0.0))
                .collect(),
            qc: QuorumCertificate::default(),
            timestamp: height as f64,
            proposer: "leader".into(),
        }
    }

    fn header(height: BlockHeight, previous_hash: &str, tx_ids: &[&str]) -> BlockHeader {
        BlockHeader::from_block(&block(height, previous_hash, tx_ids))
    }

    #[test]
    fn first_header_bypasses_chain_checks() {
        let mut sync = LightweightSync::new(NodeRole::Ordinary);
        assert!(sync.sync_header(header(3, "whatever", &["t1"])));
        assert_eq!(sync.latest_height(), 3);
    }

    #[test]
    fn headers_chain_on_previous_hash() {
        let mut sync = LightweightSync::new(NodeRole::Ordinary);
        assert!(sync.sync_header(header(1, "", &["t1"])));
        assert!(sync.sync_header(header(2, "hash-1", &["t2"])));

        // Wrong previous hash breaks the chain.
        assert!(!sync.sync_header(header(3, "bogus", &["t3"])));
        // A gap breaks it too.
        assert!(!sync.sync_header(header(5, "hash-2", &["t5"])));
        assert_eq!(sync.latest_height(), 2);
    }

    #[test]
    fn full_block_is_verified_against_header() {
        let mut sync = LightweightSync::new(NodeRole::Ordinary);
        sync.sync_header(header(1, "", &["t1", "t2"]));

        // Unknown height rejected.
        assert!(!sync.receive_full_block(block(9, "", &["t1"])));

        // Tampered transaction set rejected (merkle root mismatch).
        assert!(!sync.receive_full_block(block(1, "", &["t1", "tX"])));

        // Wrong hash rejected.
        let mut wrong_hash = block(1, "", &["t1", "t2"]);
        wrong_hash.block_hash = "forged".into();
        assert!(!sync.receive_full_block(wrong_hash));

        // The genuine block verifies and is stored.
        assert!(sync.receive_full_block(block(1, "", &["t1", "t2"])));
        assert!(sync.has_full_block(1));
        assert_eq!(sync.full_block(1).unwrap().transactions.len(), 2);
    }

    #[test]
    fn request_ids_are_unique_and_resolved_by_delivery() {
        let mut sync = LightweightSync::new(NodeRole::Ordinary);
        sync.sync_header(header(1, "", &["t1"]));

        let a = sync.request_full_block(1);
        let b = sync.request_full_block(1);
        assert_ne!(a, b);
        assert_eq!(sync.pending_request_count(), 2);

        assert!(sync.receive_full_block(block(1, "", &["t1"])));
        assert_eq!(sync.pending_request_count(), 0);
    }

    #[test]
    fn fetcher_is_invoked_with_request_details() {
        struct Recorder(Mutex<Vec<(String, BlockHeight)>>);
        impl BlockFetcher for Recorder {
            fn request_block(&self, request_id: &str, height: BlockHeight) {
                self.0.lock().unwrap().push((request_id.to_string(), height));
            }
        }

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut sync = LightweightSync::new(NodeRole::Ordinary).with_fetcher(recorder.clone());

        let id = sync.request_full_block(4);
        let calls = recorder.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (id, 4));
    }

    #[test]
    fn merkle_proof_verifies_single_transaction() {
        let mut sync = LightweightSync::new(NodeRole::Ordinary);
        let tx_ids = ["t1", "t2", "t3", "t4", "t5"];
        sync.sync_header(header(1, "", &tx_ids));

        let ids: Vec<String> = tx_ids.iter().map(|s| s.to_string()).collect();
        let proof = merkle::generate_proof(&ids, 2).unwrap();
        assert!(sync.verify_transaction(1, &merkle::leaf_hash("t3"), &proof));

        // Proof does not transfer to another leaf.
        assert!(!sync.verify_transaction(1, &merkle::leaf_hash("t1"), &proof));
        // Unknown height fails closed.
        assert!(!sync.verify_transaction(2, &merkle::leaf_hash("t3"), &proof));
    }

    #[test]
    fn cleanup_keeps_only_recent_heights() {
        let mut sync = LightweightSync::new(NodeRole::Ordinary);
        let mut previous = String::new();
        for height in 1..=10 {
            let h = header(height, &previous, &["t"]);
            previous = h.block_hash.clone();
            assert!(sync.sync_header(h));
        }
        sync.receive_full_block(block(10, "hash-9", &["t"]));

        sync.cleanup(3);
        assert!(!sync.has_header(6));
        assert!(sync.has_header(7));
        assert!(sync.has_header(10));
        assert!(sync.has_full_block(10));
    }

    #[test]
    fn storage_stats_reflect_contents() {
        let mut sync = LightweightSync::new(NodeRole::Redundant);
        assert_eq!(sync.storage_stats().compression_ratio, 1.0);

        sync.sync_header(header(1, "", &["t1", "t2"]));
        sync.receive_full_block(block(1, "", &["t1", "t2"]));

        let stats = sync.storage_stats();
        assert_eq!(stats.header_count, 1);
        assert_eq!(stats.full_block_count, 1);
        assert_eq!(stats.header_bytes, 200);
        assert_eq!(stats.full_block_bytes, 1000);
        assert!(stats.compression_ratio < 1.0);
    }
}
