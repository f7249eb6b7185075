//! Bounded transaction pool
//!
//! FIFO pool with oldest-wins eviction at capacity and duplicate
//! suppression through a bounded seen-id set. Leaders drain batches from
//! the pool when the proposal timer fires.

use crate::types::Transaction;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// How many seen ids to remember per pooled transaction slot
const SEEN_FACTOR: usize = 10;

pub struct TransactionPool {
    capacity: usize,
    queue: VecDeque<Transaction>,
    /// Ids currently pooled or recently observed (dedup across gossip paths)
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
    evicted: u64,
}

impl TransactionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: VecDeque::with_capacity(capacity.max(1)),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            evicted: 0,
        }
    }

    /// Add a transaction. Returns false for malformed or already-seen ids.
    ///
    /// When the pool is full the oldest transaction is evicted.
    pub fn push(&mut self, tx: Transaction) -> bool {
        if !tx.is_well_formed() {
            debug!(tx_id = %tx.id, "rejecting malformed transaction");
            return false;
        }
        if !self.mark_seen(&tx.id) {
            return false;
        }

        if self.queue.len() >= self.capacity {
            if let Some(old) = self.queue.pop_front() {
                self.evicted += 1;
                debug!(evicted = %old.id, "transaction pool full, evicting oldest");
            }
        }
        self.queue.push_back(tx);
        true
    }

    /// Record an id as observed without pooling the transaction.
    /// Returns false if the id was already known.
    pub fn mark_seen(&mut self, tx_id: &str) -> bool {
        if !self.seen.insert(tx_id.to_string()) {
            return false;
        }
        self.seen_order.push_back(tx_id.to_string());

        let seen_cap = self.capacity * SEEN_FACTOR;
        while self.seen_order.len() > seen_cap {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }

    pub fn has_seen(&self, tx_id: &str) -> bool {
        self.seen.contains(tx_id)
    }

    /// Remove and return up to `max` transactions, oldest first.
    pub fn drain(&mut self, max: usize) -> Vec<Transaction> {
        let n = max.min(self.queue.len());
        self.queue.drain(..n).collect()
    }

    /// Drop pooled transactions whose ids are in `committed` (they made it
    /// into a block via another path).
    pub fn remove_committed(&mut self, committed: &[String]) {
        let ids: HashSet<&String> = committed.iter().collect();
        self.queue.retain(|tx| !ids.contains(&tx.id));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str) -> Transaction {
        Transaction::new(id, "sender", 0.0)
    }

    #[test]
    fn pool_accepts_and_drains_in_order() {
        let mut pool = TransactionPool::new(10);
        assert!(pool.push(tx("a")));
        assert!(pool.push(tx("b")));
        assert!(pool.push(tx("c")));

        let batch = pool.drain(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, "a");
        assert_eq!(batch[1].id, "b");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut pool = TransactionPool::new(10);
        assert!(pool.push(tx("a")));
        assert!(!pool.push(tx("a")));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn malformed_transactions_are_rejected() {
        let mut pool = TransactionPool::new(10);
        assert!(!pool.push(Transaction::new("", "sender", 0.0)));
        assert!(pool.is_empty());
    }

    #[test]
    fn full_pool_evicts_oldest() {
        let mut pool = TransactionPool::new(2);
        pool.push(tx("a"));
        pool.push(tx("b"));
        pool.push(tx("c"));

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.evicted(), 1);
        let batch = pool.drain(2);
        assert_eq!(batch[0].id, "b");
        assert_eq!(batch[1].id, "c");
    }

    #[test]
    fn seen_set_survives_drain() {
        let mut pool = TransactionPool::new(10);
        pool.push(tx("a"));
        pool.drain(1);
        assert!(!pool.push(tx("a")));
        assert!(pool.has_seen("a"));
    }

    #[test]
    fn committed_transactions_are_dropped() {
        let mut pool = TransactionPool::new(10);
        pool.push(tx("a"));
        pool.push(tx("b"));
        pool.remove_committed(&["a".to_string()]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.drain(1)[0].id, "b");
    }
}
