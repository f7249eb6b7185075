//! Node orchestrator integrating all TriBFT subsystems
//!
//! A `TribftNode` owns one consensus engine, one transaction pool and one
//! lightweight-sync instance, and shares the process-wide shard registry
//! and reputation tracker. Handlers are synchronous and run to
//! completion; `run()` drives them from a tokio event loop (inbound
//! messages plus proposal/maintenance/decay/heartbeat timers), while
//! discrete-event simulations can call the same handlers directly.

use crate::config::NodeConfig;
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tribft_chain::{
    Block, BlockHeader, Clock, ConsensusPhase, NodeId, Proposal, ShardId, Transaction,
    TransactionPool, Vote, NO_SHARD,
};
use tribft_chain::sortition_hash;
use tribft_committee::NodeRole;
use tribft_consensus::{ConsensusEmitter, ConsensusMessage, HotStuffEngine};
use tribft_reputation::{LowRepVerifier, ReputationTracker, TrustTier};
use tribft_shard::{GeoCoord, RegionalShardManager};
use tribft_sync::LightweightSync;

/// Seconds before an unanswered verification round is dropped
const VERIFICATION_TIMEOUT_SECS: f64 = 10.0;

/// Best-effort broadcast transport. No delivery or ordering guarantees.
pub trait Transport: Send + Sync {
    fn broadcast(&self, payload: Vec<u8>);
    fn send_to(&self, node_id: &str, payload: Vec<u8>);
}

/// Position source for this node (GPS in vehicles, fixed for RSUs).
pub trait MobilityOracle: Send + Sync {
    fn location_of(&self, node_id: &str) -> GeoCoord;
}

/// Oracle for stationary nodes.
pub struct StaticLocation(pub GeoCoord);

impl MobilityOracle for StaticLocation {
    fn location_of(&self, _node_id: &str) -> GeoCoord {
        self.0
    }
}

/// In-process broadcast hub: the deployment seam where a network
/// transport would plug in. Every registered peer receives every
/// broadcast payload, including the sender (votes rely on loopback).
#[derive(Default)]
pub struct LocalHub {
    peers: Mutex<HashMap<NodeId, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join the hub; the returned receiver yields every payload addressed
    /// to this peer.
    pub fn register(&self, node_id: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().insert(node_id.to_string(), tx);
        rx
    }
}

impl Transport for LocalHub {
    fn broadcast(&self, payload: Vec<u8>) {
        for sender in self.peers.lock().values() {
            let _ = sender.send(payload.clone());
        }
    }

    fn send_to(&self, node_id: &str, payload: Vec<u8>) {
        if let Some(sender) = self.peers.lock().get(node_id) {
            let _ = sender.send(payload);
        }
    }
}

/// Engine-to-network glue: protocol events become broadcast messages,
/// commits are queued for the node loop (they fan out into reputation,
/// shard registry and sync).
struct TransportEmitter {
    transport: Arc<dyn Transport>,
    commit_tx: mpsc::UnboundedSender<Block>,
}

impl TransportEmitter {
    fn send(&self, message: &ConsensusMessage) {
        match bincode::serialize(message) {
            Ok(payload) => self.transport.broadcast(payload),
            Err(err) => error!(%err, "failed to encode consensus message"),
        }
    }
}

impl ConsensusEmitter for TransportEmitter {
    fn on_proposal(&self, proposal: &Proposal) {
        self.send(&ConsensusMessage::Proposal(proposal.clone()));
    }

    fn on_vote(&self, vote: &Vote) {
        self.send(&ConsensusMessage::Vote(vote.clone()));
    }

    fn on_phase_advance(&self, proposal_id: &str, from: ConsensusPhase, to: ConsensusPhase) {
        self.send(&ConsensusMessage::PhaseAdvance {
            proposal_id: proposal_id.to_string(),
            from,
            to,
        });
    }

    fn on_commit(&self, block: &Block) {
        let _ = self.commit_tx.send(block.clone());
    }
}

pub struct TribftNode {
    node_id: NodeId,
    config: NodeConfig,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
    mobility: Arc<dyn MobilityOracle>,

    shards: Arc<RegionalShardManager>,
    reputation: ReputationTracker,
    engine: HotStuffEngine,
    sync: LightweightSync,
    pool: TransactionPool,

    /// Cross-verification of reports from candidate-tier senders,
    /// coordinated by the shard leader
    verifier: LowRepVerifier,
    /// Transactions held back until their verification completes
    held: HashMap<String, Transaction>,

    shard_id: ShardId,
    known_leader: Option<NodeId>,

    inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    commit_rx: mpsc::UnboundedReceiver<Block>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl TribftNode {
    pub fn new(
        config: NodeConfig,
        shards: Arc<RegionalShardManager>,
        transport: Arc<dyn Transport>,
        mobility: Arc<dyn MobilityOracle>,
        inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let node_id = config.node.id.clone();

        let location = mobility.location_of(&node_id);
        let shard_id = shards.add_node(&node_id, location, config.reputation.initial_score);
        if config.node.is_rsu {
            shards.register_rsu(&node_id);
        }

        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        let emitter = Arc::new(TransportEmitter {
            transport: transport.clone(),
            commit_tx,
        });

        let mut engine = HotStuffEngine::new(
            config.consensus_config(shard_id),
            emitter,
            clock.clone(),
        );
        // Until the first epoch election the whole shard votes.
        let basis = shards
            .shard_info(shard_id)
            .map(|s| s.member_count())
            .unwrap_or(0);
        engine.set_committee_size(basis);

        let sync = LightweightSync::new(shards.role_of(&node_id));
        let reputation = shards.reputation().clone();
        let known_leader = shards.leader_of(shard_id);
        let pool = TransactionPool::new(config.pool.max_tx_pool_size);
        let verifier = LowRepVerifier::new(clock.clone());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        info!(node = %node_id, shard = shard_id, rsu = config.node.is_rsu, "node initialized");
        Ok(Self {
            node_id,
            config,
            clock,
            transport,
            mobility,
            shards,
            reputation,
            engine,
            sync,
            pool,
            verifier,
            held: HashMap::new(),
            shard_id,
            known_leader,
            inbound_rx,
            commit_rx,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn engine(&self) -> &HotStuffEngine {
        &self.engine
    }

    pub fn sync(&self) -> &LightweightSync {
        &self.sync
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_shard_leader(&self) -> bool {
        self.shards.is_leader(&self.node_id, self.shard_id)
    }

    /// Handle for requesting a graceful shutdown of `run()`.
    pub fn shutdown_handle(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Drive the node until shutdown. Timer cadences come from the
    /// configuration; all real work happens in the synchronous handlers
    /// below, one event at a time.
    pub async fn run(&mut self) -> Result<()> {
        let mut propose_timer =
            interval(Duration::from_secs_f64(self.config.consensus.block_interval_secs));
        let mut maintenance_timer = interval(Duration::from_secs_f64(
            self.config.maintenance.shard_maintenance_interval_secs,
        ));
        let mut decay_timer =
            interval(Duration::from_secs_f64(self.config.reputation.decay_interval_secs));
        let mut heartbeat_timer = interval(Duration::from_secs_f64(
            self.config.maintenance.heartbeat_interval_secs,
        ));

        info!(node = %self.node_id, "node event loop started");
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!(node = %self.node_id, "shutdown requested");
                    break;
                }
                payload = self.inbound_rx.recv() => {
                    match payload {
                        Some(payload) => self.handle_payload(&payload),
                        None => break,
                    }
                }
                block = self.commit_rx.recv() => {
                    if let Some(block) = block {
                        self.handle_commit(block);
                    }
                }
                _ = propose_timer.tick() => self.on_propose_timer(),
                _ = maintenance_timer.tick() => self.on_maintenance_timer(),
                _ = decay_timer.tick() => self.on_decay_timer(),
                _ = heartbeat_timer.tick() => self.refresh_view(),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Message handling
    // ------------------------------------------------------------------

    /// Decode and dispatch one transport payload.
    pub fn handle_payload(&mut self, payload: &[u8]) {
        match bincode::deserialize::<ConsensusMessage>(payload) {
            Ok(message) => self.handle_message(message),
            Err(err) => warn!(node = %self.node_id, %err, "undecodable payload dropped"),
        }
    }

    fn handle_message(&mut self, message: ConsensusMessage) {
        match message {
            ConsensusMessage::Proposal(proposal) => {
                if proposal.shard_id == self.shard_id {
                    self.engine.handle_proposal(&proposal);
                }
            }
            ConsensusMessage::Vote(vote) => self.engine.handle_vote(&vote),
            ConsensusMessage::PhaseAdvance {
                proposal_id, to, ..
            } => self.engine.handle_phase_advance(&proposal_id, to),
            ConsensusMessage::Submit(tx) => self.handle_submit(tx),
            ConsensusMessage::VerificationAssign {
                event_id,
                tx,
                verifiers,
            } => self.handle_verification_assign(&event_id, &tx, &verifiers),
            ConsensusMessage::VerificationVote {
                event_id,
                verifier_id,
                confirm,
            } => self.handle_verification_vote(&event_id, &verifier_id, confirm),
            ConsensusMessage::HeaderAnnounce(header) => {
                let height = header.height;
                if self.sync.sync_header(header) && !self.votes_in_committee() {
                    // Non-voting nodes track the chain through headers.
                    self.engine.sync_to_height(height);
                }
            }
            ConsensusMessage::BlockRequest { request_id, height } => {
                if let Some(block) = self.sync.full_block(height) {
                    debug!(node = %self.node_id, %request_id, height, "serving full block");
                    self.broadcast(&ConsensusMessage::BlockResponse(block.clone()));
                }
            }
            ConsensusMessage::BlockResponse(block) => {
                self.sync.receive_full_block(block);
            }
        }
    }

    /// Gossiped transaction: pool it directly unless the sender sits in
    /// the candidate tier, in which case the shard leader coordinates a
    /// cross-verification round before admission.
    fn handle_submit(&mut self, tx: Transaction) {
        if self.reputation.tier_of(&tx.sender) == TrustTier::Candidate {
            if self.is_shard_leader() {
                self.start_verification(tx);
            }
            return;
        }
        if self.pool.push(tx) {
            debug!(node = %self.node_id, pooled = self.pool.len(), "transaction pooled");
        }
    }

    fn start_verification(&mut self, tx: Transaction) {
        let reporter_score = self.reputation.score(&tx.sender);
        let event_id =
            self.verifier
                .submit_event(&tx.sender, "TRANSACTION", &tx.id, reporter_score);
        let trusted = self.reputation.trusted_nodes();
        let seed = sortition_hash(&event_id, 0);
        let verifiers = self.verifier.assign_verifiers(&event_id, &trusted, seed);

        if verifiers.is_empty() {
            // Nobody trusted enough to verify; accept rather than stall.
            debug!(node = %self.node_id, tx = %tx.id, "no verifiers available, pooling directly");
            self.pool.push(tx);
            return;
        }

        info!(
            node = %self.node_id,
            tx = %tx.id,
            reporter = %tx.sender,
            verifiers = verifiers.len(),
            "low-reputation report under cross-verification"
        );
        self.held.insert(event_id.clone(), tx.clone());
        self.broadcast(&ConsensusMessage::VerificationAssign {
            event_id,
            tx,
            verifiers,
        });
    }

    fn handle_verification_assign(&mut self, event_id: &str, tx: &Transaction, verifiers: &[String]) {
        if !verifiers.iter().any(|v| v == &self.node_id) {
            return;
        }
        // Verifier policy: re-check the report independently. With opaque
        // payloads the check is structural.
        let confirm = tx.is_well_formed();
        debug!(node = %self.node_id, event = event_id, confirm, "verifying report");
        self.broadcast(&ConsensusMessage::VerificationVote {
            event_id: event_id.to_string(),
            verifier_id: self.node_id.clone(),
            confirm,
        });
    }

    fn handle_verification_vote(&mut self, event_id: &str, verifier_id: &str, confirm: bool) {
        // Only the coordinating leader knows the event; everyone else
        // drops the verdict.
        match self.verifier.submit_verification(event_id, verifier_id, confirm) {
            Ok(Some(genuine)) => {
                let Some(tx) = self.held.remove(event_id) else {
                    return;
                };
                if genuine {
                    info!(node = %self.node_id, tx = %tx.id, "verified report admitted");
                    self.pool.push(tx);
                } else {
                    warn!(node = %self.node_id, reporter = %tx.sender, "false report, penalizing");
                    self.reputation.penalize_malicious(&tx.sender);
                }
            }
            Ok(None) => {}
            Err(_) => debug!(node = %self.node_id, event = event_id, "verdict for unknown event"),
        }
    }

    /// Drain commit notifications from the engine.
    pub fn process_commits(&mut self) {
        while let Ok(block) = self.commit_rx.try_recv() {
            self.handle_commit(block);
        }
    }

    /// Commit fan-out: local header chain and pool cleanup on every
    /// member; registry epoch counter, reputation credits and the shard
    /// header announcement are reported once, by the block's proposer.
    fn handle_commit(&mut self, block: Block) {
        let header = BlockHeader::from_block(&block);
        self.sync.sync_header(header.clone());

        let committed: Vec<String> = block.transactions.iter().map(|t| t.id.clone()).collect();
        self.pool.remove_committed(&committed);

        if block.proposer != self.node_id {
            return;
        }

        self.reputation.update_for_proposal(&block.proposer, true);
        for vote in &block.qc.votes {
            self.reputation.update_for_vote(&vote.voter_id, true);
        }

        let elections = self.shards.record_commit(&block);
        for (shard_id, committee) in &elections {
            if *shard_id == self.shard_id {
                self.engine.set_committee_size(committee.primary.len());
                self.sync.set_role(self.shards.role_of(&self.node_id));
            }
        }

        self.broadcast(&ConsensusMessage::HeaderAnnounce(header));
    }

    // ------------------------------------------------------------------
    // Application surface
    // ------------------------------------------------------------------

    /// Submit a transaction originating at this node; it is pooled
    /// locally and gossiped to the shard.
    pub fn submit_transaction(&mut self, tx: Transaction) -> bool {
        if !self.pool.push(tx.clone()) {
            return false;
        }
        self.broadcast(&ConsensusMessage::Submit(tx));
        true
    }

    /// Leader path: propose a block when enough transactions are pooled.
    /// Returns true when a proposal went out.
    pub fn try_propose(&mut self) -> bool {
        if !self.is_shard_leader() {
            return false;
        }
        if self.pool.len() < self.config.consensus.batch_size {
            return false;
        }
        let batch = self.pool.drain(self.config.consensus.batch_size);
        self.engine.propose_block(batch)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn on_propose_timer(&mut self) {
        if self.engine.tick() {
            // The abandoned round penalizes its leader.
            if let Some(leader) = self.known_leader.clone() {
                if leader != self.node_id {
                    self.reputation.penalize_timeout(&leader);
                }
            }
        }
        self.try_propose();
    }

    fn on_maintenance_timer(&mut self) {
        let location = self.mobility.location_of(&self.node_id);
        self.shards.update_location(&self.node_id, location);

        if self.config.node.registry_maintainer {
            self.shards.rebalance();
        }

        self.sync.cleanup(self.config.maintenance.keep_last_blocks);
        self.verifier.cleanup_expired(VERIFICATION_TIMEOUT_SECS);
        let verifier = &self.verifier;
        self.held.retain(|event_id, _| verifier.has_event(event_id));
        self.refresh_view();
    }

    fn on_decay_timer(&mut self) {
        if self.config.node.registry_maintainer {
            self.reputation.apply_decay();
        }
    }

    /// Converge this node's view of the shared registry: shard
    /// membership, committee size, role and leadership.
    pub fn refresh_view(&mut self) {
        let current = self.shards.shard_of(&self.node_id);
        if current != self.shard_id && current != NO_SHARD {
            info!(node = %self.node_id, from = self.shard_id, to = current, "moved shards");
            self.shard_id = current;
            self.engine.set_shard(current);
            self.known_leader = None;
        }

        match self.shards.committee_of(self.shard_id) {
            Some(committee) if !committee.primary.is_empty() => {
                self.engine.set_committee_size(committee.primary.len());
            }
            _ => {
                let basis = self
                    .shards
                    .shard_info(self.shard_id)
                    .map(|s| s.member_count())
                    .unwrap_or(0);
                self.engine.set_committee_size(basis);
            }
        }
        self.sync.set_role(self.shards.role_of(&self.node_id));

        let leader = self.shards.leader_of(self.shard_id);
        if leader != self.known_leader {
            if let Some(new_leader) = &leader {
                debug!(node = %self.node_id, %new_leader, "observed leader change");
                self.engine.handle_leader_change(new_leader);
            }
            self.known_leader = leader;
        }
    }

    fn votes_in_committee(&self) -> bool {
        matches!(
            self.shards.role_of(&self.node_id),
            NodeRole::Primary | NodeRole::Rsu
        )
    }

    fn broadcast(&self, message: &ConsensusMessage) {
        match bincode::serialize(message) {
            Ok(payload) => self.transport.broadcast(payload),
            Err(err) => error!(node = %self.node_id, %err, "failed to encode message"),
        }
    }
}
