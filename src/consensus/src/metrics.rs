//! Prometheus metrics for consensus

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Consensus metrics exposed to Prometheus.
pub struct ConsensusMetrics {
    /// Proposals published by this node
    pub proposals_sent: IntCounter,

    /// Proposals rejected during validation
    pub proposals_rejected: IntCounter,

    /// Votes emitted by this node
    pub votes_sent: IntCounter,

    /// Votes accepted into the round log
    pub votes_received: IntCounter,

    /// Blocks committed
    pub blocks_committed: IntCounter,

    /// Rounds abandoned by timeout
    pub timeouts: IntCounter,

    /// View changes observed
    pub view_changes: IntCounter,

    /// Current committed height
    pub current_height: IntGauge,

    /// Current view number
    pub current_view: IntGauge,

    /// Proposal-to-commit latency in seconds
    pub commit_latency: Histogram,

    registry: Arc<Registry>,
}

impl ConsensusMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let proposals_sent = IntCounter::with_opts(
            Opts::new("consensus_proposals_sent_total", "Proposals published").namespace("tribft"),
        )
        .unwrap();
        registry.register(Box::new(proposals_sent.clone())).unwrap();

        let proposals_rejected = IntCounter::with_opts(
            Opts::new(
                "consensus_proposals_rejected_total",
                "Proposals rejected during validation",
            )
            .namespace("tribft"),
        )
        .unwrap();
        registry
            .register(Box::new(proposals_rejected.clone()))
            .unwrap();

        let votes_sent = IntCounter::with_opts(
            Opts::new("consensus_votes_sent_total", "Votes emitted").namespace("tribft"),
        )
        .unwrap();
        registry.register(Box::new(votes_sent.clone())).unwrap();

        let votes_received = IntCounter::with_opts(
            Opts::new(
                "consensus_votes_received_total",
                "Votes accepted into the round log",
            )
            .namespace("tribft"),
        )
        .unwrap();
        registry.register(Box::new(votes_received.clone())).unwrap();

        let blocks_committed = IntCounter::with_opts(
            Opts::new("consensus_blocks_committed_total", "Blocks committed").namespace("tribft"),
        )
        .unwrap();
        registry
            .register(Box::new(blocks_committed.clone()))
            .unwrap();

        let timeouts = IntCounter::with_opts(
            Opts::new("consensus_timeouts_total", "Rounds abandoned by timeout")
                .namespace("tribft"),
        )
        .unwrap();
        registry.register(Box::new(timeouts.clone())).unwrap();

        let view_changes = IntCounter::with_opts(
            Opts::new("consensus_view_changes_total", "View changes observed").namespace("tribft"),
        )
        .unwrap();
        registry.register(Box::new(view_changes.clone())).unwrap();

        let current_height = IntGauge::with_opts(
            Opts::new("consensus_current_height", "Current committed height").namespace("tribft"),
        )
        .unwrap();
        registry.register(Box::new(current_height.clone())).unwrap();

        let current_view = IntGauge::with_opts(
            Opts::new("consensus_current_view", "Current view number").namespace("tribft"),
        )
        .unwrap();
        registry.register(Box::new(current_view.clone())).unwrap();

        let commit_latency = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_commit_latency_seconds",
                "Proposal-to-commit latency",
            )
            .namespace("tribft")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )
        .unwrap();
        registry.register(Box::new(commit_latency.clone())).unwrap();

        Self {
            proposals_sent,
            proposals_rejected,
            votes_sent,
            votes_received,
            blocks_committed,
            timeouts,
            view_changes,
            current_height,
            current_view,
            commit_latency,
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for ConsensusMetrics {
    fn default() -> Self {
        Self::new()
    }
}
