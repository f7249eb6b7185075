//! Prometheus metrics for the reputation system

use prometheus::{Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Gauges and counters exposed by the reputation tracker.
pub struct ReputationMetrics {
    /// Number of tracked nodes
    pub total_nodes: IntGauge,

    /// Nodes at or above the trusted threshold
    pub trusted_nodes: IntGauge,

    /// Mean final score across all nodes
    pub average_score: Gauge,

    /// Events recorded, by event label
    pub events_total: IntCounterVec,

    /// Decay sweeps applied
    pub decay_ticks: IntCounter,

    /// Cross-verification rounds completed
    pub verifications_completed: IntCounter,
}

impl ReputationMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let total_nodes = IntGauge::with_opts(
            Opts::new("reputation_total_nodes", "Number of tracked nodes").namespace("tribft"),
        )?;
        registry.register(Box::new(total_nodes.clone()))?;

        let trusted_nodes = IntGauge::with_opts(
            Opts::new(
                "reputation_trusted_nodes",
                "Nodes at or above the trusted threshold",
            )
            .namespace("tribft"),
        )?;
        registry.register(Box::new(trusted_nodes.clone()))?;

        let average_score = Gauge::with_opts(
            Opts::new("reputation_average_score", "Mean final score across nodes")
                .namespace("tribft"),
        )?;
        registry.register(Box::new(average_score.clone()))?;

        let events_total = IntCounterVec::new(
            Opts::new("reputation_events_total", "Reputation events by type")
                .namespace("tribft"),
            &["event"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let decay_ticks = IntCounter::with_opts(
            Opts::new("reputation_decay_ticks_total", "Decay sweeps applied").namespace("tribft"),
        )?;
        registry.register(Box::new(decay_ticks.clone()))?;

        let verifications_completed = IntCounter::with_opts(
            Opts::new(
                "reputation_verifications_completed_total",
                "Low-reputation cross-verification rounds completed",
            )
            .namespace("tribft"),
        )?;
        registry.register(Box::new(verifications_completed.clone()))?;

        Ok(Self {
            total_nodes,
            trusted_nodes,
            average_score,
            events_total,
            decay_ticks,
            verifications_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_count() {
        let registry = Registry::new();
        let metrics = ReputationMetrics::new(&registry).unwrap();

        metrics.total_nodes.set(4);
        metrics.events_total.with_label_values(&["timeout"]).inc();

        assert_eq!(metrics.total_nodes.get(), 4);
        assert_eq!(
            metrics.events_total.with_label_values(&["timeout"]).get(),
            1
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Registry::new();
        let _first = ReputationMetrics::new(&registry).unwrap();
        assert!(ReputationMetrics::new(&registry).is_err());
    }
}
