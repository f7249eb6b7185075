//! Cross-verification of reports from low-reputation nodes
//!
//! Reports submitted by candidate-tier nodes (R < 0.2) are not taken at
//! face value: a small set of trusted verifiers is drawn by sortition and
//! asked to confirm or reject the event. A 2/3 confirm ratio accepts the
//! report; the outcome feeds back into the reporter's reputation.

use crate::error::{ReputationError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tribft_chain::{sortition_hash, Clock, NodeId, Timestamp};

/// A report awaiting cross-verification.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub reporter_id: NodeId,
    pub event_id: String,
    pub event_type: String,
    pub event_data: String,
    pub submitted_at: Timestamp,
    pub reporter_reputation: f64,

    pub verification_count: usize,
    pub confirm_count: usize,
    pub reject_count: usize,
    pub verified: bool,
    /// Meaningful only once `verified` is set
    pub genuine: bool,
}

#[derive(Debug, Clone)]
struct VerificationTask {
    verifiers: Vec<NodeId>,
    assigned_at: Timestamp,
}

pub struct LowRepVerifier {
    pending: HashMap<String, PendingEvent>,
    tasks: HashMap<String, VerificationTask>,
    clock: Arc<dyn Clock>,

    /// Verifiers drawn per event
    verifiers_per_event: usize,
    /// Confirm ratio required to accept a report
    threshold: f64,

    next_seq: u64,
}

impl LowRepVerifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_params(clock, 3, 2.0 / 3.0)
    }

    pub fn with_params(clock: Arc<dyn Clock>, verifiers_per_event: usize, threshold: f64) -> Self {
        Self {
            pending: HashMap::new(),
            tasks: HashMap::new(),
            clock,
            verifiers_per_event: verifiers_per_event.max(1),
            threshold,
            next_seq: 0,
        }
    }

    /// Queue a report for verification. Returns the event id.
    pub fn submit_event(
        &mut self,
        reporter_id: &str,
        event_type: &str,
        event_data: &str,
        reporter_reputation: f64,
    ) -> String {
        let now = self.clock.now();
        self.next_seq += 1;
        let event_id = format!("EVT_{}_{}_{:.3}", reporter_id, self.next_seq, now);

        self.pending.insert(
            event_id.clone(),
            PendingEvent {
                reporter_id: reporter_id.to_string(),
                event_id: event_id.clone(),
                event_type: event_type.to_string(),
                event_data: event_data.to_string(),
                submitted_at: now,
                reporter_reputation,
                verification_count: 0,
                confirm_count: 0,
                reject_count: 0,
                verified: false,
                genuine: false,
            },
        );

        debug!(
            event = %event_id,
            reporter = reporter_id,
            reputation = reporter_reputation,
            "event submitted for cross-verification"
        );
        event_id
    }

    /// Draw verifiers for an event by sortition over the trusted set,
    /// excluding the reporter.
    pub fn assign_verifiers(
        &mut self,
        event_id: &str,
        trusted_nodes: &[NodeId],
        seed: u64,
    ) -> Vec<NodeId> {
        let Some(event) = self.pending.get(event_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(u64, &NodeId)> = trusted_nodes
            .iter()
            .filter(|n| **n != event.reporter_id)
            .map(|n| (sortition_hash(n, seed), n))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let verifiers: Vec<NodeId> = scored
            .into_iter()
            .take(self.verifiers_per_event)
            .map(|(_, n)| n.clone())
            .collect();

        self.tasks.insert(
            event_id.to_string(),
            VerificationTask {
                verifiers: verifiers.clone(),
                assigned_at: self.clock.now(),
            },
        );

        debug!(event = event_id, count = verifiers.len(), "verifiers assigned");
        verifiers
    }

    /// Record one verifier's verdict.
    ///
    /// Returns `Ok(Some(genuine))` when this verdict completes the round
    /// (2/3 confirm ratio, or rejection beyond recovery — early
    /// termination), `Ok(None)` while the round is still open.
    pub fn submit_verification(
        &mut self,
        event_id: &str,
        verifier_id: &str,
        confirm: bool,
    ) -> Result<Option<bool>> {
        let event = self
            .pending
            .get_mut(event_id)
            .ok_or_else(|| ReputationError::UnknownEvent(event_id.to_string()))?;

        if event.verified {
            return Ok(Some(event.genuine));
        }

        event.verification_count += 1;
        if confirm {
            event.confirm_count += 1;
        } else {
            event.reject_count += 1;
        }

        debug!(
            event = event_id,
            verifier = verifier_id,
            confirm,
            tally = %format!("{}/{}", event.confirm_count, event.reject_count),
            "verification received"
        );

        // When fewer trusted verifiers were available than requested, the
        // assigned count is the completion bar.
        let required = self
            .tasks
            .get(event_id)
            .map(|t| t.verifiers.len().max(1))
            .unwrap_or(self.verifiers_per_event);
        if !Self::threshold_reached(event, required, self.threshold) {
            return Ok(None);
        }

        event.verified = true;
        let confirm_ratio = event.confirm_count as f64 / event.verification_count as f64;
        event.genuine = confirm_ratio >= self.threshold;

        info!(
            event = event_id,
            genuine = event.genuine,
            ratio = confirm_ratio,
            "cross-verification complete"
        );
        Ok(Some(event.genuine))
    }

    fn threshold_reached(event: &PendingEvent, required: usize, threshold: f64) -> bool {
        if event.verification_count < required {
            return false;
        }
        let confirm_ratio = event.confirm_count as f64 / event.verification_count as f64;
        let reject_ratio = event.reject_count as f64 / event.verification_count as f64;
        confirm_ratio >= threshold || reject_ratio > (1.0 - threshold)
    }

    pub fn is_verified(&self, event_id: &str) -> bool {
        self.pending
            .get(event_id)
            .map(|e| e.verified)
            .unwrap_or(false)
    }

    /// Outcome of a completed verification; `None` while open or unknown.
    pub fn verification_result(&self, event_id: &str) -> Option<bool> {
        self.pending
            .get(event_id)
            .filter(|e| e.verified)
            .map(|e| e.genuine)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_event(&self, event_id: &str) -> bool {
        self.pending.contains_key(event_id)
    }

    pub fn assigned_verifiers(&self, event_id: &str) -> Option<&[NodeId]> {
        self.tasks.get(event_id).map(|t| t.verifiers.as_slice())
    }

    /// Drop unverified events older than `timeout` seconds.
    pub fn cleanup_expired(&mut self, timeout: f64) {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, e)| !e.verified && now - e.submitted_at > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            warn!(event = %id, "dropping expired verification event");
            self.pending.remove(&id);
            self.tasks.remove(&id);
        }
    }
}
