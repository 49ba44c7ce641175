//! Verification events published by the pipeline.
//!
//! UI side effects (toasts, badge refreshes) live outside this core. The
//! pipeline publishes events through an [`EventSink`]; presentation layers
//! subscribe and render however they like.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::state::{AdminDecision, OverallStatus, RequirementStatus};
use crate::types::TrustScore;

/// Something the pipeline wants the outside world to know about.
///
/// Serializes as `{"kind": ..., "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum VerificationEvent {
    /// A document submission was persisted and its requirement moved to
    /// pending review.
    SubmissionRecorded {
        company_id: String,
        requirement_id: String,
        submission_id: String,
        first_submission: bool,
    },

    /// A requirement's status changed.
    StatusChanged {
        company_id: String,
        requirement_id: String,
        status: RequirementStatus,
        overall: OverallStatus,
    },

    /// The AI produced a result (success or fallback) for a submission.
    AiReviewCompleted {
        company_id: String,
        requirement_id: String,
        submission_id: String,
        verified: bool,
        confidence: f64,
    },

    /// A delayed AI result was discarded because a newer submission for the
    /// same requirement arrived while it was in flight.
    SubmissionSuperseded {
        company_id: String,
        requirement_id: String,
        submission_id: String,
    },

    /// The admin review surface issued its verdict.
    AdminDecisionRecorded {
        company_id: String,
        requirement_id: String,
        decision: AdminDecision,
        status: RequirementStatus,
    },

    /// The trust score was recomputed.
    TrustScoreUpdated { score: TrustScore },
}

/// Subscriber seam for verification events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: VerificationEvent);
}

/// Discards every event. The default when no UI is attached.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: VerificationEvent) {}
}

/// Collects events in memory, in publish order. Used by tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<VerificationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<VerificationEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: VerificationEvent) {
        self.events.lock().push(event);
    }
}
