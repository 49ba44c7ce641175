//! Per-requirement verification state machine.
//!
//! The state machine applies strict, non-configurable transition rules:
//! 1. A new submission always moves its requirement to `UploadedPendingReview`,
//!    from any prior state. Re-verification is mandatory on resubmission:
//!    trust is submission-scoped, not requirement-scoped-forever.
//! 2. An AI review moves `UploadedPendingReview` to `AiReviewed`
//!    unconditionally on the AI outcome; it only marks "the AI has had a
//!    chance to look".
//! 3. Only an explicit admin decision reaches `Verified` or `Rejected`.
//!    AI output is advisory input to that decision, never a finalizer.
//!
//! The overall company status is a pure reduction over the per-requirement
//! map; it is never stored independently of it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::RequirementCatalog;

/// Status of a single requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    /// No document has ever been submitted.
    Empty,

    /// A document is uploaded and awaiting AI review.
    UploadedPendingReview,

    /// The AI has produced a result (success or fallback) for the current
    /// submission; awaiting the admin decision.
    AiReviewed,

    /// Admin-approved. Terminal until a new submission arrives.
    Verified,

    /// Admin-rejected. Leaves this state only via a new submission.
    Rejected,
}

/// Overall company verification status, reduced from the requirement map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Unverified,
    Pending,
    Verified,
    Rejected,
}

/// The admin review surface's verdict on an AI-reviewed requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminDecision {
    Approve,
    Reject,
}

/// Errors from state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("unknown requirement: {0}")]
    UnknownRequirement(String),

    #[error("invalid transition for {requirement_id}: {from:?} cannot accept {attempted}")]
    InvalidTransition {
        requirement_id: String,
        from: RequirementStatus,
        attempted: &'static str,
    },
}

/// Per-company verification state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Company this record tracks.
    pub company_id: String,

    /// Status per requirement id. Keys are fixed at construction from the
    /// catalog; BTreeMap keeps iteration deterministic.
    per_requirement: BTreeMap<String, RequirementStatus>,

    /// Business/registration id number, once extracted or entered.
    pub business_id_number: Option<String>,

    /// Country of registration, once extracted or entered.
    pub country_of_registration: Option<String>,
}

impl VerificationRecord {
    /// Create a fresh record with every catalog requirement `Empty`.
    pub fn new(company_id: impl Into<String>, catalog: &RequirementCatalog) -> Self {
        let per_requirement = catalog
            .iter()
            .map(|r| (r.id.clone(), RequirementStatus::Empty))
            .collect();

        Self {
            company_id: company_id.into(),
            per_requirement,
            business_id_number: None,
            country_of_registration: None,
        }
    }

    /// Status of one requirement.
    pub fn status(&self, requirement_id: &str) -> Result<RequirementStatus, TransitionError> {
        self.per_requirement
            .get(requirement_id)
            .copied()
            .ok_or_else(|| TransitionError::UnknownRequirement(requirement_id.to_string()))
    }

    /// Iterate statuses in deterministic (requirement id) order.
    pub fn statuses(&self) -> impl Iterator<Item = (&str, RequirementStatus)> {
        self.per_requirement.iter().map(|(id, s)| (id.as_str(), *s))
    }

    /// Whether no document has ever been submitted for any requirement.
    ///
    /// Statuses never return to `Empty`, so this doubles as the
    /// "first submission" check.
    pub fn is_untouched(&self) -> bool {
        self.per_requirement
            .values()
            .all(|s| *s == RequirementStatus::Empty)
    }

    /// Record a new document submission. Always allowed: `Rejected` recovers
    /// and `Verified` reverts, both to `UploadedPendingReview`. Fires before
    /// the AI runs.
    ///
    /// Returns `true` when this is the company's first submission ever,
    /// which drives the one-shot pending notification.
    pub fn record_submission(&mut self, requirement_id: &str) -> Result<bool, TransitionError> {
        let first = self.is_untouched();
        let status = self
            .per_requirement
            .get_mut(requirement_id)
            .ok_or_else(|| TransitionError::UnknownRequirement(requirement_id.to_string()))?;

        tracing::debug!(
            company_id = %self.company_id,
            requirement_id,
            from = ?*status,
            "submission recorded"
        );
        *status = RequirementStatus::UploadedPendingReview;
        Ok(first)
    }

    /// Record that the AI has reviewed the current submission. Valid only
    /// from `UploadedPendingReview`; the pipeline's generation guard is the
    /// first line of defense against stale results, this is the second.
    pub fn record_ai_review(&mut self, requirement_id: &str) -> Result<(), TransitionError> {
        let status = self
            .per_requirement
            .get_mut(requirement_id)
            .ok_or_else(|| TransitionError::UnknownRequirement(requirement_id.to_string()))?;

        if *status != RequirementStatus::UploadedPendingReview {
            return Err(TransitionError::InvalidTransition {
                requirement_id: requirement_id.to_string(),
                from: *status,
                attempted: "ai_review",
            });
        }

        *status = RequirementStatus::AiReviewed;
        Ok(())
    }

    /// Record the admin's verdict. The only path into `Verified` or
    /// `Rejected`, and valid only from `AiReviewed`.
    pub fn record_admin_decision(
        &mut self,
        requirement_id: &str,
        decision: AdminDecision,
    ) -> Result<RequirementStatus, TransitionError> {
        let status = self
            .per_requirement
            .get_mut(requirement_id)
            .ok_or_else(|| TransitionError::UnknownRequirement(requirement_id.to_string()))?;

        if *status != RequirementStatus::AiReviewed {
            return Err(TransitionError::InvalidTransition {
                requirement_id: requirement_id.to_string(),
                from: *status,
                attempted: "admin_decision",
            });
        }

        let next = match decision {
            AdminDecision::Approve => RequirementStatus::Verified,
            AdminDecision::Reject => RequirementStatus::Rejected,
        };

        tracing::info!(
            company_id = %self.company_id,
            requirement_id,
            decision = ?decision,
            "admin decision recorded"
        );
        *status = next;
        Ok(next)
    }

    /// Reduce the per-requirement map to the overall company status.
    ///
    /// `Verified` iff every required requirement is `Verified`; `Rejected`
    /// if any required requirement is `Rejected`; `Unverified` when nothing
    /// has ever been submitted; otherwise `Pending`.
    pub fn overall_status(&self, catalog: &RequirementCatalog) -> OverallStatus {
        if self.is_untouched() {
            return OverallStatus::Unverified;
        }

        let mut all_verified = true;
        for requirement in catalog.required() {
            match self.per_requirement.get(&requirement.id) {
                Some(RequirementStatus::Rejected) => return OverallStatus::Rejected,
                Some(RequirementStatus::Verified) => {}
                _ => all_verified = false,
            }
        }

        if all_verified {
            OverallStatus::Verified
        } else {
            OverallStatus::Pending
        }
    }

    /// Flatten into the persisted wire shape consumed by the external store.
    ///
    /// `documents` maps each requirement's document type to its current file
    /// URL; the storage collaborator owns those URLs, this core only carries
    /// them through.
    pub fn to_stored(
        &self,
        catalog: &RequirementCatalog,
        documents: BTreeMap<String, String>,
    ) -> StoredRecord {
        StoredRecord {
            company_id: self.company_id.clone(),
            documents,
            business_id_number: self.business_id_number.clone(),
            country_of_registration: self.country_of_registration.clone(),
            status: self.overall_status(catalog),
        }
    }
}

/// The persisted record contract:
/// `{company_id, documents, business_id_number, country_of_registration, status}`
/// with lowercase status strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub company_id: String,
    pub documents: BTreeMap<String, String>,
    pub business_id_number: Option<String>,
    pub country_of_registration: Option<String>,
    pub status: OverallStatus,
}
