//! # veriflow-core
//!
//! Deterministic verification domain for the veriflow pipeline.
//!
//! This crate answers, for one company at a time:
//! - Which verification requirements are satisfied, pending, or rejected?
//! - What is the company's overall verification status?
//! - What trust score follows from that state plus marketplace signals?
//!
//! ## Key guarantees
//!
//! 1. **Deterministic**: same inputs always produce the same outputs.
//! 2. **No AI calls**: the model gateway and everything that can fail in
//!    interesting ways lives in `veriflow-runtime`.
//! 3. **Human-in-the-loop**: no code path in this crate reaches `Verified`
//!    or `Rejected` without an explicit [`state::AdminDecision`].
//! 4. **Pure reduction**: the overall status is a function of the
//!    per-requirement map, never stored beside it.
//!
//! ## Example
//!
//! ```rust
//! use veriflow_core::{
//!     AdminDecision, ExternalSignals, RequirementCatalog, TrustScoreAggregator,
//!     VerificationRecord,
//! };
//!
//! let catalog = RequirementCatalog::standard();
//! let mut record = VerificationRecord::new("acme", &catalog);
//!
//! record.record_submission("kyc")?;
//! record.record_ai_review("kyc")?;
//! record.record_admin_decision("kyc", AdminDecision::Approve)?;
//!
//! let score = TrustScoreAggregator::new().score(
//!     &record,
//!     &catalog,
//!     &ExternalSignals { response_rate: 80.0, total_orders: 120 },
//! );
//! assert!(score.score >= 50);
//! # Ok::<(), veriflow_core::TransitionError>(())
//! ```

pub mod events;
pub mod score;
pub mod state;
pub mod types;

// Re-export main types at crate root
pub use events::{EventSink, MemorySink, NullSink, VerificationEvent};
pub use score::TrustScoreAggregator;
pub use state::{
    AdminDecision, OverallStatus, RequirementStatus, StoredRecord, TransitionError,
    VerificationRecord,
};
pub use types::{
    clamp_confidence, CompanyContext, ComparisonResult, DocumentSubmission, DocumentType,
    ExternalSignals, RequirementCatalog, TrustScore, VerificationRequirement, VerificationResult,
};
