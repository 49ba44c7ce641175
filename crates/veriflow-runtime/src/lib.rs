//! AI-assisted document verification runtime.
//!
//! Wires the core data model to a model gateway and a persistence seam,
//! and drives the upload-to-review flow end to end. The organizing
//! principle throughout is fallback-first: the AI path is best-effort
//! enrichment and can never fail a business transaction. Auth problems,
//! exhausted budgets, timeouts, rate limits, HTTP errors, and unusable
//! model output all resolve to documented manual-review fallbacks; only
//! persistence failures surface to callers.
//!
//! Entry point is [`VerificationPipeline`]; everything else is a
//! collaborator it composes:
//!
//! - [`HttpModelGateway`] talks to the model proxy (auth, budget, timeout).
//! - [`schema::enforce`] coerces free-form model output into a caller-owned
//!   shape, defaults standing in for anything missing or malformed.
//! - The comparison engine classifies resubmissions against the prior
//!   document for the same requirement.
//! - [`RecordStore`] is the persistence seam; [`MemoryStore`] backs tests
//!   and offline use.

pub mod budget;
mod comparison;
pub mod config;
pub mod gateway;
mod orchestrator;
mod pipeline;
pub mod prompts;
pub mod schema;
pub mod store;

pub use secrecy::SecretString;

pub use budget::CallBudget;
pub use comparison::ComparisonEngine;
pub use config::{CallParams, GatewayConfig};
pub use gateway::{GatewayError, GatewayReply, HttpModelGateway, ModelGateway, ModelRequest};
pub use orchestrator::VerificationOrchestrator;
pub use pipeline::{
    Notifier, NullNotifier, PipelineError, SessionProvider, StaticSession, UploadReceipt,
    VerificationPipeline, VerificationPipelineBuilder,
};
pub use store::{MemoryStore, RecordStore, StoreError};
