//! The upload-to-review pipeline.
//!
//! One upload event flows: persist submission → state machine →
//! orchestrator (AI) → state machine → trust score → events. Two rules
//! shape everything here:
//!
//! 1. **Storage never waits for AI.** The upload is persisted and reported
//!    successful before the model is consulted; the verification result is
//!    attached afterwards. Persistence failures surface to the caller, AI
//!    failures never do.
//! 2. **Latest submission wins.** Per `(company_id, requirement_id)` a
//!    generation ticket is taken at upload time; a verification completing
//!    under a stale ticket is discarded, so an older submission's delayed
//!    result can never overwrite a newer submission's state. A per-key
//!    commit lock keeps the staleness check and the state write atomic with
//!    respect to concurrent uploads; the AI call itself runs outside it.
//!
//! State is per-company; verifications of different companies or
//! requirements never contend beyond the shared ticket and lock maps.

use parking_lot::Mutex;
use secrecy::SecretString;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use veriflow_core::{
    AdminDecision, CompanyContext, DocumentSubmission, EventSink, NullSink, RequirementCatalog,
    RequirementStatus, TransitionError, TrustScore, TrustScoreAggregator, VerificationEvent,
    VerificationRecord, VerificationResult,
};

use crate::config::CallParams;
use crate::gateway::ModelGateway;
use crate::orchestrator::VerificationOrchestrator;
use crate::store::{RecordStore, StoreError};

/// Errors the pipeline surfaces. AI-path failures are absent by design;
/// they resolve to fallback results inside the orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("pipeline misconfigured: {0}")]
    Misconfigured(&'static str),
}

/// Supplies the bearer token for gateway calls. When it has none, the AI
/// feature behaves as disabled and every verification routes to manual
/// review; nothing crashes.
pub trait SessionProvider: Send + Sync {
    fn bearer_token(&self) -> Option<SecretString>;
}

/// Fixed-token session provider.
pub struct StaticSession {
    token: Option<SecretString>,
}

impl StaticSession {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(SecretString::from(token.into())),
        }
    }

    /// No token: the gateway will refuse every call.
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl SessionProvider for StaticSession {
    fn bearer_token(&self) -> Option<SecretString> {
        self.token.clone()
    }
}

/// Notification dispatcher, invoked exactly once per company: when its
/// first submission is recorded and its verification enters pending.
/// Delivery mechanics live outside this crate.
pub trait Notifier: Send + Sync {
    fn verification_pending(&self, company_id: &str);
}

/// Drops notifications on the floor.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn verification_pending(&self, _company_id: &str) {}
}

/// Proof that an upload was persisted and is awaiting verification.
/// The upload is already a success when this exists.
pub struct UploadReceipt {
    submission: DocumentSubmission,
    previous: Option<DocumentSubmission>,
    context: CompanyContext,
    ticket: u64,

    /// Whether this was the company's first submission ever.
    pub first_submission: bool,
}

impl fmt::Debug for UploadReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadReceipt")
            .field("submission_id", &self.submission.id)
            .field("requirement_id", &self.submission.requirement_id)
            .field("first_submission", &self.first_submission)
            .finish()
    }
}

/// Drives the full verification flow for uploads and admin decisions.
pub struct VerificationPipeline {
    catalog: RequirementCatalog,
    orchestrator: VerificationOrchestrator,
    store: Arc<dyn RecordStore>,
    session: Arc<dyn SessionProvider>,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn EventSink>,
    aggregator: TrustScoreAggregator,

    /// Latest ticket per (company_id, requirement_id).
    inflight: Mutex<HashMap<(String, String), u64>>,

    /// Serializes record reads and writes per (company_id, requirement_id).
    /// Held by the upload path and by the verification commit, so a ticket
    /// observed as current stays current until its commit is persisted.
    commit_locks: Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>,
    ticket_seq: AtomicU64,
}

impl fmt::Debug for VerificationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationPipeline")
            .field("requirements", &self.catalog.len())
            .finish()
    }
}

impl VerificationPipeline {
    pub fn builder() -> VerificationPipelineBuilder {
        VerificationPipelineBuilder::new()
    }

    fn commit_lock(&self, key: &(String, String)) -> Arc<AsyncMutex<()>> {
        self.commit_locks
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Persist an upload and mark its requirement pending review.
    ///
    /// This is the user-visible half: a `StoreError` here means the upload
    /// failed and the caller must say so. Once this returns `Ok`, nothing
    /// downstream can fail the upload.
    pub async fn record_upload(
        &self,
        submission: DocumentSubmission,
        context: CompanyContext,
    ) -> Result<UploadReceipt, PipelineError> {
        // Validate the requirement before touching storage.
        self.catalog
            .get(&submission.requirement_id)
            .ok_or_else(|| TransitionError::UnknownRequirement(submission.requirement_id.clone()))?;

        let company_id = submission.company_id.clone();
        let requirement_id = submission.requirement_id.clone();

        let key = (company_id.clone(), requirement_id.clone());
        let lock = self.commit_lock(&key);
        let _guard = lock.lock().await;

        // The previous submission is fetched before inserting the new one.
        let previous = self
            .store
            .latest_submission(&company_id, &requirement_id)
            .await?;

        self.store.insert_submission(&submission).await?;

        let mut record = match self.store.load_record(&company_id).await? {
            Some(record) => record,
            None => VerificationRecord::new(company_id.clone(), &self.catalog),
        };
        let first_submission = record.record_submission(&requirement_id)?;
        self.store.save_record(&record).await?;

        if first_submission {
            self.notifier.verification_pending(&company_id);
        }

        self.events.publish(VerificationEvent::SubmissionRecorded {
            company_id: company_id.clone(),
            requirement_id: requirement_id.clone(),
            submission_id: submission.id.clone(),
            first_submission,
        });
        self.events.publish(VerificationEvent::StatusChanged {
            company_id: company_id.clone(),
            requirement_id: requirement_id.clone(),
            status: RequirementStatus::UploadedPendingReview,
            overall: record.overall_status(&self.catalog),
        });

        let ticket = self.ticket_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.inflight.lock().insert(key, ticket);

        tracing::info!(company_id = %company_id, requirement_id = %requirement_id,
            submission_id = %submission.id, "upload recorded, verification pending");

        Ok(UploadReceipt {
            submission,
            previous,
            context,
            ticket,
            first_submission,
        })
    }

    /// Run AI verification for a recorded upload.
    ///
    /// Returns `Ok(None)` when the result was discarded because a newer
    /// submission for the same requirement superseded this one while the
    /// verification was in flight.
    pub async fn run_verification(
        &self,
        receipt: UploadReceipt,
    ) -> Result<Option<VerificationResult>, PipelineError> {
        let UploadReceipt {
            submission,
            previous,
            context,
            ticket,
            ..
        } = receipt;
        let company_id = submission.company_id.clone();
        let requirement_id = submission.requirement_id.clone();

        let document_type = self
            .catalog
            .get(&requirement_id)
            .ok_or_else(|| TransitionError::UnknownRequirement(requirement_id.clone()))?
            .document_type;

        let token = self.session.bearer_token();
        let result = self
            .orchestrator
            .verify(
                &submission,
                previous.as_ref(),
                document_type,
                &context,
                token.as_ref(),
            )
            .await;

        let key = (company_id.clone(), requirement_id.clone());
        // The staleness check and the commit below must be one atomic step
        // with respect to uploads for the same requirement; only the AI call
        // above runs outside the lock.
        let lock = self.commit_lock(&key);
        let _guard = lock.lock().await;
        let current = self.inflight.lock().get(&key).copied() == Some(ticket);
        if !current {
            tracing::warn!(company_id = %company_id, requirement_id = %requirement_id,
                submission_id = %submission.id, "stale verification result discarded");
            self.events.publish(VerificationEvent::SubmissionSuperseded {
                company_id,
                requirement_id,
                submission_id: submission.id,
            });
            return Ok(None);
        }

        let mut record = self
            .store
            .load_record(&company_id)
            .await?
            .ok_or_else(|| StoreError::RecordMissing(company_id.clone()))?;
        record.record_ai_review(&requirement_id)?;

        self.store.insert_result(&result).await?;
        self.store.save_record(&record).await?;

        self.events.publish(VerificationEvent::AiReviewCompleted {
            company_id: company_id.clone(),
            requirement_id: requirement_id.clone(),
            submission_id: submission.id.clone(),
            verified: result.verified,
            confidence: result.confidence,
        });
        self.events.publish(VerificationEvent::StatusChanged {
            company_id: company_id.clone(),
            requirement_id: requirement_id.clone(),
            status: RequirementStatus::AiReviewed,
            overall: record.overall_status(&self.catalog),
        });

        self.recompute_score(&record).await?;

        let mut inflight = self.inflight.lock();
        if inflight.get(&key) == Some(&ticket) {
            inflight.remove(&key);
        }
        drop(inflight);

        Ok(Some(result))
    }

    /// Record and verify in one call. The AI half still cannot fail the
    /// upload: once `record_upload` succeeds, this returns `Ok`.
    pub async fn handle_upload(
        &self,
        submission: DocumentSubmission,
        context: CompanyContext,
    ) -> Result<Option<VerificationResult>, PipelineError> {
        let receipt = self.record_upload(submission, context).await?;
        self.run_verification(receipt).await
    }

    /// Detach the AI half onto the runtime, so callers can acknowledge the
    /// upload immediately and let the result attach asynchronously.
    pub fn spawn_verification(
        self: &Arc<Self>,
        receipt: UploadReceipt,
    ) -> tokio::task::JoinHandle<Result<Option<VerificationResult>, PipelineError>> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run_verification(receipt).await })
    }

    /// Apply the admin verdict for an AI-reviewed requirement. The only
    /// actor permitted to reach `Verified` or `Rejected`.
    pub async fn apply_admin_decision(
        &self,
        company_id: &str,
        requirement_id: &str,
        decision: AdminDecision,
    ) -> Result<TrustScore, PipelineError> {
        let mut record = self
            .store
            .load_record(company_id)
            .await?
            .ok_or_else(|| StoreError::RecordMissing(company_id.to_string()))?;

        let status = record.record_admin_decision(requirement_id, decision)?;
        self.store.save_record(&record).await?;

        self.events.publish(VerificationEvent::AdminDecisionRecorded {
            company_id: company_id.to_string(),
            requirement_id: requirement_id.to_string(),
            decision,
            status,
        });
        self.events.publish(VerificationEvent::StatusChanged {
            company_id: company_id.to_string(),
            requirement_id: requirement_id.to_string(),
            status,
            overall: record.overall_status(&self.catalog),
        });

        let score = self.recompute_score(&record).await?;
        Ok(score)
    }

    /// Current trust score for a company, recomputed from inputs.
    pub async fn trust_score(&self, company_id: &str) -> Result<TrustScore, PipelineError> {
        let record = match self.store.load_record(company_id).await? {
            Some(record) => record,
            None => VerificationRecord::new(company_id, &self.catalog),
        };
        let signals = self.store.external_signals(company_id).await?;
        Ok(self.aggregator.score(&record, &self.catalog, &signals))
    }

    async fn recompute_score(
        &self,
        record: &VerificationRecord,
    ) -> Result<TrustScore, PipelineError> {
        let signals = self.store.external_signals(&record.company_id).await?;
        let score = self.aggregator.score(record, &self.catalog, &signals);
        self.events
            .publish(VerificationEvent::TrustScoreUpdated { score: score.clone() });
        Ok(score)
    }
}

/// Builder for [`VerificationPipeline`].
pub struct VerificationPipelineBuilder {
    catalog: RequirementCatalog,
    params: CallParams,
    gateway: Option<Arc<dyn ModelGateway>>,
    store: Option<Arc<dyn RecordStore>>,
    session: Arc<dyn SessionProvider>,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn EventSink>,
}

impl VerificationPipelineBuilder {
    pub fn new() -> Self {
        Self {
            catalog: RequirementCatalog::standard(),
            params: CallParams::default(),
            gateway: None,
            store: None,
            session: Arc::new(StaticSession::anonymous()),
            notifier: Arc::new(NullNotifier),
            events: Arc::new(NullSink),
        }
    }

    pub fn catalog(mut self, catalog: RequirementCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn call_params(mut self, params: CallParams) -> Self {
        self.params = params;
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn ModelGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = session;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> Result<VerificationPipeline, PipelineError> {
        let gateway = self
            .gateway
            .ok_or(PipelineError::Misconfigured("no gateway set"))?;
        let store = self
            .store
            .ok_or(PipelineError::Misconfigured("no store set"))?;

        Ok(VerificationPipeline {
            orchestrator: VerificationOrchestrator::new(gateway, self.params),
            catalog: self.catalog,
            store,
            session: self.session,
            notifier: self.notifier,
            events: self.events,
            aggregator: TrustScoreAggregator::new(),
            inflight: Mutex::new(HashMap::new()),
            commit_locks: Mutex::new(HashMap::new()),
            ticket_seq: AtomicU64::new(0),
        })
    }
}

impl Default for VerificationPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use crate::gateway::GatewayError;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use veriflow_core::{ExternalSignals, MemorySink, OverallStatus, RequirementStatus};

    struct CountingNotifier {
        count: AtomicUsize,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self {
                count: AtomicUsize::new(0),
            }
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl Notifier for CountingNotifier {
        fn verification_pending(&self, _company_id: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Store whose submission insert always fails, as a full disk would.
    struct BrokenStore;

    #[async_trait::async_trait]
    impl RecordStore for BrokenStore {
        async fn insert_submission(
            &self,
            _submission: &DocumentSubmission,
        ) -> Result<(), StoreError> {
            Err(StoreError::Io("disk full".to_string()))
        }

        async fn latest_submission(
            &self,
            _company_id: &str,
            _requirement_id: &str,
        ) -> Result<Option<DocumentSubmission>, StoreError> {
            Ok(None)
        }

        async fn load_record(
            &self,
            _company_id: &str,
        ) -> Result<Option<VerificationRecord>, StoreError> {
            Ok(None)
        }

        async fn save_record(&self, _record: &VerificationRecord) -> Result<(), StoreError> {
            Ok(())
        }

        async fn insert_result(&self, _result: &VerificationResult) -> Result<(), StoreError> {
            Ok(())
        }

        async fn load_result(
            &self,
            _submission_id: &str,
        ) -> Result<Option<VerificationResult>, StoreError> {
            Ok(None)
        }

        async fn external_signals(&self, _company_id: &str) -> Result<ExternalSignals, StoreError> {
            Ok(ExternalSignals::default())
        }
    }

    struct Fixture {
        pipeline: VerificationPipeline,
        gateway: Arc<ScriptedGateway>,
        store: Arc<MemoryStore>,
        events: Arc<MemorySink>,
        notifier: Arc<CountingNotifier>,
    }

    fn fixture() -> Fixture {
        let gateway = Arc::new(ScriptedGateway::new());
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(MemorySink::new());
        let notifier = Arc::new(CountingNotifier::new());
        let pipeline = VerificationPipeline::builder()
            .gateway(gateway.clone())
            .store(store.clone())
            .session(Arc::new(StaticSession::with_token("tok")))
            .events(events.clone())
            .notifier(notifier.clone())
            .build()
            .unwrap();
        Fixture {
            pipeline,
            gateway,
            store,
            events,
            notifier,
        }
    }

    fn submission(id: &str, requirement: &str) -> DocumentSubmission {
        DocumentSubmission {
            id: id.to_string(),
            company_id: "co-1".to_string(),
            requirement_id: requirement.to_string(),
            file_url: format!("https://files/{id}.pdf"),
            uploaded_at: Utc::now(),
        }
    }

    fn context() -> CompanyContext {
        CompanyContext {
            company_name: "Acme GmbH".to_string(),
            business_id_number: Some("HRB 12345".to_string()),
            country_of_registration: Some("DE".to_string()),
        }
    }

    const OK_VERIFICATION: &str = r#"{"verified": true, "confidence": 0.9,
        "extracted_info": {"company_name": "Acme GmbH"},
        "issues": [], "recommendations": [], "summary": "ok"}"#;

    #[tokio::test]
    async fn upload_flows_to_ai_reviewed_with_events_in_order() {
        let f = fixture();
        f.gateway.push_ok(OK_VERIFICATION);

        let result = f
            .pipeline
            .handle_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap()
            .expect("result not superseded");

        assert!(result.verified);
        assert_eq!(f.store.submission_count(), 1);
        assert_eq!(
            f.store.load_result("sub-1").await.unwrap().unwrap().confidence,
            0.9
        );

        let record = f.store.load_record("co-1").await.unwrap().unwrap();
        assert_eq!(record.status("kyc").unwrap(), RequirementStatus::AiReviewed);

        let kinds: Vec<&'static str> = f
            .events
            .events()
            .iter()
            .map(|e| match e {
                VerificationEvent::SubmissionRecorded { .. } => "recorded",
                VerificationEvent::StatusChanged { .. } => "status",
                VerificationEvent::AiReviewCompleted { .. } => "reviewed",
                VerificationEvent::SubmissionSuperseded { .. } => "superseded",
                VerificationEvent::AdminDecisionRecorded { .. } => "decided",
                VerificationEvent::TrustScoreUpdated { .. } => "scored",
            })
            .collect();
        assert_eq!(kinds, vec!["recorded", "status", "reviewed", "status", "scored"]);
    }

    #[tokio::test]
    async fn pending_notification_fires_once_per_company() {
        let f = fixture();
        f.gateway.push_ok(OK_VERIFICATION);
        f.gateway.push_ok(OK_VERIFICATION);

        f.pipeline
            .handle_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap();
        f.pipeline
            .handle_upload(submission("sub-2", "bank_statement"), context())
            .await
            .unwrap();

        assert_eq!(f.notifier.count(), 1);
    }

    #[tokio::test]
    async fn ai_failure_never_fails_the_upload() {
        let f = fixture();
        f.gateway.push_err(GatewayError::Api {
            status: 503,
            body: "overloaded".to_string(),
        });

        let result = f
            .pipeline
            .handle_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap()
            .expect("fallback result attached");

        // The upload stands; the result is the manual-review fallback.
        assert!(!result.verified);
        assert_eq!(
            result.issues,
            vec!["Unable to analyze document - manual review required".to_string()]
        );
        assert_eq!(f.store.submission_count(), 1);
        let record = f.store.load_record("co-1").await.unwrap().unwrap();
        assert_eq!(record.status("kyc").unwrap(), RequirementStatus::AiReviewed);
    }

    #[tokio::test]
    async fn persistence_failure_surfaces_to_the_caller() {
        let gateway = Arc::new(ScriptedGateway::new());
        let pipeline = VerificationPipeline::builder()
            .gateway(gateway)
            .store(Arc::new(BrokenStore))
            .build()
            .unwrap();

        let err = pipeline
            .handle_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn unknown_requirement_is_rejected_before_storage() {
        let f = fixture();

        let err = f
            .pipeline
            .record_upload(submission("sub-1", "tax_certificate"), context())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transition(TransitionError::UnknownRequirement(_))
        ));
        assert_eq!(f.store.submission_count(), 0);
    }

    #[tokio::test]
    async fn stale_verification_result_is_discarded() {
        let f = fixture();
        f.gateway.push_ok(OK_VERIFICATION);
        f.gateway.push_ok(OK_VERIFICATION);

        // Two uploads land before either verification runs.
        let first = f
            .pipeline
            .record_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap();
        let second = f
            .pipeline
            .record_upload(submission("sub-2", "kyc"), context())
            .await
            .unwrap();

        // The older verification finishes late and is discarded.
        let stale = f.pipeline.run_verification(first).await.unwrap();
        assert!(stale.is_none());
        assert!(f.store.load_result("sub-1").await.unwrap().is_none());

        let fresh = f.pipeline.run_verification(second).await.unwrap();
        assert!(fresh.is_some());
        assert!(f.store.load_result("sub-2").await.unwrap().is_some());

        let record = f.store.load_record("co-1").await.unwrap().unwrap();
        assert_eq!(record.status("kyc").unwrap(), RequirementStatus::AiReviewed);
        assert!(f
            .events
            .events()
            .iter()
            .any(|e| matches!(e, VerificationEvent::SubmissionSuperseded { submission_id, .. }
                if submission_id == "sub-1")));
    }

    #[tokio::test]
    async fn resubmission_compares_against_the_previous_document() {
        let f = fixture();
        f.gateway.push_ok(OK_VERIFICATION);
        f.gateway.push_ok(OK_VERIFICATION);
        f.gateway.push_ok(
            r#"{"matches": true, "confidence": 0.95, "differences": [],
                "similarities": ["same registration number"],
                "is_same_document": false, "is_updated_version": true,
                "summary": "Updated scan of the same document"}"#,
        );

        f.pipeline
            .handle_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap();
        let result = f
            .pipeline
            .handle_upload(submission("sub-2", "kyc"), context())
            .await
            .unwrap()
            .unwrap();

        // Verification for each upload plus one comparison.
        assert_eq!(f.gateway.calls(), 3);
        assert!(result.matches_previous);
        let comparison = result.comparison.expect("comparison attached");
        assert!(comparison.is_updated_version);
    }

    #[tokio::test]
    async fn admin_approval_of_all_requirements_verifies_the_company() {
        let f = fixture();
        f.store.set_signals(
            "co-1",
            ExternalSignals {
                response_rate: 80.0,
                total_orders: 120,
            },
        );

        for (i, requirement) in ["business_registration", "kyc", "bank_statement"]
            .iter()
            .enumerate()
        {
            f.gateway.push_ok(OK_VERIFICATION);
            f.pipeline
                .handle_upload(submission(&format!("sub-{i}"), requirement), context())
                .await
                .unwrap();
            f.pipeline
                .apply_admin_decision("co-1", requirement, AdminDecision::Approve)
                .await
                .unwrap();
        }

        let record = f.store.load_record("co-1").await.unwrap().unwrap();
        assert_eq!(
            record.overall_status(&RequirementCatalog::standard()),
            OverallStatus::Verified
        );

        let score = f.pipeline.trust_score("co-1").await.unwrap();
        assert_eq!(score.score, 98);
        assert_eq!(score.factors["verified_bonus"], 30.0);
    }

    #[tokio::test]
    async fn rejection_recovers_through_resubmission() {
        let f = fixture();
        f.gateway.push_ok(OK_VERIFICATION);
        f.gateway.push_ok(OK_VERIFICATION);
        f.gateway.push_ok(
            r#"{"matches": true, "confidence": 0.9, "differences": [],
                "similarities": [], "is_same_document": true,
                "is_updated_version": false, "summary": "Same document"}"#,
        );

        f.pipeline
            .handle_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap();
        f.pipeline
            .apply_admin_decision("co-1", "kyc", AdminDecision::Reject)
            .await
            .unwrap();

        let record = f.store.load_record("co-1").await.unwrap().unwrap();
        assert_eq!(record.status("kyc").unwrap(), RequirementStatus::Rejected);

        f.pipeline
            .handle_upload(submission("sub-2", "kyc"), context())
            .await
            .unwrap();
        let record = f.store.load_record("co-1").await.unwrap().unwrap();
        assert_eq!(record.status("kyc").unwrap(), RequirementStatus::AiReviewed);
    }

    #[tokio::test]
    async fn admin_decision_without_review_is_an_invalid_transition() {
        let f = fixture();
        f.gateway.push_ok(OK_VERIFICATION);
        f.pipeline
            .record_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap();

        let err = f
            .pipeline
            .apply_admin_decision("co-1", "kyc", AdminDecision::Approve)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transition(TransitionError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn trust_score_for_unknown_company_is_the_base() {
        let f = fixture();
        let score = f.pipeline.trust_score("co-unknown").await.unwrap();
        assert_eq!(score.score, 50);
    }

    #[tokio::test]
    async fn spawned_verification_attaches_the_result() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_ok(OK_VERIFICATION);
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(
            VerificationPipeline::builder()
                .gateway(gateway)
                .store(store.clone())
                .session(Arc::new(StaticSession::with_token("tok")))
                .build()
                .unwrap(),
        );

        let receipt = pipeline
            .record_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap();
        assert!(receipt.first_submission);

        let result = pipeline
            .spawn_verification(receipt)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(result.submission_id, "sub-1");
        assert!(store.load_result("sub-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn builder_requires_gateway_and_store() {
        let err = VerificationPipeline::builder().build().unwrap_err();
        assert!(matches!(err, PipelineError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn pipeline_and_receipt_are_debuggable() {
        let f = fixture();
        let receipt = f
            .pipeline
            .record_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap();

        let debug = format!("{:?} {receipt:?}", f.pipeline);
        assert!(debug.contains("VerificationPipeline"));
        assert!(debug.contains("sub-1"));
    }

    /// Store that parks one `load_record` call so a test can interleave an
    /// upload with a verification commit.
    struct GatedStore {
        inner: MemoryStore,
        armed: AtomicBool,
        parked: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                armed: AtomicBool::new(false),
                parked: tokio::sync::Notify::new(),
                release: tokio::sync::Notify::new(),
            }
        }

        /// Park the next `load_record` call until released.
        fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl RecordStore for GatedStore {
        async fn insert_submission(
            &self,
            submission: &DocumentSubmission,
        ) -> Result<(), StoreError> {
            self.inner.insert_submission(submission).await
        }

        async fn latest_submission(
            &self,
            company_id: &str,
            requirement_id: &str,
        ) -> Result<Option<DocumentSubmission>, StoreError> {
            self.inner.latest_submission(company_id, requirement_id).await
        }

        async fn load_record(
            &self,
            company_id: &str,
        ) -> Result<Option<VerificationRecord>, StoreError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            self.inner.load_record(company_id).await
        }

        async fn save_record(&self, record: &VerificationRecord) -> Result<(), StoreError> {
            self.inner.save_record(record).await
        }

        async fn insert_result(&self, result: &VerificationResult) -> Result<(), StoreError> {
            self.inner.insert_result(result).await
        }

        async fn load_result(
            &self,
            submission_id: &str,
        ) -> Result<Option<VerificationResult>, StoreError> {
            self.inner.load_result(submission_id).await
        }

        async fn external_signals(&self, company_id: &str) -> Result<ExternalSignals, StoreError> {
            self.inner.external_signals(company_id).await
        }
    }

    #[tokio::test]
    async fn upload_cannot_interleave_with_a_verification_commit() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_ok(OK_VERIFICATION);
        gateway.push_ok(OK_VERIFICATION);
        let store = Arc::new(GatedStore::new());
        let pipeline = Arc::new(
            VerificationPipeline::builder()
                .gateway(gateway)
                .store(store.clone())
                .session(Arc::new(StaticSession::with_token("tok")))
                .build()
                .unwrap(),
        );

        let receipt = pipeline
            .record_upload(submission("sub-1", "kyc"), context())
            .await
            .unwrap();

        // Park the verification inside its commit section, after the
        // staleness check passed.
        store.arm();
        let verification = pipeline.spawn_verification(receipt);
        store.parked.notified().await;

        // An upload landing mid-commit must wait for the commit to finish;
        // committing against its pending state would corrupt it.
        let upload = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .record_upload(submission("sub-2", "kyc"), context())
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(store.inner.submission_count(), 1);

        store.release.notify_one();
        let committed = verification.await.unwrap().unwrap();
        assert!(committed.is_some());
        assert!(store.inner.load_result("sub-1").await.unwrap().is_some());

        // The late upload then supersedes cleanly: its own verification
        // commits without an invalid transition.
        let receipt = upload.await.unwrap().unwrap();
        let result = pipeline.run_verification(receipt).await.unwrap();
        assert!(result.is_some());

        let record = store.inner.load_record("co-1").await.unwrap().unwrap();
        assert_eq!(record.status("kyc").unwrap(), RequirementStatus::AiReviewed);
        assert!(store.inner.load_result("sub-2").await.unwrap().is_some());
    }
}
