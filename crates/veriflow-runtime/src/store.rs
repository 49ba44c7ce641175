//! Persistence seam for records, submissions, and results.
//!
//! Unlike everything on the AI path, persistence failures ARE surfaced:
//! a lost write threatens data integrity and the caller must see it
//! ("document uploaded but failed to save" retries or alerts, it never
//! silently drops). The real store lives outside this crate; [`MemoryStore`]
//! backs tests and the CLI's offline mode.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use veriflow_core::{
    DocumentSubmission, ExternalSignals, VerificationRecord, VerificationResult,
};

/// Errors from the persistence layer. These propagate to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("persistence failure: {0}")]
    Io(String),

    #[error("no verification record for company {0}")]
    RecordMissing(String),

    #[error("result already recorded for submission {0}")]
    DuplicateResult(String),
}

/// Storage contract the pipeline drives.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new submission. Submissions are append-only.
    async fn insert_submission(&self, submission: &DocumentSubmission) -> Result<(), StoreError>;

    /// The most recent submission for a requirement, if any.
    async fn latest_submission(
        &self,
        company_id: &str,
        requirement_id: &str,
    ) -> Result<Option<DocumentSubmission>, StoreError>;

    /// Load a company's verification record.
    async fn load_record(&self, company_id: &str)
        -> Result<Option<VerificationRecord>, StoreError>;

    /// Persist a company's verification record.
    async fn save_record(&self, record: &VerificationRecord) -> Result<(), StoreError>;

    /// Persist a verification result. Results are immutable: a second write
    /// for the same submission is a [`StoreError::DuplicateResult`].
    async fn insert_result(&self, result: &VerificationResult) -> Result<(), StoreError>;

    /// Load the result for one submission, if recorded.
    async fn load_result(
        &self,
        submission_id: &str,
    ) -> Result<Option<VerificationResult>, StoreError>;

    /// Marketplace behavioral signals for trust scoring.
    async fn external_signals(&self, company_id: &str) -> Result<ExternalSignals, StoreError>;
}

#[derive(Default)]
struct MemoryStoreInner {
    submissions: Vec<DocumentSubmission>,
    records: HashMap<String, VerificationRecord>,
    results: HashMap<String, VerificationResult>,
    signals: HashMap<String, ExternalSignals>,
}

/// In-memory [`RecordStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed behavioral signals for a company.
    pub fn set_signals(&self, company_id: impl Into<String>, signals: ExternalSignals) {
        self.inner.write().signals.insert(company_id.into(), signals);
    }

    /// Number of submissions recorded (test helper).
    pub fn submission_count(&self) -> usize {
        self.inner.read().submissions.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_submission(&self, submission: &DocumentSubmission) -> Result<(), StoreError> {
        self.inner.write().submissions.push(submission.clone());
        Ok(())
    }

    async fn latest_submission(
        &self,
        company_id: &str,
        requirement_id: &str,
    ) -> Result<Option<DocumentSubmission>, StoreError> {
        Ok(self
            .inner
            .read()
            .submissions
            .iter()
            .rev()
            .find(|s| s.company_id == company_id && s.requirement_id == requirement_id)
            .cloned())
    }

    async fn load_record(
        &self,
        company_id: &str,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        Ok(self.inner.read().records.get(company_id).cloned())
    }

    async fn save_record(&self, record: &VerificationRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .records
            .insert(record.company_id.clone(), record.clone());
        Ok(())
    }

    async fn insert_result(&self, result: &VerificationResult) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.results.contains_key(&result.submission_id) {
            return Err(StoreError::DuplicateResult(result.submission_id.clone()));
        }
        inner
            .results
            .insert(result.submission_id.clone(), result.clone());
        Ok(())
    }

    async fn load_result(
        &self,
        submission_id: &str,
    ) -> Result<Option<VerificationResult>, StoreError> {
        Ok(self.inner.read().results.get(submission_id).cloned())
    }

    async fn external_signals(&self, company_id: &str) -> Result<ExternalSignals, StoreError> {
        Ok(self
            .inner
            .read()
            .signals
            .get(company_id)
            .copied()
            .unwrap_or_default())
    }
}
