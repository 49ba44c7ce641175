//! Verification orchestrator.
//!
//! Drives extraction and verification for one submission. The defining
//! property of this component is that it never raises: **AI unavailability
//! must never block a business transaction**. The upload already succeeded
//! independently; verification is best-effort enrichment layered on top,
//! and every failure on the AI path (auth, budget, timeout, HTTP, rate
//! limit, unusable output) resolves to one documented fallback result that
//! routes the submission to manual review.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use veriflow_core::{
    clamp_confidence, CompanyContext, DocumentSubmission, DocumentType, VerificationResult,
};

use crate::comparison::ComparisonEngine;
use crate::config::CallParams;
use crate::gateway::{ModelGateway, ModelRequest};
use crate::prompts::{verification_prompt, VERIFICATION_SYSTEM_PROMPT};
use crate::schema::enforce;

/// Verification wire schema: the default shape the enforcer guarantees.
///
/// As with comparison, the defaults ARE the manual-review fallback values,
/// so unusable model output and gateway failures land on the same result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct VerificationOutcome {
    pub verified: bool,
    pub confidence: f64,
    pub matches_previous: bool,
    pub document_type_match: bool,
    pub extracted_info: BTreeMap<String, Option<String>>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub summary: String,
}

impl Default for VerificationOutcome {
    fn default() -> Self {
        Self {
            verified: false,
            confidence: 0.5,
            matches_previous: false,
            document_type_match: true,
            extracted_info: BTreeMap::new(),
            issues: vec!["Unable to analyze document - manual review required".to_string()],
            recommendations: vec!["Please ensure document is clear and readable".to_string()],
            summary: "Document uploaded but requires manual verification".to_string(),
        }
    }
}

/// Runs AI-assisted verification for single submissions.
pub struct VerificationOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    comparison: ComparisonEngine,
    params: CallParams,
}

impl VerificationOrchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, params: CallParams) -> Self {
        let comparison = ComparisonEngine::new(gateway.clone(), params);
        Self {
            gateway,
            comparison,
            params,
        }
    }

    /// Verify one submission. Infallible: all paths produce a well-formed
    /// [`VerificationResult`], produced exactly once per submission.
    ///
    /// When `previous` exists, the comparison engine runs and its output is
    /// attached; `matches_previous` then reflects the comparison verdict.
    pub async fn verify(
        &self,
        submission: &DocumentSubmission,
        previous: Option<&DocumentSubmission>,
        document_type: DocumentType,
        context: &CompanyContext,
        token: Option<&SecretString>,
    ) -> VerificationResult {
        let request = ModelRequest {
            system_prompt: VERIFICATION_SYSTEM_PROMPT.to_string(),
            user_prompt: verification_prompt(
                document_type,
                &submission.file_url,
                context,
                previous.is_some(),
            ),
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
        };

        let outcome = match self.gateway.call(&request, token).await {
            Ok(reply) => enforce(&reply.content, VerificationOutcome::default()),
            Err(error) => {
                tracing::warn!(
                    submission_id = %submission.id,
                    %error,
                    "verification call failed, routing to manual review"
                );
                // Fallback-first: return immediately, no comparison attempt
                // against a service we just watched fail.
                return Self::compose(&submission.id, VerificationOutcome::default(), None);
            }
        };

        let comparison = match previous {
            Some(previous) => Some(
                self.comparison
                    .compare(submission, previous, document_type, token)
                    .await,
            ),
            None => None,
        };

        Self::compose(&submission.id, outcome, comparison)
    }

    fn compose(
        submission_id: &str,
        outcome: VerificationOutcome,
        comparison: Option<veriflow_core::ComparisonResult>,
    ) -> VerificationResult {
        let mut issues = outcome.issues;
        if !outcome.document_type_match {
            issues.push("Document does not appear to match the expected type".to_string());
        }

        let matches_previous = comparison
            .as_ref()
            .map(|c| c.matches)
            .unwrap_or(false);

        VerificationResult {
            submission_id: submission_id.to_string(),
            verified: outcome.verified,
            confidence: clamp_confidence(outcome.confidence),
            extracted_fields: outcome.extracted_info,
            issues,
            recommendations: outcome.recommendations,
            summary: outcome.summary,
            matches_previous,
            comparison,
        }
    }
}
