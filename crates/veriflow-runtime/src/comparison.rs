//! Document comparison engine.
//!
//! Classifies a new submission against the prior one for the same
//! requirement: same document, updated version, or different facts. Same
//! fallback-first discipline as verification: every gateway failure
//! resolves to a documented default and nothing propagates.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use veriflow_core::{clamp_confidence, ComparisonResult, DocumentSubmission, DocumentType};

use crate::config::CallParams;
use crate::gateway::{ModelGateway, ModelRequest};
use crate::prompts::{comparison_prompt, COMPARISON_SYSTEM_PROMPT};
use crate::schema::enforce;

/// Comparison wire schema: the default shape the enforcer guarantees.
///
/// The defaults ARE the fallback values, so a gateway failure and
/// unusable model output land on the same documented result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ComparisonOutcome {
    pub matches: bool,
    pub confidence: f64,
    pub differences: Vec<String>,
    pub similarities: Vec<String>,
    pub is_same_document: bool,
    pub is_updated_version: bool,
    pub summary: String,
}

impl Default for ComparisonOutcome {
    fn default() -> Self {
        Self {
            matches: false,
            confidence: 0.5,
            differences: vec!["Unable to compare - manual review required".to_string()],
            similarities: vec![],
            is_same_document: false,
            is_updated_version: false,
            summary: "Documents require manual comparison".to_string(),
        }
    }
}

impl From<ComparisonOutcome> for ComparisonResult {
    fn from(outcome: ComparisonOutcome) -> Self {
        Self {
            matches: outcome.matches,
            confidence: clamp_confidence(outcome.confidence),
            is_same_document: outcome.is_same_document,
            is_updated_version: outcome.is_updated_version,
            differences: outcome.differences,
            similarities: outcome.similarities,
            summary: outcome.summary,
        }
    }
}

/// Compares two submissions of the same requirement.
pub struct ComparisonEngine {
    gateway: Arc<dyn ModelGateway>,
    params: CallParams,
}

impl ComparisonEngine {
    pub fn new(gateway: Arc<dyn ModelGateway>, params: CallParams) -> Self {
        Self { gateway, params }
    }

    /// Compare `current` against `previous`. Infallible: every path
    /// produces a well-formed [`ComparisonResult`].
    ///
    /// If either file URL is missing there is nothing to compare and no
    /// model call is made.
    pub async fn compare(
        &self,
        current: &DocumentSubmission,
        previous: &DocumentSubmission,
        document_type: DocumentType,
        token: Option<&SecretString>,
    ) -> ComparisonResult {
        if current.file_url.is_empty() || previous.file_url.is_empty() {
            return ComparisonResult {
                matches: false,
                confidence: 0.0,
                is_same_document: false,
                is_updated_version: false,
                differences: vec!["no previous document".to_string()],
                similarities: vec![],
                summary: "no previous document on file".to_string(),
            };
        }

        let request = ModelRequest {
            system_prompt: COMPARISON_SYSTEM_PROMPT.to_string(),
            user_prompt: comparison_prompt(document_type, &current.file_url, &previous.file_url),
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
        };

        match self.gateway.call(&request, token).await {
            Ok(reply) => enforce(&reply.content, ComparisonOutcome::default()).into(),
            Err(error) => {
                tracing::warn!(
                    submission_id = %current.id,
                    %error,
                    "comparison call failed, falling back to manual comparison"
                );
                ComparisonOutcome::default().into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use crate::gateway::GatewayError;
    use chrono::Utc;

    fn submission(id: &str, url: &str) -> DocumentSubmission {
        DocumentSubmission {
            id: id.to_string(),
            company_id: "co-1".to_string(),
            requirement_id: "kyc".to_string(),
            file_url: url.to_string(),
            uploaded_at: Utc::now(),
        }
    }

    fn engine(gateway: Arc<ScriptedGateway>) -> ComparisonEngine {
        ComparisonEngine::new(gateway, CallParams::default())
    }

    fn token() -> SecretString {
        SecretString::from("tok")
    }

    #[tokio::test]
    async fn missing_url_short_circuits_without_model_call() {
        let gateway = Arc::new(ScriptedGateway::new());
        let engine = engine(gateway.clone());

        let result = engine
            .compare(
                &submission("a", "https://files/a.pdf"),
                &submission("b", ""),
                DocumentType::Kyc,
                Some(&token()),
            )
            .await;

        assert!(!result.matches);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.differences, vec!["no previous document".to_string()]);
        assert!(!result.is_same_document);
        assert!(!result.is_updated_version);
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn gateway_failure_falls_back_to_manual_comparison() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_err(GatewayError::Timeout(std::time::Duration::from_secs(15)));
        let engine = engine(gateway.clone());

        let result = engine
            .compare(
                &submission("a", "https://files/a.pdf"),
                &submission("b", "https://files/b.pdf"),
                DocumentType::Kyc,
                Some(&token()),
            )
            .await;

        assert!(!result.matches);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(
            result.differences,
            vec!["Unable to compare - manual review required".to_string()]
        );
        assert_eq!(result.summary, "Documents require manual comparison");
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn model_answer_is_enforced_and_clamped() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_ok(
            r#"{"matches": false, "confidence": 1.8,
                "differences": ["company name changed"],
                "similarities": ["same registration number"],
                "is_same_document": false, "is_updated_version": true,
                "summary": "Renamed entity"}"#,
        );
        let engine = engine(gateway.clone());

        let result = engine
            .compare(
                &submission("a", "https://files/a.pdf"),
                &submission("b", "https://files/b.pdf"),
                DocumentType::BusinessRegistration,
                Some(&token()),
            )
            .await;

        assert!(!result.matches);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.differences, vec!["company name changed".to_string()]);
        assert!(result.is_updated_version);
    }
}
