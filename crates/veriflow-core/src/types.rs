//! Core data model for the verification pipeline.
//!
//! Everything here is plain data: serde-derived, cloneable, and free of any
//! network or async concern. The runtime crate layers AI-assisted behavior on
//! top of these types; this crate never calls out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Clamp a model-reported confidence into `[0, 1]`.
///
/// Model output is untrusted: values may be negative, above one, or NaN.
/// NaN clamps to zero (no evidence is the safest reading of "not a number").
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// The closed set of document types the verification checklist tracks.
///
/// The catalog is fixed at compile time; there is no runtime registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    BusinessRegistration,
    Kyc,
    BankStatement,
}

impl DocumentType {
    /// Wire name, as used in persisted records and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessRegistration => "business_registration",
            Self::Kyc => "kyc",
            Self::BankStatement => "bank_statement",
        }
    }

    /// Human-readable label for prompts and operator output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BusinessRegistration => "business registration certificate",
            Self::Kyc => "KYC identity document",
            Self::BankStatement => "bank statement or proof of account",
        }
    }

    /// All document types, in catalog order.
    pub fn all() -> [DocumentType; 3] {
        [
            Self::BusinessRegistration,
            Self::Kyc,
            Self::BankStatement,
        ]
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verification checklist item, tracked independently per company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequirement {
    /// Stable requirement id (matches the document type's wire name).
    pub id: String,

    /// The document type this requirement accepts.
    pub document_type: DocumentType,

    /// Whether this requirement gates overall verification.
    pub required: bool,
}

/// The fixed requirement catalog. Immutable at runtime.
#[derive(Debug, Clone)]
pub struct RequirementCatalog {
    requirements: Vec<VerificationRequirement>,
}

impl RequirementCatalog {
    /// The standard KYB checklist: registration, KYC, and bank proof,
    /// all required.
    pub fn standard() -> Self {
        let requirements = DocumentType::all()
            .into_iter()
            .map(|document_type| VerificationRequirement {
                id: document_type.as_str().to_string(),
                document_type,
                required: true,
            })
            .collect();

        Self { requirements }
    }

    /// Build a custom catalog (e.g. for jurisdictions with optional items).
    pub fn new(requirements: Vec<VerificationRequirement>) -> Self {
        Self { requirements }
    }

    /// Look up a requirement by id.
    pub fn get(&self, id: &str) -> Option<&VerificationRequirement> {
        self.requirements.iter().find(|r| r.id == id)
    }

    /// All requirements, in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &VerificationRequirement> {
        self.requirements.iter()
    }

    /// Only the requirements that gate overall verification.
    pub fn required(&self) -> impl Iterator<Item = &VerificationRequirement> {
        self.requirements.iter().filter(|r| r.required)
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

/// One uploaded document. Created on each upload, never mutated; a later
/// upload for the same requirement supersedes (but does not delete) it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSubmission {
    /// Unique submission id.
    pub id: String,

    /// Company the document belongs to.
    pub company_id: String,

    /// Requirement this submission addresses.
    pub requirement_id: String,

    /// Stable URL returned by the storage collaborator. Opaque here.
    pub file_url: String,

    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
}

/// Company facts embedded into verification prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyContext {
    /// Registered company name.
    pub company_name: String,

    /// Business/registration id number, if known.
    #[serde(default)]
    pub business_id_number: Option<String>,

    /// ISO country of registration, if known.
    #[serde(default)]
    pub country_of_registration: Option<String>,
}

/// Outcome of comparing a new submission against the prior one for the
/// same requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Whether the documents describe the same underlying facts.
    pub matches: bool,

    /// Comparison confidence, clamped to `[0, 1]`.
    pub confidence: f64,

    /// The two files appear to be the same document.
    pub is_same_document: bool,

    /// The new file is a newer version of the prior document.
    pub is_updated_version: bool,

    /// Concrete differences observed.
    pub differences: Vec<String>,

    /// Concrete similarities observed.
    pub similarities: Vec<String>,

    /// Short narrative for the admin review surface.
    pub summary: String,
}

/// The outcome of AI-assisted verification for one submission.
///
/// Produced exactly once per submission and immutable once written; a
/// resubmission produces a new result rather than editing this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// The submission this result describes.
    pub submission_id: String,

    /// Advisory verdict. Never finalizes a requirement on its own; the
    /// admin decision does that.
    pub verified: bool,

    /// Verification confidence, clamped to `[0, 1]`.
    pub confidence: f64,

    /// Fields extracted from the document. `None` marks a field the model
    /// looked for but could not read.
    pub extracted_fields: BTreeMap<String, Option<String>>,

    /// Problems the review should know about.
    pub issues: Vec<String>,

    /// Suggested follow-ups for the uploader.
    pub recommendations: Vec<String>,

    /// Short narrative for the admin review surface.
    pub summary: String,

    /// Whether this submission matches the previous one (false when there
    /// was no previous submission).
    pub matches_previous: bool,

    /// Full comparison output, present only when a prior submission existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonResult>,
}

/// Behavioral signals supplied by the marketplace, used in trust scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalSignals {
    /// Response rate as a percentage in `[0, 100]`.
    pub response_rate: f64,

    /// Lifetime completed order count.
    pub total_orders: u32,
}

/// A derived 0-100 reputation signal. Never ground truth on its own: it is
/// recomputed from its inputs on every state change and must always be
/// reproducible from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    /// Company the score describes.
    pub company_id: String,

    /// Final score in `[0, 100]`.
    pub score: u8,

    /// The individual components that produced the score.
    pub factors: BTreeMap<String, f64>,
}
