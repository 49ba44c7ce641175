//! Prompt templates for verification and comparison calls.
//!
//! Templates are pure functions keyed by `(document_type, has_previous)`,
//! unit-testable without any network. Every interpolated value passes
//! through [`sanitize_field`] first so uploaded metadata can't smuggle
//! instructions into the prompt.
//!
//! The system prompts pin the model to a strict JSON output format; the
//! schema enforcer is the safety net when it strays anyway.

use lazy_static::lazy_static;
use regex::Regex;

use veriflow_core::{CompanyContext, DocumentType};

/// Longest value we will embed from caller-supplied metadata.
const MAX_FIELD_LEN: usize = 300;

lazy_static! {
    /// ASCII control characters and DEL, which have no business in a prompt.
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x1f\x7f]+").expect("invalid regex");
}

/// System prompt for document verification calls.
pub const VERIFICATION_SYSTEM_PROMPT: &str = r#"
You are a compliance document analyst for a B2B marketplace.

Your role is to extract facts from one uploaded business document and check
them against the company's registration details.
You do not approve or reject companies - a human reviewer does that.
You report what the document shows, flag what looks wrong, and say what you
could not read.

## Rules
1. Extract only what is visibly present in the document
2. Never invent field values; use null for anything unreadable
3. Report concerns as issues, not as a verdict
4. Confidence reflects how clearly the document supports your reading

## Output Format (JSON, no surrounding prose)
{
  "verified": true | false,
  "confidence": 0.0-1.0,
  "matches_previous": true | false,
  "document_type_match": true | false,
  "extracted_info": { "field_name": "value or null" },
  "issues": ["concrete problem observed"],
  "recommendations": ["actionable follow-up for the uploader"],
  "summary": "two sentences at most"
}

## Reminder
Your output is advisory input to a human review. Uncertainty is a valid
outcome; say so in the issues list rather than guessing.
"#;

/// System prompt for document comparison calls.
pub const COMPARISON_SYSTEM_PROMPT: &str = r#"
You are a compliance document analyst comparing two submissions of the same
document requirement for one company.

Decide whether the new submission matches the prior one, is a newer version
of the same underlying document, or describes different facts entirely.

## Rules
1. Compare extracted facts (names, numbers, dates), not file cosmetics
2. List concrete differences and similarities; quote what you compared
3. A renewed document with the same facts is an updated version, not a conflict

## Output Format (JSON, no surrounding prose)
{
  "matches": true | false,
  "confidence": 0.0-1.0,
  "differences": ["concrete difference"],
  "similarities": ["concrete similarity"],
  "is_same_document": true | false,
  "is_updated_version": true | false,
  "summary": "two sentences at most"
}
"#;

/// Scrub a caller-supplied value before embedding it in a prompt: control
/// characters out, whitespace collapsed at the edges, length bounded.
pub fn sanitize_field(value: &str) -> String {
    let cleaned = CONTROL_CHARS.replace_all(value, " ");
    let cleaned = cleaned.trim();
    let mut out: String = cleaned.chars().take(MAX_FIELD_LEN).collect();
    if cleaned.chars().count() > MAX_FIELD_LEN {
        out.push('…');
    }
    out
}

/// Build the user prompt for a verification call.
pub fn verification_prompt(
    document_type: DocumentType,
    file_url: &str,
    context: &CompanyContext,
    has_previous: bool,
) -> String {
    let mut prompt = format!(
        "Document type: {} ({})\nDocument URL: {}\nCompany name on file: {}\n",
        document_type.as_str(),
        document_type.label(),
        sanitize_field(file_url),
        sanitize_field(&context.company_name),
    );

    if let Some(business_id) = &context.business_id_number {
        prompt.push_str(&format!(
            "Business id number on file: {}\n",
            sanitize_field(business_id)
        ));
    }
    if let Some(country) = &context.country_of_registration {
        prompt.push_str(&format!(
            "Country of registration on file: {}\n",
            sanitize_field(country)
        ));
    }

    if has_previous {
        prompt.push_str(
            "\nA previous submission exists for this requirement; a separate \
             comparison will run. Focus on what this document itself shows.\n",
        );
    } else {
        prompt.push_str("\nThis is the first submission for this requirement.\n");
    }

    prompt.push_str("\nAnalyze the document and respond in the required JSON format.");
    prompt
}

/// Build the user prompt for a comparison call.
pub fn comparison_prompt(
    document_type: DocumentType,
    current_url: &str,
    previous_url: &str,
) -> String {
    format!(
        "Document type: {} ({})\nNew submission URL: {}\nPrior submission URL: {}\n\n\
         Compare the two documents and respond in the required JSON format.",
        document_type.as_str(),
        document_type.label(),
        sanitize_field(current_url),
        sanitize_field(previous_url),
    )
}
