//! veriflow command-line interface.
//!
//! Thin operator shell over the runtime pipeline: verify a document,
//! compare two versions, score a stored record, or list the requirement
//! catalog. Gateway settings come from an optional YAML file; the session
//! token comes from `VERIFLOW_SESSION_TOKEN`. Without a token the AI path
//! is disabled and verification prints the manual-review fallback, which
//! is the documented behavior, not an error.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use veriflow_core::{
    CompanyContext, DocumentSubmission, DocumentType, ExternalSignals, RequirementCatalog,
    TrustScoreAggregator, VerificationRecord,
};
use veriflow_runtime::{
    CallParams, ComparisonEngine, GatewayConfig, HttpModelGateway, MemoryStore, RecordStore,
    SecretString, StaticSession, VerificationPipeline,
};

#[derive(Parser)]
#[command(name = "veriflow", version, about = "AI-assisted document verification")]
struct Cli {
    /// YAML config file for the model gateway.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the verification requirement catalog.
    Requirements,

    /// Run one document upload through the verification pipeline.
    Verify {
        /// Company id.
        #[arg(long)]
        company: String,

        /// Registered company name.
        #[arg(long)]
        name: String,

        /// Requirement id (e.g. kyc, business_registration, bank_statement).
        #[arg(long)]
        requirement: String,

        /// URL of the uploaded document.
        #[arg(long)]
        file_url: String,

        /// URL of the previously accepted document, if resubmitting.
        #[arg(long)]
        previous_url: Option<String>,

        /// Business/registration id number, if known.
        #[arg(long)]
        business_id: Option<String>,

        /// ISO country of registration, if known.
        #[arg(long)]
        country: Option<String>,
    },

    /// Compare a document against a previous version of itself.
    Compare {
        /// Document type (business_registration, kyc, bank_statement).
        #[arg(long)]
        document_type: String,

        /// URL of the new document.
        #[arg(long)]
        current_url: String,

        /// URL of the previous document.
        #[arg(long)]
        previous_url: String,
    },

    /// Print a record's per-requirement and overall status.
    Check {
        /// Path to a verification record file (YAML or JSON).
        #[arg(long)]
        record: PathBuf,
    },

    /// Compute the trust score for a stored verification record.
    Score {
        /// Path to a verification record JSON file.
        #[arg(long)]
        record: PathBuf,

        /// Marketplace response rate, as a percentage.
        #[arg(long, default_value_t = 0.0)]
        response_rate: f64,

        /// Lifetime completed order count.
        #[arg(long, default_value_t = 0)]
        total_orders: u32,
    },
}

/// On-disk gateway configuration. Every field optional; absent fields keep
/// the built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_calls: Option<u32>,
}

impl FileConfig {
    fn load(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(max_calls) = self.max_calls {
            config.max_calls = max_calls;
        }
        config
    }
}

fn session_token() -> Option<String> {
    std::env::var("VERIFLOW_SESSION_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
}

fn parse_document_type(raw: &str) -> Result<DocumentType> {
    DocumentType::all()
        .into_iter()
        .find(|t| t.as_str() == raw)
        .with_context(|| format!("unknown document type: {raw}"))
}

fn submission_id() -> String {
    format!("sub-{}", Utc::now().timestamp_millis())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_verify(
    config: GatewayConfig,
    company: String,
    name: String,
    requirement: String,
    file_url: String,
    previous_url: Option<String>,
    business_id: Option<String>,
    country: Option<String>,
) -> Result<()> {
    let token = session_token();
    if token.is_none() {
        tracing::warn!("VERIFLOW_SESSION_TOKEN not set, verification will route to manual review");
    }

    let gateway = Arc::new(HttpModelGateway::new(config));
    let store = Arc::new(MemoryStore::new());

    // A prior document seeds the store so the pipeline runs comparison.
    if let Some(previous_url) = previous_url {
        store
            .insert_submission(&DocumentSubmission {
                id: submission_id(),
                company_id: company.clone(),
                requirement_id: requirement.clone(),
                file_url: previous_url,
                uploaded_at: Utc::now(),
            })
            .await?;
    }

    let session = match token {
        Some(token) => StaticSession::with_token(token),
        None => StaticSession::anonymous(),
    };

    let pipeline = VerificationPipeline::builder()
        .gateway(gateway)
        .store(store)
        .session(Arc::new(session))
        .build()?;

    let submission = DocumentSubmission {
        id: submission_id(),
        company_id: company,
        requirement_id: requirement,
        file_url,
        uploaded_at: Utc::now(),
    };
    let context = CompanyContext {
        company_name: name,
        business_id_number: business_id,
        country_of_registration: country,
    };

    let result = pipeline
        .handle_upload(submission, context)
        .await?
        .context("verification result was superseded")?;
    print_json(&result)
}

async fn run_compare(
    config: GatewayConfig,
    document_type: String,
    current_url: String,
    previous_url: String,
) -> Result<()> {
    let document_type = parse_document_type(&document_type)?;
    let token = session_token().map(SecretString::from);
    let gateway = Arc::new(HttpModelGateway::new(config));
    let engine = ComparisonEngine::new(gateway, CallParams::default());

    let current = DocumentSubmission {
        id: submission_id(),
        company_id: "cli".to_string(),
        requirement_id: document_type.as_str().to_string(),
        file_url: current_url,
        uploaded_at: Utc::now(),
    };
    let previous = DocumentSubmission {
        file_url: previous_url,
        ..current.clone()
    };

    let result = engine
        .compare(&current, &previous, document_type, token.as_ref())
        .await;
    print_json(&result)
}

fn load_record(path: &PathBuf) -> Result<VerificationRecord> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading record file {}", path.display()))?;
    // YAML is a superset of JSON, so either format parses here.
    serde_yaml::from_str(&raw).context("parsing verification record")
}

fn run_check(record: PathBuf) -> Result<()> {
    let record = load_record(&record)?;
    let catalog = RequirementCatalog::standard();

    println!("company: {}", record.company_id);
    for (id, status) in record.statuses() {
        println!("  {:24} {:?}", id, status);
    }
    println!("overall: {:?}", record.overall_status(&catalog));
    Ok(())
}

fn run_score(record: PathBuf, response_rate: f64, total_orders: u32) -> Result<()> {
    let record = load_record(&record)?;

    let score = TrustScoreAggregator::new().score(
        &record,
        &RequirementCatalog::standard(),
        &ExternalSignals {
            response_rate,
            total_orders,
        },
    );
    print_json(&score)
}

fn run_requirements() {
    let catalog = RequirementCatalog::standard();
    for requirement in catalog.iter() {
        let gate = if requirement.required {
            "required"
        } else {
            "optional"
        };
        println!(
            "{:24} {:10} {}",
            requirement.id,
            gate,
            requirement.document_type.label()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FileConfig::load(cli.config.as_ref())?.gateway_config();

    match cli.command {
        Command::Requirements => {
            run_requirements();
            Ok(())
        }
        Command::Verify {
            company,
            name,
            requirement,
            file_url,
            previous_url,
            business_id,
            country,
        } => {
            run_verify(
                config,
                company,
                name,
                requirement,
                file_url,
                previous_url,
                business_id,
                country,
            )
            .await
        }
        Command::Compare {
            document_type,
            current_url,
            previous_url,
        } => run_compare(config, document_type, current_url, previous_url).await,
        Command::Check { record } => run_check(record),
        Command::Score {
            record,
            response_rate,
            total_orders,
        } => run_score(record, response_rate, total_orders),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_when_fields_absent() {
        let parsed: FileConfig = serde_yaml::from_str("model: gpt-4o\n").unwrap();
        let config = parsed.gateway_config();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.max_calls, 100);
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let parsed: Result<FileConfig, _> = serde_yaml::from_str("retries: 3\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn document_type_parsing_covers_the_catalog() {
        for document_type in DocumentType::all() {
            assert_eq!(
                parse_document_type(document_type.as_str()).unwrap(),
                document_type
            );
        }
        assert!(parse_document_type("invoice").is_err());
    }
}
