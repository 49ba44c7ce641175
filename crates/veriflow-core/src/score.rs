//! Deterministic trust-score aggregation.
//!
//! The score is derived, never authoritative: it is recomputed on every
//! state change and must always be reproducible from the record and the
//! marketplace signals alone. The weights are part of the contract and are
//! implemented exactly so tests are reproducible.

use std::collections::BTreeMap;

use crate::state::{OverallStatus, VerificationRecord};
use crate::types::{ExternalSignals, RequirementCatalog, TrustScore};

const BASE: f64 = 50.0;
const VERIFIED_BONUS: f64 = 30.0;
const SIGNAL_CAP: f64 = 10.0;

/// Computes the 0-100 trust score for a company.
#[derive(Debug, Clone, Default)]
pub struct TrustScoreAggregator;

impl TrustScoreAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Score a company from its verification record and behavioral signals.
    ///
    /// ```text
    /// base           = 50
    /// verified_bonus = 30 if overall status is verified else 0
    /// response_bonus = min(response_rate / 10, 10)
    /// order_bonus    = min(total_orders / 10, 10)
    /// score          = clamp(round(sum), 0, 100)
    /// ```
    ///
    /// Holding signals fixed, moving any required requirement to `Verified`
    /// never decreases the score.
    pub fn score(
        &self,
        record: &VerificationRecord,
        catalog: &RequirementCatalog,
        signals: &ExternalSignals,
    ) -> TrustScore {
        let verified_bonus = if record.overall_status(catalog) == OverallStatus::Verified {
            VERIFIED_BONUS
        } else {
            0.0
        };
        let response_bonus = (signals.response_rate / 10.0).min(SIGNAL_CAP);
        let order_bonus = (f64::from(signals.total_orders) / 10.0).min(SIGNAL_CAP);

        let raw = BASE + verified_bonus + response_bonus + order_bonus;
        let score = raw.round().clamp(0.0, 100.0) as u8;

        let factors = BTreeMap::from([
            ("base".to_string(), BASE),
            ("verified_bonus".to_string(), verified_bonus),
            ("response_bonus".to_string(), response_bonus),
            ("order_bonus".to_string(), order_bonus),
        ]);

        tracing::debug!(company_id = %record.company_id, score, "trust score computed");

        TrustScore {
            company_id: record.company_id.clone(),
            score,
            factors,
        }
    }
}
