// ⚖️ Outcomes - One terminal result per verified candidate
// Authoritative answers (Valid / Invalid / InvalidFormat) are kept strictly
// apart from uncertain ones (ServiceUnavailable / Error).

use crate::fraud::{FraudAssessment, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ATTEMPT TRAIL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// POST with the caller's own identity
    Authenticated,
    /// Plain GET lookup
    Anonymous,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Authenticated => "authenticated",
            Phase::Anonymous => "anonymous",
        }
    }
}

/// One request made while verifying a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub phase: Phase,
    /// 1-based attempt number within the phase
    pub attempt: u32,
    pub method: String,
    pub target: String,
    /// Short description of what came back
    pub summary: String,
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} #{}] {} {} -> {}",
            self.phase.as_str(),
            self.attempt,
            self.method,
            self.target,
            self.summary
        )
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Outcome {
    /// Registry confirmed the registration
    Valid {
        name: Option<String>,
        address: Option<String>,
        requested_at: DateTime<Utc>,
        /// Only issued by the authenticated phase
        consultation_id: Option<String>,
    },

    /// Registry explicitly denied the identifier
    Invalid { detail: String },

    /// Failed the local pattern check; no request was made
    InvalidFormat { expected_pattern: String },

    /// Retry budget exhausted on transient failures - validity unknown
    ServiceUnavailable {
        detail: String,
        debug_trail: Vec<AttemptRecord>,
    },

    /// Unexpected failure inside the unit of work
    Error { detail: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Valid { .. } => "Valid",
            Outcome::Invalid { .. } => "Invalid",
            Outcome::InvalidFormat { .. } => "Format Error",
            Outcome::ServiceUnavailable { .. } => "Service Unavailable",
            Outcome::Error { .. } => "Error",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid { .. })
    }

    /// Valid, Invalid or InvalidFormat - the answer can be trusted
    pub fn is_authoritative(&self) -> bool {
        matches!(
            self,
            Outcome::Valid { .. } | Outcome::Invalid { .. } | Outcome::InvalidFormat { .. }
        )
    }

    /// Human-readable detail line
    pub fn detail(&self) -> String {
        match self {
            Outcome::Valid {
                name,
                consultation_id,
                ..
            } => {
                let name = name.as_deref().unwrap_or("---");
                match consultation_id {
                    Some(id) => format!("{} (consultation {})", name, id),
                    None => name.to_string(),
                }
            }
            Outcome::Invalid { detail } => detail.clone(),
            Outcome::InvalidFormat { expected_pattern } => {
                format!("Expected format: {}", expected_pattern)
            }
            Outcome::ServiceUnavailable { detail, .. } => detail.clone(),
            Outcome::Error { detail } => detail.clone(),
        }
    }

    /// Registry name of a valid outcome
    pub fn registry_name(&self) -> Option<&str> {
        match self {
            Outcome::Valid { name, .. } => name.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// VALIDATION RECORD
// ============================================================================

/// Outcome plus the candidate it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub origin_index: usize,
    pub country_code: String,
    pub number: String,
    pub declared_name: Option<String>,
    pub outcome: Outcome,
    pub fraud: Option<FraudAssessment>,
}

impl ValidationRecord {
    pub fn summary(&self) -> String {
        let mut line = format!(
            "#{} {}{} | {} | {}",
            self.origin_index + 1,
            self.country_code,
            self.number,
            self.outcome.label(),
            self.outcome.detail()
        );
        if let Some(fraud) = &self.fraud {
            line.push_str(&format!(" | name match {} ({})", fraud.score, fraud.risk.as_str()));
        }
        line
    }
}

// ============================================================================
// BATCH SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub invalid_format: usize,
    pub service_unavailable: usize,
    pub errors: usize,
    pub duplicates: usize,
    /// Records restored from a checkpoint instead of re-verified
    pub resumed: usize,
    pub verified_names: usize,
    pub check_manually: usize,
    pub potential_fraud: usize,
}

impl BatchSummary {
    pub fn from_records(records: &[ValidationRecord], duplicates: usize, resumed: usize) -> Self {
        let mut summary = BatchSummary {
            total: records.len(),
            duplicates,
            resumed,
            ..Default::default()
        };

        for record in records {
            match record.outcome {
                Outcome::Valid { .. } => summary.valid += 1,
                Outcome::Invalid { .. } => summary.invalid += 1,
                Outcome::InvalidFormat { .. } => summary.invalid_format += 1,
                Outcome::ServiceUnavailable { .. } => summary.service_unavailable += 1,
                Outcome::Error { .. } => summary.errors += 1,
            }

            match record.fraud.as_ref().map(|f| f.risk) {
                Some(RiskLevel::Verified) => summary.verified_names += 1,
                Some(RiskLevel::CheckManually) => summary.check_manually += 1,
                Some(RiskLevel::PotentialFraud) => summary.potential_fraud += 1,
                None => {}
            }
        }

        summary
    }

    /// Answers that can be trusted
    pub fn authoritative(&self) -> usize {
        self.valid + self.invalid + self.invalid_format
    }

    /// Answers that must be re-checked later
    pub fn uncertain(&self) -> usize {
        self.service_unavailable + self.errors
    }

    pub fn summary(&self) -> String {
        format!(
            "{} checked: {} valid, {} invalid, {} format errors | {} service unavailable, {} errors | {} duplicates removed",
            self.total,
            self.valid,
            self.invalid,
            self.invalid_format,
            self.service_unavailable,
            self.errors,
            self.duplicates
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, outcome: Outcome, fraud: Option<FraudAssessment>) -> ValidationRecord {
        ValidationRecord {
            origin_index: index,
            country_code: "DK".to_string(),
            number: format!("1000000{}", index),
            declared_name: None,
            outcome,
            fraud,
        }
    }

    fn valid() -> Outcome {
        Outcome::Valid {
            name: Some("LEGO System A/S".to_string()),
            address: None,
            requested_at: Utc::now(),
            consultation_id: None,
        }
    }

    #[test]
    fn test_summary_separates_authoritative_from_uncertain() {
        let records = vec![
            record(0, valid(), None),
            record(1, Outcome::Invalid { detail: "INVALID".into() }, None),
            record(2, Outcome::InvalidFormat { expected_pattern: "DK + 8 digits".into() }, None),
            record(
                3,
                Outcome::ServiceUnavailable {
                    detail: "HTTP 503 after 3 attempts".into(),
                    debug_trail: vec![],
                },
                None,
            ),
            record(4, Outcome::Error { detail: "panic".into() }, None),
        ];

        let summary = BatchSummary::from_records(&records, 2, 0);

        assert_eq!(summary.total, 5);
        assert_eq!(summary.authoritative(), 3);
        assert_eq!(summary.uncertain(), 2);
        assert_eq!(summary.duplicates, 2);
        assert!(summary.summary().contains("1 service unavailable"));
    }

    #[test]
    fn test_fraud_buckets_counted() {
        let records = vec![
            record(0, valid(), Some(FraudAssessment { score: 100, risk: RiskLevel::Verified })),
            record(1, valid(), Some(FraudAssessment { score: 10, risk: RiskLevel::PotentialFraud })),
            record(2, valid(), None),
        ];

        let summary = BatchSummary::from_records(&records, 0, 0);
        assert_eq!(summary.verified_names, 1);
        assert_eq!(summary.potential_fraud, 1);
        assert_eq!(summary.check_manually, 0);
    }

    #[test]
    fn test_outcome_serde_is_tagged() {
        let outcome = Outcome::Invalid {
            detail: "VAT number not found".into(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"Invalid\""));

        let parsed: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn test_record_summary_line() {
        let r = record(
            0,
            valid(),
            Some(FraudAssessment { score: 100, risk: RiskLevel::Verified }),
        );
        let line = r.summary();
        assert!(line.starts_with("#1 DK10000000 | Valid | LEGO System A/S"));
        assert!(line.ends_with("name match 100 (Verified)"));
    }
}
