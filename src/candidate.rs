// 🧾 Candidates - Normalized input records for the validation engine
// The engine never parses spreadsheets; callers hand it candidates that are
// already split into country code + number.

use serde::{Deserialize, Serialize};

// ============================================================================
// CANDIDATE
// ============================================================================

/// One identifier to verify, as produced by the caller's normalizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Position in the caller's input (unique within a batch)
    pub origin_index: usize,

    /// Two-letter partition code (e.g. "DK", "EL", "XI")
    pub country_code: String,

    /// Alphanumeric number without the country prefix
    pub number: String,

    /// Registrant name as declared by the user (optional)
    pub declared_name: Option<String>,
}

impl Candidate {
    pub fn new(origin_index: usize, country_code: &str, number: &str) -> Self {
        Candidate {
            origin_index,
            country_code: country_code.to_string(),
            number: number.to_string(),
            declared_name: None,
        }
    }

    /// Builder pattern: attach the declared registrant name
    pub fn with_declared_name(mut self, name: impl Into<String>) -> Self {
        self.declared_name = Some(name.into());
        self
    }

    /// Build a candidate from a free-text VAT string such as "DK 13 59 85 62"
    ///
    /// Returns None when fewer than three significant characters remain.
    pub fn from_raw(origin_index: usize, raw: &str, declared_name: Option<String>) -> Option<Self> {
        let (country_code, number) = split_raw_identifier(raw)?;
        Some(Candidate {
            origin_index,
            country_code,
            number,
            declared_name: declared_name.filter(|n| !n.trim().is_empty()),
        })
    }

    /// Identifier used for deduplication and session hashing ("DK13598562")
    pub fn normalized_identifier(&self) -> String {
        format!(
            "{}{}",
            canonical_country(&self.country_code),
            clean_identifier(&self.number)
        )
    }
}

// ============================================================================
// REQUESTER IDENTITY
// ============================================================================

/// The caller's own VAT registration, used by the authenticated phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterIdentity {
    pub country_code: String,
    pub number: String,
}

impl RequesterIdentity {
    pub fn new(country_code: &str, number: &str) -> Self {
        RequesterIdentity {
            country_code: country_code.to_string(),
            number: number.to_string(),
        }
    }

    /// Parse "DK12345678" style input
    pub fn from_raw(raw: &str) -> Option<Self> {
        let (country_code, number) = split_raw_identifier(raw)?;
        Some(RequesterIdentity {
            country_code,
            number,
        })
    }
}

// ============================================================================
// NORMALIZATION HELPERS
// ============================================================================

/// Uppercase and drop everything that is not A-Z or 0-9
pub fn clean_identifier(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Cleaned country code as the registry knows it
///
/// Greece is registered as "EL"; "GR" is accepted as an alias.
pub fn canonical_country(code: &str) -> String {
    let cleaned = clean_identifier(code);
    if cleaned == "GR" {
        "EL".to_string()
    } else {
        cleaned
    }
}

/// Split a raw identifier into (country, number)
fn split_raw_identifier(raw: &str) -> Option<(String, String)> {
    let cleaned = clean_identifier(raw);
    if cleaned.len() < 3 {
        return None;
    }

    let (country, number) = cleaned.split_at(2);
    Some((canonical_country(country), number.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
