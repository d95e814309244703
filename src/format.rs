// 📐 Format Validator - Table-driven VAT number shape checks
// Purely local: a failed check means the candidate is never sent to the registry.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;

// ============================================================================
// PATTERN TABLE
// ============================================================================

/// (country code, pattern for the number part, human-readable description)
///
/// EU member states as registered in VIES (Greece is "EL") plus Northern Ireland.
const VAT_PATTERNS: &[(&str, &str, &str)] = &[
    ("AT", r"^U\d{8}$", "ATU + 8 digits"),
    ("BE", r"^[01]\d{9}$", "BE + 10 digits starting with 0 or 1"),
    ("BG", r"^\d{9,10}$", "BG + 9 or 10 digits"),
    ("CY", r"^\d{8}[A-Z]$", "CY + 8 digits + 1 letter"),
    ("CZ", r"^\d{8,10}$", "CZ + 8 to 10 digits"),
    ("DE", r"^\d{9}$", "DE + 9 digits"),
    ("DK", r"^\d{8}$", "DK + 8 digits"),
    ("EE", r"^\d{9}$", "EE + 9 digits"),
    ("EL", r"^\d{9}$", "EL + 9 digits"),
    ("ES", r"^[A-Z0-9]\d{7}[A-Z0-9]$", "ES + 9 characters (letter or digit first and last)"),
    ("FI", r"^\d{8}$", "FI + 8 digits"),
    ("FR", r"^[A-HJ-NP-Z0-9]{2}\d{9}$", "FR + 2 characters + 9 digits"),
    ("HR", r"^\d{11}$", "HR + 11 digits"),
    ("HU", r"^\d{8}$", "HU + 8 digits"),
    ("IE", r"^(\d{7}[A-W][A-I]?|\d[A-Z]\d{5}[A-W])$", "IE + 7 digits + 1-2 letters, or digit + letter + 5 digits + letter"),
    ("IT", r"^\d{11}$", "IT + 11 digits"),
    ("LT", r"^(\d{9}|\d{12})$", "LT + 9 or 12 digits"),
    ("LU", r"^\d{8}$", "LU + 8 digits"),
    ("LV", r"^\d{11}$", "LV + 11 digits"),
    ("MT", r"^\d{8}$", "MT + 8 digits"),
    ("NL", r"^\d{9}B\d{2}$", "NL + 9 digits + B + 2 digits"),
    ("PL", r"^\d{10}$", "PL + 10 digits"),
    ("PT", r"^\d{9}$", "PT + 9 digits"),
    ("RO", r"^\d{2,10}$", "RO + 2 to 10 digits"),
    ("SE", r"^\d{12}$", "SE + 12 digits"),
    ("SI", r"^\d{8}$", "SI + 8 digits"),
    ("SK", r"^\d{10}$", "SK + 10 digits"),
    ("XI", r"^(\d{9}|\d{12}|GD\d{3}|HA\d{3})$", "XI + 9 or 12 digits, or GD/HA + 3 digits"),
];

// ============================================================================
// FORMAT CHECK RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCheck {
    pub matched: bool,
    pub expected_pattern: String,
}

struct FormatRule {
    pattern: Regex,
    description: &'static str,
}

// ============================================================================
// FORMAT VALIDATOR
// ============================================================================

pub struct FormatValidator {
    rules: HashMap<&'static str, FormatRule>,
}

impl FormatValidator {
    /// Compile the pattern table
    pub fn new() -> Result<Self> {
        let mut rules = HashMap::with_capacity(VAT_PATTERNS.len());

        for (code, pattern, description) in VAT_PATTERNS {
            let pattern = Regex::new(pattern)
                .with_context(|| format!("Invalid VAT pattern for {}", code))?;
            rules.insert(*code, FormatRule { pattern, description: *description });
        }

        Ok(FormatValidator { rules })
    }

    /// Check one number against its country's pattern
    pub fn check(&self, country_code: &str, number: &str) -> FormatCheck {
        match self.rules.get(country_code) {
            Some(rule) => FormatCheck {
                matched: rule.pattern.is_match(number),
                expected_pattern: rule.description.to_string(),
            },
            None => FormatCheck {
                matched: false,
                expected_pattern: format!(
                    "Unsupported country code '{}' (expected one of {})",
                    country_code,
                    self.supported_countries().join(", ")
                ),
            },
        }
    }

    pub fn is_supported(&self, country_code: &str) -> bool {
        self.rules.contains_key(country_code)
    }

    /// Supported codes in table order
    pub fn supported_countries(&self) -> Vec<&'static str> {
        VAT_PATTERNS.iter().map(|(code, _, _)| *code).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_member_states_plus_xi() {
        let validator = FormatValidator::new().unwrap();
        assert_eq!(validator.supported_countries().len(), 28);
        assert!(validator.is_supported("XI"));
        assert!(validator.is_supported("EL"));
        assert!(!validator.is_supported("GR"));
    }

    #[test]
    fn test_known_valid_shapes() {
        let validator = FormatValidator::new().unwrap();

        let samples = [
            ("DK", "13598562"),
            ("SE", "556074308901"),
            ("DE", "129274202"),
            ("IE", "6388047V"),
            ("IE", "9692928F"),
            ("FR", "10632012100"),
            ("IT", "00159560366"),
            ("NL", "001007727B01"),
            ("BE", "0417497106"),
            ("AT", "U33864707"),
            ("FI", "01120389"),
            ("PT", "500278188"),
            ("LU", "26375245"),
            ("CZ", "00177041"),
            ("PL", "7361701370"),
        ];

        for (country, number) in samples {
            let check = validator.check(country, number);
            assert!(check.matched, "{}{} should match {}", country, number, check.expected_pattern);
        }
    }

    #[test]
    fn test_bad_shapes() {
        let validator = FormatValidator::new().unwrap();

        let check = validator.check("DK", "123");
        assert!(!check.matched);
        assert_eq!(check.expected_pattern, "DK + 8 digits");

        assert!(!validator.check("DE", "12345ABC").matched);
        assert!(!validator.check("SE", "1234567890").matched);
        assert!(!validator.check("FR", "").matched);
    }

    #[test]
    fn test_unknown_country_rejected() {
        let validator = FormatValidator::new().unwrap();

        let check = validator.check("US", "123456789");
        assert!(!check.matched);
        assert!(check.expected_pattern.contains("Unsupported country code 'US'"));

        assert!(!validator.check("NO", "123456789").matched);
        assert!(!validator.check("??", "HELTFORKERT").matched);
    }
}
