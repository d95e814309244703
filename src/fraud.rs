// 🕵️ Fraud Scorer - Declared name vs registry name
//
// Problem solved:
// - "LEGO" vs "LEGO System A/S" → same company (extra legal words)
// - "Maersk A.P. Moller" vs "A.P. Moller - Maersk" → same company (reordered)
// - "Novo Nordisk" vs "Carrefour" → flag it
//
// Three independent similarity measures, best one wins, so benign naming
// variation does not raise false fraud flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Values the registry (or a spreadsheet) uses for "no name"
const PLACEHOLDERS: &[&str] = &["", "---", "-", "n/a", "na", "null", "none"];

/// Legal-form tokens ignored when comparing names (after punctuation removal)
const LEGAL_FORMS: &[&str] = &[
    "as", "aps", "ab", "ag", "amba", "bv", "co", "corp", "gmbh", "inc", "kft", "kg",
    "limited", "llc", "ltd", "nv", "oy", "oyj", "plc", "sa", "sarl", "sas", "se", "spa",
    "sro", "srl",
];

// ============================================================================
// RISK LEVEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Names agree
    Verified,

    /// Partial agreement - a human should look
    CheckManually,

    /// Names do not agree
    PotentialFraud,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Verified => "Verified",
            RiskLevel::CheckManually => "Check Manually",
            RiskLevel::PotentialFraud => "Potential Fraud",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudAssessment {
    /// Similarity 0-100
    pub score: u8,
    pub risk: RiskLevel,
}

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Score above `upper` → Verified, at or above `lower` → CheckManually
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudThresholds {
    pub upper: u8,
    pub lower: u8,
}

impl Default for FraudThresholds {
    fn default() -> Self {
        FraudThresholds { upper: 70, lower: 40 }
    }
}

// ============================================================================
// FRAUD SCORER
// ============================================================================

pub struct FraudScorer {
    thresholds: FraudThresholds,
}

impl FraudScorer {
    pub fn new(thresholds: FraudThresholds) -> Self {
        FraudScorer { thresholds }
    }

    /// Score a declared name against the registry name
    ///
    /// Placeholders or empty names score 0.
    pub fn score(&self, declared_name: &str, registry_name: &str) -> FraudAssessment {
        let score = name_similarity(declared_name, registry_name);
        FraudAssessment {
            score,
            risk: self.classify(score),
        }
    }

    /// Like `score`, but None when either side is missing or a placeholder
    pub fn assess(
        &self,
        declared_name: Option<&str>,
        registry_name: Option<&str>,
    ) -> Option<FraudAssessment> {
        let declared = declared_name.filter(|n| !is_placeholder(n))?;
        let registry = registry_name.filter(|n| !is_placeholder(n))?;
        Some(self.score(declared, registry))
    }

    pub fn classify(&self, score: u8) -> RiskLevel {
        if score > self.thresholds.upper {
            RiskLevel::Verified
        } else if score >= self.thresholds.lower {
            RiskLevel::CheckManually
        } else {
            RiskLevel::PotentialFraud
        }
    }
}

impl Default for FraudScorer {
    fn default() -> Self {
        Self::new(FraudThresholds::default())
    }
}

pub fn is_placeholder(name: &str) -> bool {
    let trimmed = name.trim().to_lowercase();
    PLACEHOLDERS.contains(&trimmed.as_str())
}

/// Best of token-set, partial and token-sort similarity (0-100)
pub fn name_similarity(a: &str, b: &str) -> u8 {
    if is_placeholder(a) || is_placeholder(b) {
        return 0;
    }

    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let best = token_set_ratio(&a, &b)
        .max(partial_ratio(&a, &b))
        .max(token_sort_ratio(&a, &b));

    best.round().clamp(0.0, 100.0) as u8
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Lowercase, drop punctuation inside words, drop legal-form words
///
/// Example: "LEGO System A/S" → "lego system"
fn normalize_name(name: &str) -> String {
    let words: Vec<String> = name
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect();

    // Nothing alphanumeric ("+", "&&"): compare the raw text instead
    if words.is_empty() {
        return name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    }

    let without_forms: Vec<&str> = words
        .iter()
        .map(|w| w.as_str())
        .filter(|w| !LEGAL_FORMS.contains(w))
        .collect();

    // A name made only of legal-form words ("AB") stays as it is
    if without_forms.is_empty() {
        words.join(" ")
    } else {
        without_forms.join(" ")
    }
}

// ============================================================================
// SIMILARITY MEASURES
// ============================================================================

/// 100 * (1 - levenshtein / longer length)
fn ratio(s1: &str, s2: &str) -> f64 {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();
    let longest = len1.max(len2);

    if longest == 0 {
        return 100.0;
    }

    let distance = levenshtein_distance(s1, s2);
    100.0 * (1.0 - distance as f64 / longest as f64)
}

/// Best ratio of the shorter string against every same-length window of the longer
fn partial_ratio(s1: &str, s2: &str) -> f64 {
    let (shorter, longer) = if s1.chars().count() <= s2.chars().count() {
        (s1, s2)
    } else {
        (s2, s1)
    };

    if shorter.is_empty() {
        return 0.0;
    }
    if longer.contains(shorter) {
        return 100.0;
    }

    let window = shorter.chars().count();
    let longer_chars: Vec<char> = longer.chars().collect();

    let mut best: f64 = 0.0;
    for start in 0..=(longer_chars.len() - window) {
        let slice: String = longer_chars[start..start + window].iter().collect();
        best = best.max(ratio(shorter, &slice));
    }

    best
}

/// Ratio after sorting the words of both names
fn token_sort_ratio(s1: &str, s2: &str) -> f64 {
    ratio(&sorted_tokens(s1).join(" "), &sorted_tokens(s2).join(" "))
}

/// Ratio over shared words plus the leftovers of each side
///
/// One name's words being a subset of the other's scores 100.
fn token_set_ratio(s1: &str, s2: &str) -> f64 {
    let tokens1: BTreeSet<&str> = s1.split_whitespace().collect();
    let tokens2: BTreeSet<&str> = s2.split_whitespace().collect();

    if tokens1.is_empty() || tokens2.is_empty() {
        return 0.0;
    }

    let shared: Vec<&str> = tokens1.intersection(&tokens2).copied().collect();
    let only1: Vec<&str> = tokens1.difference(&tokens2).copied().collect();
    let only2: Vec<&str> = tokens2.difference(&tokens1).copied().collect();

    if !shared.is_empty() && (only1.is_empty() || only2.is_empty()) {
        return 100.0;
    }

    let shared_str = shared.join(" ");
    let combined1 = join_nonempty(&shared_str, &only1.join(" "));
    let combined2 = join_nonempty(&shared_str, &only2.join(" "));

    let mut best = ratio(&combined1, &combined2);
    if !shared.is_empty() {
        best = best
            .max(ratio(&shared_str, &combined1))
            .max(ratio(&shared_str, &combined2));
    }
    best
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{} {}", a, b),
    }
}

/// Calculate Levenshtein distance between two strings (by character)
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };

            matrix[i][j] = std::cmp::min(
                std::cmp::min(
                    matrix[i - 1][j] + 1, // deletion
                    matrix[i][j - 1] + 1, // insertion
                ),
                matrix[i - 1][j - 1] + cost, // substitution
            );
        }
    }

    matrix[len1][len2]
}

// ============================================================================
// TESTS
// ============================================================================
