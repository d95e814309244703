// 🔍 Deduplication Engine - Detect repeated identifiers before dispatch
// The first occurrence of each normalized identifier is verified; later
// occurrences are reported as duplicates and never hit the registry.
// Identifiers too short to hold a country code and a number are never merged,
// so every unusable row keeps its own format-error outcome.

use crate::candidate::Candidate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Two-letter country code plus at least one character
const MIN_IDENTIFIER_LEN: usize = 3;

// ============================================================================
// DUPLICATE ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEntry {
    /// Index of the dropped candidate
    pub origin_index: usize,

    /// Index of the occurrence that is verified instead
    pub first_index: usize,

    /// Normalized identifier shared by both ("DK13598562")
    pub identifier: String,
}

// ============================================================================
// DEDUPLICATION RESULT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DeduplicationResult {
    /// First occurrences, in input order
    pub unique: Vec<Candidate>,

    /// Everything else
    pub duplicates: Vec<DuplicateEntry>,
}

impl DeduplicationResult {
    pub fn summary(&self) -> String {
        format!(
            "{} unique candidates, {} duplicates removed",
            self.unique.len(),
            self.duplicates.len()
        )
    }
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

pub struct DeduplicationEngine;

impl DeduplicationEngine {
    pub fn new() -> Self {
        DeduplicationEngine
    }

    /// Partition candidates into first occurrences and duplicates
    pub fn partition(&self, candidates: Vec<Candidate>) -> DeduplicationResult {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut result = DeduplicationResult::default();

        for candidate in candidates {
            let identifier = candidate.normalized_identifier();

            if identifier.len() < MIN_IDENTIFIER_LEN {
                result.unique.push(candidate);
                continue;
            }

            match seen.get(&identifier) {
                Some(&first_index) => result.duplicates.push(DuplicateEntry {
                    origin_index: candidate.origin_index,
                    first_index,
                    identifier,
                }),
                None => {
                    seen.insert(identifier, candidate.origin_index);
                    result.unique.push(candidate);
                }
            }
        }

        result
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_duplicate_removed() {
        let engine = DeduplicationEngine::new();

        let candidates = vec![
            Candidate::new(0, "DK", "13598562"),
            Candidate::new(1, "DK", "13598562"),
        ];
        let result = engine.partition(candidates);

        assert_eq!(result.unique.len(), 1);
        assert_eq!(result.unique[0].origin_index, 0);
        assert_eq!(result.duplicates.len(), 1);
        assert_eq!(result.duplicates[0].origin_index, 1);
        assert_eq!(result.duplicates[0].first_index, 0);
        assert_eq!(result.duplicates[0].identifier, "DK13598562");
    }

    #[test]
    fn test_duplicate_after_normalization() {
        let engine = DeduplicationEngine::new();

        // Same number with spacing and case differences
        let candidates = vec![
            Candidate::new(0, "dk", "13 59 85 62"),
            Candidate::new(1, "SE", "556074308901"),
            Candidate::new(2, "DK", "13598562"),
        ];
        let result = engine.partition(candidates);

        assert_eq!(result.unique.len(), 2);
        assert_eq!(result.duplicates.len(), 1);
        assert_eq!(result.duplicates[0].origin_index, 2);
        assert_eq!(result.duplicates[0].first_index, 0);
    }

    #[test]
    fn test_first_occurrence_keeps_its_declared_name() {
        let engine = DeduplicationEngine::new();

        let candidates = vec![
            Candidate::new(0, "DK", "47458714").with_declared_name("LEGO"),
            Candidate::new(1, "DK", "47458714").with_declared_name("Something else"),
        ];
        let result = engine.partition(candidates);

        assert_eq!(result.unique[0].declared_name.as_deref(), Some("LEGO"));
    }

    #[test]
    fn test_unusable_rows_are_never_merged() {
        let engine = DeduplicationEngine::new();

        let candidates = vec![
            Candidate::new(0, "", ""),
            Candidate::new(1, "DK", ""),
            Candidate::new(2, "", ""),
            Candidate::new(3, "DK", ""),
        ];
        let result = engine.partition(candidates);

        assert_eq!(result.unique.len(), 4);
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn test_greek_alias_is_a_duplicate() {
        let engine = DeduplicationEngine::new();

        let candidates = vec![
            Candidate::new(0, "EL", "094014201"),
            Candidate::new(1, "GR", "094014201"),
        ];
        let result = engine.partition(candidates);

        assert_eq!(result.unique.len(), 1);
        assert_eq!(result.duplicates.len(), 1);
        assert_eq!(result.duplicates[0].identifier, "EL094014201");
    }

    #[test]
    fn test_no_duplicates_preserves_order() {
        let engine = DeduplicationEngine::new();

        let candidates = vec![
            Candidate::new(5, "IT", "00159560366"),
            Candidate::new(2, "FR", "10632012100"),
            Candidate::new(9, "DE", "129274202"),
        ];
        let result = engine.partition(candidates);

        let order: Vec<usize> = result.unique.iter().map(|c| c.origin_index).collect();
        assert_eq!(order, vec![5, 2, 9]);
        assert!(result.duplicates.is_empty());
        assert_eq!(result.summary(), "3 unique candidates, 0 duplicates removed");
    }
}
