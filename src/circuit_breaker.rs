// 🔌 Circuit Breaker - Per-country retry budget
// Once a country has produced `threshold` ServiceUnavailable outcomes in a run,
// every further candidate for that country gets a single attempt per phase.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

pub struct CircuitBreaker {
    threshold: u32,
    default_budget: u32,
    failures: Mutex<HashMap<String, u32>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, default_budget: u32) -> Self {
        CircuitBreaker {
            threshold,
            default_budget: default_budget.max(1),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Count one ServiceUnavailable outcome for a country
    pub fn record_failure(&self, country_code: &str) {
        let mut failures = self.lock();
        let count = failures.entry(country_code.to_string()).or_insert(0);
        *count += 1;

        if *count == self.threshold {
            warn!(
                country = country_code,
                failures = *count,
                "circuit breaker tripped, retry budget reduced to 1"
            );
        }
    }

    /// Attempts per phase allowed for the next candidate of this country
    pub fn effective_retry_budget(&self, country_code: &str) -> u32 {
        if self.failures(country_code) >= self.threshold {
            1
        } else {
            self.default_budget
        }
    }

    pub fn failures(&self, country_code: &str) -> u32 {
        self.lock().get(country_code).copied().unwrap_or(0)
    }

    /// Countries currently running on the reduced budget, sorted
    pub fn tripped(&self) -> Vec<String> {
        let mut countries: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, count)| **count >= self.threshold)
            .map(|(country, _)| country.clone())
            .collect();
        countries.sort();
        countries
    }

    // A poisoned lock only means another unit panicked mid-update; the
    // counters themselves are still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        self.failures.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// TESTS
// ============================================================================
