// 🚦 Batch Scheduler - Bounded concurrent verification with ordered output
//
// Flow per batch:
//   deduplicate → restore checkpoint → dispatch remaining candidates
//   (at most `concurrency` in flight) → reassemble by origin index
//
// Flow per candidate:
//   format check → breaker budget → verify → fraud score → breaker update
//
// Each candidate runs in its own spawned task, so a panic ends that
// candidate as `Error` and the rest of the batch carries on.

use crate::candidate::{canonical_country, clean_identifier, Candidate, RequesterIdentity};
use crate::checkpoint::{CheckpointGate, CheckpointStore};
use crate::circuit_breaker::CircuitBreaker;
use crate::client::VerificationClient;
use crate::config::{EngineConfig, RequesterFallback};
use crate::deduplication::{DeduplicationEngine, DuplicateEntry};
use crate::format::FormatValidator;
use crate::fraud::FraudScorer;
use crate::outcome::{BatchSummary, Outcome, ValidationRecord};
use crate::transport::{HttpTransport, RegistryTransport};
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

// ============================================================================
// PROGRESS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Resolved candidates, checkpoint-restored ones included
    pub completed: usize,
    pub total: usize,
    /// None until this run has completed at least one candidate
    pub eta: Option<Duration>,
}

impl Progress {
    pub fn eta_label(&self) -> String {
        match self.eta {
            Some(eta) => format_duration(eta),
            None => "calculating...".to_string(),
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

/// "45s", "2m 15s", "1h 5m"
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

// ============================================================================
// BATCH REPORT
// ============================================================================

#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One record per unique candidate, sorted by origin index
    pub records: Vec<ValidationRecord>,
    pub duplicates: Vec<DuplicateEntry>,
    pub summary: BatchSummary,
    /// Countries whose retry budget was reduced during the run
    pub tripped_countries: Vec<String>,
    pub elapsed: Duration,
}

// ============================================================================
// RUN CONTEXT
// ============================================================================

/// Everything one run shares between its units; dropped when the run ends
struct RunContext {
    client: VerificationClient,
    breaker: CircuitBreaker,
    scorer: FraudScorer,
    formats: Arc<FormatValidator>,
    requester: Option<RequesterIdentity>,
    requester_fallback: RequesterFallback,
    requester_disabled: AtomicBool,
}

impl RunContext {
    fn active_requester(&self) -> Option<&RequesterIdentity> {
        if self.requester_disabled.load(Ordering::SeqCst) {
            None
        } else {
            self.requester.as_ref()
        }
    }

    async fn validate_one(&self, candidate: Candidate) -> ValidationRecord {
        let country_code = canonical_country(&candidate.country_code);
        let number = clean_identifier(&candidate.number);

        let check = self.formats.check(&country_code, &number);
        let outcome = if !check.matched {
            Outcome::InvalidFormat {
                expected_pattern: check.expected_pattern,
            }
        } else {
            let budget = self.breaker.effective_retry_budget(&country_code);
            let verification = self
                .client
                .verify(&country_code, &number, self.active_requester(), budget)
                .await;

            if verification.requester_rejected
                && self.requester_fallback == RequesterFallback::DisableForRun
                && !self.requester_disabled.swap(true, Ordering::SeqCst)
            {
                warn!("authenticated phase disabled for the rest of the run");
            }

            if matches!(verification.outcome, Outcome::ServiceUnavailable { .. }) {
                self.breaker.record_failure(&country_code);
            }

            verification.outcome
        };

        let fraud = if outcome.is_valid() {
            self.scorer
                .assess(candidate.declared_name.as_deref(), outcome.registry_name())
        } else {
            None
        };

        ValidationRecord {
            origin_index: candidate.origin_index,
            country_code,
            number,
            declared_name: candidate.declared_name,
            outcome,
            fraud,
        }
    }
}

// ============================================================================
// BATCH VALIDATOR
// ============================================================================

pub struct BatchValidator {
    config: EngineConfig,
    transport: Arc<dyn RegistryTransport>,
    formats: Arc<FormatValidator>,
    checkpoint: Option<Arc<CheckpointStore>>,
}

impl BatchValidator {
    /// Validator talking to the registry over HTTP
    pub fn new(config: EngineConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            &config.registry_base_url,
            config.concurrency,
            config.request_timeout(),
        )?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: EngineConfig,
        transport: Arc<dyn RegistryTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(BatchValidator {
            config,
            transport,
            formats: Arc::new(FormatValidator::new()?),
            checkpoint: None,
        })
    }

    /// Builder pattern: persist progress to `store`
    pub fn with_checkpoint(mut self, store: Arc<CheckpointStore>) -> Self {
        self.checkpoint = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn validate_batch(
        &self,
        candidates: Vec<Candidate>,
        requester: Option<RequesterIdentity>,
    ) -> BatchReport {
        self.validate_batch_with_progress(candidates, requester, |_| {})
            .await
    }

    /// Validate a batch, calling `on_progress` after every completion
    pub async fn validate_batch_with_progress<F>(
        &self,
        candidates: Vec<Candidate>,
        requester: Option<RequesterIdentity>,
        mut on_progress: F,
    ) -> BatchReport
    where
        F: FnMut(Progress),
    {
        let started = Instant::now();

        let dedup = DeduplicationEngine::new().partition(candidates);
        let total = dedup.unique.len();
        info!(
            total,
            duplicates = dedup.duplicates.len(),
            concurrency = self.config.concurrency,
            authenticated = requester.is_some(),
            "starting batch"
        );

        let mut completed = self.restore_checkpoint(&dedup.unique);
        let resumed = completed.len();
        if resumed > 0 {
            info!(resumed, "resuming from checkpoint");
        }

        let pending: Vec<Candidate> = dedup
            .unique
            .into_iter()
            .filter(|c| !completed.contains_key(&c.origin_index))
            .collect();

        let ctx = Arc::new(RunContext {
            client: VerificationClient::new(self.transport.clone(), self.config.retry_policy()),
            breaker: CircuitBreaker::new(self.config.breaker_threshold, self.config.max_retries),
            scorer: FraudScorer::new(self.config.fraud_thresholds),
            formats: self.formats.clone(),
            requester,
            requester_fallback: self.config.requester_fallback,
            requester_disabled: AtomicBool::new(false),
        });

        let mut gate = CheckpointGate::new(self.config.checkpoint_interval);
        let mut finished_this_run: u32 = 0;

        let mut results = stream::iter(pending.into_iter().map(|candidate| {
            let ctx = ctx.clone();
            async move {
                let fallback = candidate.clone();
                match tokio::spawn(async move { ctx.validate_one(candidate).await }).await {
                    Ok(record) => record,
                    Err(join_error) => {
                        let detail = if join_error.is_panic() {
                            format!("Unexpected failure: {}", panic_message(join_error.into_panic()))
                        } else {
                            format!("Unexpected failure: {}", join_error)
                        };
                        error!(index = fallback.origin_index, %detail, "validation unit failed");
                        error_record(fallback, detail)
                    }
                }
            }
        }))
        .buffer_unordered(self.config.concurrency.max(1));

        while let Some(record) = results.next().await {
            completed.insert(record.origin_index, record);
            finished_this_run += 1;

            // Rolling average over this run only; restored records took no time
            let remaining = (total - completed.len()) as u32;
            let average = started.elapsed() / finished_this_run;
            on_progress(Progress {
                completed: completed.len(),
                total,
                eta: Some(average * remaining),
            });

            if gate.record_completion() && completed.len() < total {
                self.save_checkpoint(&completed, total).await;
            }
        }
        drop(results);

        if completed.len() == total {
            if let Some(store) = &self.checkpoint {
                if let Err(e) = store.clear() {
                    warn!(error = %e, "failed to clear checkpoint");
                }
            }
        }

        let records: Vec<ValidationRecord> = completed.into_values().collect();
        let summary = BatchSummary::from_records(&records, dedup.duplicates.len(), resumed);
        let elapsed = started.elapsed();

        info!(
            total = summary.total,
            valid = summary.valid,
            invalid = summary.invalid,
            invalid_format = summary.invalid_format,
            service_unavailable = summary.service_unavailable,
            errors = summary.errors,
            elapsed_ms = elapsed.as_millis() as u64,
            "batch finished"
        );

        BatchReport {
            records,
            duplicates: dedup.duplicates,
            summary,
            tripped_countries: ctx.breaker.tripped(),
            elapsed,
        }
    }

    /// Completed records from a matching checkpoint; stale checkpoints are dropped
    fn restore_checkpoint(&self, unique: &[Candidate]) -> BTreeMap<usize, ValidationRecord> {
        let Some(store) = &self.checkpoint else {
            return BTreeMap::new();
        };

        match store.load() {
            Ok(Some(checkpoint)) if checkpoint.total_count == unique.len() => {
                let wanted: HashSet<usize> = unique.iter().map(|c| c.origin_index).collect();
                let mut restored = checkpoint.completed;
                restored.retain(|index, _| wanted.contains(index));
                restored
            }
            Ok(Some(checkpoint)) => {
                warn!(
                    session = %store.session(),
                    saved_total = checkpoint.total_count,
                    current_total = unique.len(),
                    "discarding stale checkpoint"
                );
                if let Err(e) = store.clear() {
                    warn!(error = %e, "failed to discard stale checkpoint");
                }
                BTreeMap::new()
            }
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "checkpoint unreadable, starting from scratch");
                BTreeMap::new()
            }
        }
    }

    /// Snapshot `completed` on the blocking pool; the loop waits for the write
    async fn save_checkpoint(&self, completed: &BTreeMap<usize, ValidationRecord>, total: usize) {
        let Some(store) = self.checkpoint.clone() else {
            return;
        };

        let snapshot = completed.clone();
        let count = snapshot.len();
        match tokio::task::spawn_blocking(move || store.save(&snapshot, total)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, completed = count, "failed to save checkpoint"),
            Err(e) => warn!(error = %e, completed = count, "checkpoint save task failed"),
        }
    }
}

fn error_record(candidate: Candidate, detail: String) -> ValidationRecord {
    ValidationRecord {
        origin_index: candidate.origin_index,
        country_code: canonical_country(&candidate.country_code),
        number: clean_identifier(&candidate.number),
        declared_name: candidate.declared_name,
        outcome: Outcome::Error { detail },
        fraud: None,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================
