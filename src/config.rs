// ⚙️ Engine Configuration - Tuning knobs for one validation run
// Loaded from JSON (missing keys fall back to defaults), then optionally
// overridden from VAT_VERIFY_* environment variables.

use crate::checkpoint::DEFAULT_CHECKPOINT_INTERVAL;
use crate::client::RetryPolicy;
use crate::fraud::FraudThresholds;
use crate::transport::DEFAULT_REGISTRY_URL;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// What to do after the registry rejects the caller's own identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequesterFallback {
    /// Skip the authenticated phase for the rest of the run
    #[default]
    DisableForRun,
    /// Try the authenticated phase again for every candidate
    PerCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Units verified in parallel
    pub concurrency: usize,
    /// Attempts per phase before giving up
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub politeness_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// ServiceUnavailable outcomes per country before the retry budget drops to 1
    pub breaker_threshold: u32,
    /// Completions between checkpoint saves
    pub checkpoint_interval: usize,
    pub fraud_thresholds: FraudThresholds,
    pub requester_fallback: RequesterFallback,
    pub registry_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            concurrency: 5,
            max_retries: 3,
            base_backoff_ms: 1000,
            politeness_delay_ms: 500,
            request_timeout_secs: 30,
            breaker_threshold: 3,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            fraud_thresholds: FraudThresholds::default(),
            requester_fallback: RequesterFallback::default(),
            registry_base_url: DEFAULT_REGISTRY_URL.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: EngineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Apply VAT_VERIFY_* environment variables on top of the current values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VAT_VERIFY_CONCURRENCY") {
            self.concurrency = value
                .trim()
                .parse()
                .with_context(|| format!("VAT_VERIFY_CONCURRENCY is not a number: {}", value))?;
        }
        if let Some(value) = lookup("VAT_VERIFY_MAX_RETRIES") {
            self.max_retries = value
                .trim()
                .parse()
                .with_context(|| format!("VAT_VERIFY_MAX_RETRIES is not a number: {}", value))?;
        }
        if let Some(value) = lookup("VAT_VERIFY_BASE_URL") {
            self.registry_base_url = value.trim().to_string();
        }
        if let Some(value) = lookup("VAT_VERIFY_CHECKPOINT_INTERVAL") {
            self.checkpoint_interval = value.trim().parse().with_context(|| {
                format!("VAT_VERIFY_CHECKPOINT_INTERVAL is not a number: {}", value)
            })?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.max_retries == 0 {
            bail!("max_retries must be at least 1");
        }
        if self.checkpoint_interval == 0 {
            bail!("checkpoint_interval must be at least 1");
        }
        if self.fraud_thresholds.upper > 100 {
            bail!("fraud upper threshold must be at most 100");
        }
        if self.fraud_thresholds.lower > self.fraud_thresholds.upper {
            bail!(
                "fraud lower threshold ({}) is above upper threshold ({})",
                self.fraud_thresholds.lower,
                self.fraud_thresholds.upper
            );
        }
        if !self.registry_base_url.starts_with("http://")
            && !self.registry_base_url.starts_with("https://")
        {
            bail!("registry_base_url must be an http(s) URL: {}", self.registry_base_url);
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            politeness_delay: Duration::from_millis(self.politeness_delay_ms),
            base_backoff: Duration::from_millis(self.base_backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// TESTS
// ============================================================================
