// VAT Verify - Core Library
// Bulk VAT registration checks against the VIES registry, exposed for the CLI and embedding callers

pub mod candidate;
pub mod checkpoint;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod deduplication;
pub mod format;
pub mod fraud;
pub mod outcome;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types
pub use candidate::{canonical_country, clean_identifier,Candidate, RequesterIdentity};
pub use checkpoint::{
    session_id_for, Checkpoint, CheckpointGate, CheckpointStore, SessionId, SessionInfo,
};
pub use circuit_breaker::CircuitBreaker;
pub use client::{
    classify, RegistryRecord, RetryPolicy, Probe, TransientKind, Verification,
    VerificationClient,
};
pub use config::{EngineConfig, RequesterFallback};
pub use deduplication::{DeduplicationEngine, DeduplicationResult, DuplicateEntry};
pub use format::{FormatCheck, FormatValidator};
pub use fraud::{name_similarity, FraudAssessment, FraudScorer, FraudThresholds, RiskLevel};
pub use outcome::{AttemptRecord, BatchSummary, Outcome, Phase, ValidationRecord};
pub use scheduler::{format_duration, BatchReport, BatchValidator, Progress};
pub use transport::{
    CheckRequest, HttpTransport, RegistryReply, RegistryTransport, TransportError,
    DEFAULT_REGISTRY_URL,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
