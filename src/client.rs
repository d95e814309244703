// 📡 Verification Client - Two-phase registry protocol for one identifier
//
// Phases:
//   1. Authenticated check (only with a requester identity). The only path
//      that returns a consultation identifier.
//   2. Anonymous lookup, used whenever phase 1 is skipped, exhausted or
//      rejected the requester.
//
// Every reply is classified into a closed `Probe`. Transient signals are
// retried with exponential backoff and never reported as `Invalid`.

use crate::candidate::RequesterIdentity;
use crate::fraud::is_placeholder;
use crate::outcome::{AttemptRecord, Outcome, Phase};
use crate::transport::{
    lookup_path, CheckRequest, RegistryReply, RegistryTransport, TransportError, CHECK_PATH,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Registry codes meaning "try again later", never "invalid"
const TRANSIENT_CODES: &[&str] = &[
    "MS_UNAVAILABLE",
    "MS_MAX_CONCURRENT_REQ",
    "SERVICE_UNAVAILABLE",
    "TIMEOUT",
    "GLOBAL_MAX_CONCURRENT_REQ",
    "VAT_BLOCKED",
    "IP_BLOCKED",
];

const RETRY_HTTP_CODES: &[u16] = &[429, 500, 502, 503, 504];

/// The registry refused the caller's own identity
const REQUESTER_REJECTED_CODES: &[&str] = &["INVALID_REQUESTER_INFO"];

// ============================================================================
// RETRY POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Waited before every attempt
    pub politeness_delay: Duration,
    /// Backoff after the first transient failure; doubles per attempt
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// `base_backoff * 2^attempt` (attempt is 0-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            politeness_delay: Duration::from_millis(500),
            base_backoff: Duration::from_millis(1000),
        }
    }
}

// ============================================================================
// PROBE CLASSIFICATION
// ============================================================================

/// Registry data from a definitive "valid" answer
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRecord {
    pub name: Option<String>,
    pub address: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub consultation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientKind {
    HttpStatus(u16),
    RegistryCode(String),
    Malformed(String),
    Timeout,
    Connection,
    Rejected(String),
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientKind::HttpStatus(code) => write!(f, "HTTP {}", code),
            TransientKind::RegistryCode(code) => write!(f, "{}", code),
            TransientKind::Malformed(why) => write!(f, "Malformed response ({})", why),
            TransientKind::Timeout => write!(f, "Connection timeout"),
            TransientKind::Connection => write!(f, "Connection error"),
            TransientKind::Rejected(why) => write!(f, "Request rejected ({})", why),
        }
    }
}

/// Result of a single request, returned by value
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    Success(RegistryRecord),
    AuthoritativeInvalid(String),
    RequesterRejected(String),
    Transient(TransientKind),
    Fatal(String),
}

impl Probe {
    fn summary(&self) -> String {
        match self {
            Probe::Success(record) => {
                format!("valid ({})", record.name.as_deref().unwrap_or("---"))
            }
            Probe::AuthoritativeInvalid(detail) => format!("invalid ({})", detail),
            Probe::RequesterRejected(code) => format!("requester rejected ({})", code),
            Probe::Transient(kind) => format!("transient: {}", kind),
            Probe::Fatal(detail) => format!("fatal: {}", detail),
        }
    }

    fn from_transport_error(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => Probe::Transient(TransientKind::Timeout),
            TransportError::Connect(_) => Probe::Transient(TransientKind::Connection),
            TransportError::Request(msg) => {
                Probe::Transient(TransientKind::Malformed(truncate(msg, 80)))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: Option<String>,
}

/// Fields of both reply shapes (`isValid` on lookups, `valid` on checks)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryBody {
    #[serde(alias = "isValid")]
    valid: Option<bool>,
    name: Option<String>,
    address: Option<String>,
    request_date: Option<String>,
    request_identifier: Option<String>,
    user_error: Option<String>,
    error: Option<serde_json::Value>,
    action_succeed: Option<bool>,
    error_wrappers: Option<Vec<ErrorWrapper>>,
}

impl RegistryBody {
    /// Machine-readable codes carried by the reply
    fn error_codes(&self) -> Vec<String> {
        let mut codes = Vec::new();
        if let Some(code) = &self.user_error {
            codes.push(code.trim().to_uppercase());
        }
        for wrapper in self.error_wrappers.iter().flatten() {
            if let Some(code) = &wrapper.error {
                codes.push(code.trim().to_uppercase());
            }
        }
        codes
    }

    fn error_text(&self) -> Option<String> {
        self.error.as_ref().map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Classify one registry reply
pub fn classify(reply: &RegistryReply, phase: Phase) -> Probe {
    if RETRY_HTTP_CODES.contains(&reply.status) {
        return Probe::Transient(TransientKind::HttpStatus(reply.status));
    }

    let body: RegistryBody = match serde_json::from_str(&reply.body) {
        Ok(body) => body,
        Err(_) if reply.status == 200 => {
            return Probe::Transient(TransientKind::Malformed("invalid JSON".to_string()))
        }
        Err(_) => return Probe::Fatal(format!("Unexpected HTTP {}", reply.status)),
    };

    let codes = body.error_codes();

    if phase == Phase::Authenticated {
        if let Some(code) = codes
            .iter()
            .find(|c| REQUESTER_REJECTED_CODES.contains(&c.as_str()))
        {
            return Probe::RequesterRejected(code.clone());
        }
    }

    if let Some(code) = codes.iter().find(|c| TRANSIENT_CODES.contains(&c.as_str())) {
        return Probe::Transient(TransientKind::RegistryCode(code.clone()));
    }

    if let Some(text) = body.error_text() {
        let upper = text.to_uppercase();
        if let Some(code) = TRANSIENT_CODES.iter().find(|c| upper.contains(*c)) {
            return Probe::Transient(TransientKind::RegistryCode(code.to_string()));
        }
    }

    if reply.status != 200 {
        return Probe::Fatal(format!("Unexpected HTTP {}", reply.status));
    }

    if body.action_succeed == Some(false) {
        let why = if codes.is_empty() {
            "request not accepted".to_string()
        } else {
            codes.join(", ")
        };
        return Probe::Transient(TransientKind::Rejected(why));
    }

    match body.valid {
        Some(true) => Probe::Success(RegistryRecord {
            name: meaningful(body.name),
            address: meaningful(body.address),
            requested_at: body
                .request_date
                .as_deref()
                .and_then(parse_request_date)
                .unwrap_or_else(Utc::now),
            consultation_id: match phase {
                Phase::Authenticated => body.request_identifier.filter(|id| !id.trim().is_empty()),
                Phase::Anonymous => None,
            },
        }),
        Some(false) => Probe::AuthoritativeInvalid(
            body.user_error
                .filter(|code| !code.trim().is_empty() && code != "VALID")
                .unwrap_or_else(|| "VAT number not found".to_string()),
        ),
        None => Probe::Transient(TransientKind::Malformed("missing validity flag".to_string())),
    }
}

/// RFC 3339, or a date with offset such as "2026-01-15+01:00"
///
/// A bare date means midnight at its offset, so "2026-01-15+01:00" is
/// 2026-01-14T23:00:00Z.
pub fn parse_request_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()?;
    let offset = match raw.get(10..)? {
        "" => "Z",
        other => other,
    };
    let midnight = format!("{}T00:00:00{}", date.format("%Y-%m-%d"), offset);
    DateTime::parse_from_rfc3339(&midnight)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn meaningful(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !is_placeholder(v))
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ============================================================================
// VERIFICATION CLIENT
// ============================================================================

/// What a full verification produced
#[derive(Debug, Clone)]
pub struct Verification {
    pub outcome: Outcome,
    /// The authenticated phase refused the requester identity
    pub requester_rejected: bool,
    pub attempts: Vec<AttemptRecord>,
}

enum Call<'a> {
    Lookup { country_code: &'a str, number: &'a str },
    Check(&'a CheckRequest),
}

impl Call<'_> {
    fn method(&self) -> &'static str {
        match self {
            Call::Lookup { .. } => "GET",
            Call::Check(_) => "POST",
        }
    }

    fn target(&self) -> String {
        match self {
            Call::Lookup {
                country_code,
                number,
            } => lookup_path(country_code, number),
            Call::Check(request) => format!(
                "{} {}{}",
                CHECK_PATH, request.country_code, request.vat_number
            ),
        }
    }
}

enum PhaseResult {
    Done(Outcome),
    RequesterRejected,
    Exhausted(String),
    Fatal(String),
}

pub struct VerificationClient {
    transport: Arc<dyn RegistryTransport>,
    policy: RetryPolicy,
}

impl VerificationClient {
    pub fn new(transport: Arc<dyn RegistryTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Verify one identifier with at most `retry_budget` attempts per phase
    pub async fn verify(
        &self,
        country_code: &str,
        number: &str,
        requester: Option<&RequesterIdentity>,
        retry_budget: u32,
    ) -> Verification {
        let budget = retry_budget.max(1);
        let mut trail = Vec::new();
        let mut requester_rejected = false;

        if let Some(requester) = requester {
            let request = CheckRequest {
                country_code: country_code.to_string(),
                vat_number: number.to_string(),
                requester_member_state_code: requester.country_code.clone(),
                requester_number: requester.number.clone(),
            };

            match self
                .run_phase(Phase::Authenticated, &Call::Check(&request), budget, &mut trail)
                .await
            {
                PhaseResult::Done(outcome) => {
                    return Verification {
                        outcome,
                        requester_rejected,
                        attempts: trail,
                    }
                }
                PhaseResult::RequesterRejected => {
                    warn!(
                        requester = %format!("{}{}", requester.country_code, requester.number),
                        "requester identity rejected, falling back to anonymous lookup"
                    );
                    requester_rejected = true;
                }
                PhaseResult::Exhausted(detail) | PhaseResult::Fatal(detail) => {
                    debug!(country = country_code, number, %detail, "authenticated phase gave up");
                }
            }
        }

        let call = Call::Lookup {
            country_code,
            number,
        };
        let outcome = match self
            .run_phase(Phase::Anonymous, &call, budget, &mut trail)
            .await
        {
            PhaseResult::Done(outcome) => outcome,
            PhaseResult::Exhausted(detail) | PhaseResult::Fatal(detail) => {
                warn!(country = country_code, number, %detail, "registry unavailable");
                Outcome::ServiceUnavailable {
                    detail,
                    debug_trail: trail.clone(),
                }
            }
            // Lookups carry no requester identity
            PhaseResult::RequesterRejected => Outcome::Error {
                detail: "Registry rejected an anonymous lookup as a requester error".to_string(),
            },
        };

        Verification {
            outcome,
            requester_rejected,
            attempts: trail,
        }
    }

    async fn run_phase(
        &self,
        phase: Phase,
        call: &Call<'_>,
        budget: u32,
        trail: &mut Vec<AttemptRecord>,
    ) -> PhaseResult {
        let mut last_problem = String::from("No attempt made");

        for attempt in 0..budget {
            if !self.policy.politeness_delay.is_zero() {
                sleep(self.policy.politeness_delay).await;
            }

            let probe = match self.send(call).await {
                Ok(reply) => classify(&reply, phase),
                Err(err) => Probe::from_transport_error(&err),
            };

            debug!(
                phase = phase.as_str(),
                attempt = attempt + 1,
                target = %call.target(),
                result = %probe.summary(),
                "registry attempt"
            );

            trail.push(AttemptRecord {
                phase,
                attempt: attempt + 1,
                method: call.method().to_string(),
                target: call.target(),
                summary: probe.summary(),
            });

            match probe {
                Probe::Success(record) => {
                    return PhaseResult::Done(Outcome::Valid {
                        name: record.name,
                        address: record.address,
                        requested_at: record.requested_at,
                        consultation_id: record.consultation_id,
                    })
                }
                Probe::AuthoritativeInvalid(detail) => {
                    return PhaseResult::Done(Outcome::Invalid { detail })
                }
                Probe::RequesterRejected(_) => return PhaseResult::RequesterRejected,
                Probe::Fatal(detail) => return PhaseResult::Fatal(detail),
                Probe::Transient(kind) => {
                    last_problem = kind.to_string();
                    if attempt + 1 < budget {
                        sleep(self.policy.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        PhaseResult::Exhausted(format!("{} after {} attempts", last_problem, budget))
    }

    async fn send(&self, call: &Call<'_>) -> Result<RegistryReply, TransportError> {
        match call {
            Call::Lookup {
                country_code,
                number,
            } => self.transport.lookup(country_code, number).await,
            Call::Check(request) => self.transport.check(request).await,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::{invalid, ok, status, user_error, valid, ScriptedTransport};

    fn no_delay() -> RetryPolicy {
        RetryPolicy {
            politeness_delay: Duration::ZERO,
            base_backoff: Duration::ZERO,
        }
    }

    fn client(transport: &Arc<ScriptedTransport>) -> VerificationClient {
        VerificationClient::new(transport.clone(), no_delay())
    }

    fn requester() -> RequesterIdentity {
        RequesterIdentity::new("DK", "10150817")
    }

    #[tokio::test]
    async fn test_anonymous_valid() {
        let transport = Arc::new(
            ScriptedTransport::new().on_lookup("DK13598562", vec![valid("LEGO System A/S")]),
        );

        let result = client(&transport).verify("DK", "13598562", None, 3).await;

        match &result.outcome {
            Outcome::Valid {
                name,
                consultation_id,
                requested_at,
                ..
            } => {
                assert_eq!(name.as_deref(), Some("LEGO System A/S"));
                assert!(consultation_id.is_none());
                assert_eq!(requested_at.to_rfc3339(), "2026-01-15T10:00:00+00:00");
            }
            other => panic!("expected Valid, got {:?}", other),
        }
        assert_eq!(transport.lookup_calls("DK13598562"), 1);
        assert!(!result.requester_rejected);
    }

    #[tokio::test]
    async fn test_definitive_invalid_is_never_unavailable() {
        let transport =
            Arc::new(ScriptedTransport::new().on_lookup("DK99999999", vec![invalid()]));

        let result = client(&transport).verify("DK", "99999999", None, 3).await;

        assert_eq!(
            result.outcome,
            Outcome::Invalid {
                detail: "INVALID".to_string()
            }
        );
        assert_eq!(transport.lookup_calls("DK99999999"), 1);
    }

    #[tokio::test]
    async fn test_http_503_exhausts_budget() {
        let transport = Arc::new(ScriptedTransport::new().on_lookup("IT00159560366", vec![status(503)]));

        let result = client(&transport).verify("IT", "00159560366", None, 3).await;

        match &result.outcome {
            Outcome::ServiceUnavailable { detail, debug_trail } => {
                assert_eq!(detail, "HTTP 503 after 3 attempts");
                assert_eq!(debug_trail.len(), 3);
                assert_eq!(debug_trail[0].method, "GET");
                assert_eq!(debug_trail[0].target, "/ms/IT/vat/00159560366");
                assert_eq!(debug_trail[2].attempt, 3);
            }
            other => panic!("expected ServiceUnavailable, got {:?}", other),
        }
        assert_eq!(transport.lookup_calls("IT00159560366"), 3);
    }

    #[tokio::test]
    async fn test_budget_of_one_means_one_attempt() {
        let transport = Arc::new(ScriptedTransport::new().on_lookup("IT00224140368", vec![status(429)]));

        let result = client(&transport).verify("IT", "00224140368", None, 1).await;

        assert!(matches!(result.outcome, Outcome::ServiceUnavailable { .. }));
        assert_eq!(transport.lookup_calls("IT00224140368"), 1);
    }

    #[tokio::test]
    async fn test_transient_then_valid() {
        let transport = Arc::new(ScriptedTransport::new().on_lookup(
            "SE556074308901",
            vec![user_error("MS_MAX_CONCURRENT_REQ"), valid("Volvo Car AB")],
        ));

        let result = client(&transport).verify("SE", "556074308901", None, 3).await;

        assert!(result.outcome.is_valid());
        assert_eq!(transport.lookup_calls("SE556074308901"), 2);
        assert_eq!(result.attempts.len(), 2);
        assert!(result.attempts[0].summary.contains("MS_MAX_CONCURRENT_REQ"));
    }

    #[tokio::test]
    async fn test_transport_errors_are_transient() {
        let transport = Arc::new(ScriptedTransport::new().on_lookup(
            "DE129274202",
            vec![
                Err(TransportError::Timeout("30s".into())),
                Err(TransportError::Connect("refused".into())),
                ok("<html>maintenance</html>"),
            ],
        ));

        let result = client(&transport).verify("DE", "129274202", None, 3).await;

        match &result.outcome {
            Outcome::ServiceUnavailable { detail, debug_trail } => {
                assert!(detail.starts_with("Malformed response"));
                assert!(debug_trail[0].summary.contains("Connection timeout"));
                assert!(debug_trail[1].summary.contains("Connection error"));
            }
            other => panic!("expected ServiceUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_status_stops_phase() {
        let transport = Arc::new(ScriptedTransport::new().on_lookup("FR10632012100", vec![status(404)]));

        let result = client(&transport).verify("FR", "10632012100", None, 3).await;

        match &result.outcome {
            Outcome::ServiceUnavailable { detail, .. } => assert_eq!(detail, "Unexpected HTTP 404"),
            other => panic!("expected ServiceUnavailable, got {:?}", other),
        }
        assert_eq!(transport.lookup_calls("FR10632012100"), 1);
    }

    #[tokio::test]
    async fn test_authenticated_valid_has_consultation_id() {
        let transport = Arc::new(ScriptedTransport::new().on_check(
            "DK13598562",
            vec![ok(r#"{"countryCode":"DK","vatNumber":"13598562","requestDate":"2026-01-15+01:00","valid":true,"requestIdentifier":"WAPIAAAAZ1","name":"LEGO System A/S","address":"Billund"}"#)],
        ));

        let requester = requester();
        let result = client(&transport)
            .verify("DK", "13598562", Some(&requester), 3)
            .await;

        match &result.outcome {
            Outcome::Valid {
                consultation_id,
                requested_at,
                ..
            } => {
                assert_eq!(consultation_id.as_deref(), Some("WAPIAAAAZ1"));
                assert_eq!(requested_at.to_rfc3339(), "2026-01-14T23:00:00+00:00");
            }
            other => panic!("expected Valid, got {:?}", other),
        }
        assert_eq!(transport.check_calls("DK13598562"), 1);
        assert_eq!(transport.lookup_calls("DK13598562"), 0);
    }

    #[tokio::test]
    async fn test_rejected_requester_falls_back_without_retry() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_check(
                    "DK13598562",
                    vec![ok(r#"{"actionSucceed":false,"errorWrappers":[{"error":"INVALID_REQUESTER_INFO"}]}"#)],
                )
                .on_lookup("DK13598562", vec![valid("LEGO System A/S")]),
        );

        let requester = requester();
        let result = client(&transport)
            .verify("DK", "13598562", Some(&requester), 3)
            .await;

        assert!(result.requester_rejected);
        assert_eq!(transport.check_calls("DK13598562"), 1);
        assert_eq!(transport.lookup_calls("DK13598562"), 1);
        match &result.outcome {
            Outcome::Valid { consultation_id, .. } => assert!(consultation_id.is_none()),
            other => panic!("expected Valid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_rejection_retried_then_anonymous() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_check(
                    "DK13598562",
                    vec![ok(r#"{"actionSucceed":false,"errorWrappers":[{"error":"INVALID_INPUT"}]}"#)],
                )
                .on_lookup("DK13598562", vec![valid("LEGO System A/S")]),
        );

        let requester = requester();
        let result = client(&transport)
            .verify("DK", "13598562", Some(&requester), 2)
            .await;

        assert!(!result.requester_rejected);
        assert_eq!(transport.check_calls("DK13598562"), 2);
        assert_eq!(transport.lookup_calls("DK13598562"), 1);
        assert!(result.outcome.is_valid());
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(result.attempts[0].method, "POST");
    }

    #[test]
    fn test_classify_error_field() {
        let reply = RegistryReply::new(200, r#"{"error":"Member State service unavailable: MS_UNAVAILABLE"}"#);
        assert_eq!(
            classify(&reply, Phase::Anonymous),
            Probe::Transient(TransientKind::RegistryCode("MS_UNAVAILABLE".to_string()))
        );
    }

    #[test]
    fn test_classify_missing_flag_is_malformed() {
        let reply = RegistryReply::new(200, r#"{"name":"---"}"#);
        assert!(matches!(
            classify(&reply, Phase::Anonymous),
            Probe::Transient(TransientKind::Malformed(_))
        ));
    }

    #[test]
    fn test_requester_code_ignored_on_anonymous_phase() {
        let reply = RegistryReply::new(200, r#"{"isValid":false,"userError":"INVALID_REQUESTER_INFO"}"#);
        assert_eq!(
            classify(&reply, Phase::Anonymous),
            Probe::AuthoritativeInvalid("INVALID_REQUESTER_INFO".to_string())
        );
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let policy = RetryPolicy {
            politeness_delay: Duration::from_millis(500),
            base_backoff: Duration::from_millis(250),
        };

        let delays: Vec<Duration> = (0..5).map(|a| policy.backoff_delay(a)).collect();
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0]);
            assert_eq!(pair[1], pair[0] * 2);
        }
        assert_eq!(delays[0], Duration::from_millis(250));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(250).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_are_applied() {
        let transport = Arc::new(ScriptedTransport::new().on_lookup("IT00159560366", vec![status(503)]));
        let client = VerificationClient::new(
            transport.clone(),
            RetryPolicy {
                politeness_delay: Duration::from_millis(500),
                base_backoff: Duration::from_millis(1000),
            },
        );

        let start = tokio::time::Instant::now();
        let result = client.verify("IT", "00159560366", None, 3).await;
        let elapsed = start.elapsed();

        // 3 politeness delays + backoff of 1s and 2s between attempts
        assert!(matches!(result.outcome, Outcome::ServiceUnavailable { .. }));
        assert!(elapsed >= Duration::from_millis(4500), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(4600), "elapsed {:?}", elapsed);
    }

    #[test]
    fn test_parse_request_date() {
        assert!(parse_request_date("2026-01-15T10:20:30.123Z").is_some());
        assert_eq!(
            parse_request_date("2026-01-15+01:00").unwrap().to_rfc3339(),
            "2026-01-14T23:00:00+00:00"
        );
        assert_eq!(
            parse_request_date("2026-01-15-02:00").unwrap().to_rfc3339(),
            "2026-01-15T02:00:00+00:00"
        );
        assert_eq!(
            parse_request_date("2026-01-15").unwrap().to_rfc3339(),
            "2026-01-15T00:00:00+00:00"
        );
        assert!(parse_request_date("2026-01-15+bogus").is_none());
        assert!(parse_request_date("yesterday").is_none());
        assert!(parse_request_date("").is_none());
    }
}
