// 🔗 Registry Transport - Wire seam to the VIES REST service
// `HttpTransport` talks to the real registry over one pooled reqwest client;
// tests swap in a scripted transport.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_REGISTRY_URL: &str = "https://ec.europa.eu/taxation_customs/vies/rest-api";

const USER_AGENT: &str = concat!("vat-verify/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Raw registry answer: status plus unparsed body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryReply {
    pub status: u16,
    pub body: String,
}

impl RegistryReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Body of the authenticated check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub country_code: String,
    pub vat_number: String,
    pub requester_member_state_code: String,
    pub requester_number: String,
}

/// Path of the anonymous lookup, relative to the registry base URL
pub fn lookup_path(country_code: &str, number: &str) -> String {
    format!("/ms/{}/vat/{}", country_code, number)
}

pub const CHECK_PATH: &str = "/check-vat-number";

#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Anonymous GET lookup
    async fn lookup(&self, country_code: &str, number: &str)
        -> Result<RegistryReply, TransportError>;

    /// Authenticated POST check
    async fn check(&self, request: &CheckRequest) -> Result<RegistryReply, TransportError>;
}

// ============================================================================
// HTTP TRANSPORT
// ============================================================================

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport whose connection pool matches the worker count
    pub fn new(base_url: &str, pool_size: usize, timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_size)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn into_reply(response: reqwest::Response) -> Result<RegistryReply, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RegistryReply { status, body })
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn lookup(
        &self,
        country_code: &str,
        number: &str,
    ) -> Result<RegistryReply, TransportError> {
        let url = format!("{}{}", self.base_url, lookup_path(country_code, number));

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::into_reply(response).await
    }

    async fn check(&self, request: &CheckRequest) -> Result<RegistryReply, TransportError> {
        let url = format!("{}{}", self.base_url, CHECK_PATH);

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        Self::into_reply(response).await
    }
}

// ============================================================================
// SCRIPTED TRANSPORT (tests)
// ============================================================================

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    pub(crate) type Scripted = Result<RegistryReply, TransportError>;

    /// Replies queued per identifier; the last reply repeats once the queue is down to one
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        lookups: Mutex<HashMap<String, VecDeque<Scripted>>>,
        checks: Mutex<HashMap<String, VecDeque<Scripted>>>,
        lookup_calls: Mutex<HashMap<String, u32>>,
        check_calls: Mutex<HashMap<String, u32>>,
        panic_on: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on_lookup(self, key: &str, replies: Vec<Scripted>) -> Self {
            self.lookups.lock().unwrap().insert(key.to_string(), replies.into());
            self
        }

        pub(crate) fn on_check(self, key: &str, replies: Vec<Scripted>) -> Self {
            self.checks.lock().unwrap().insert(key.to_string(), replies.into());
            self
        }

        pub(crate) fn panic_on_lookup(self, key: &str) -> Self {
            self.panic_on.lock().unwrap().push(key.to_string());
            self
        }

        pub(crate) fn lookup_calls(&self, key: &str) -> u32 {
            self.lookup_calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        pub(crate) fn check_calls(&self, key: &str) -> u32 {
            self.check_calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        fn next(queues: &Mutex<HashMap<String, VecDeque<Scripted>>>, key: &str) -> Scripted {
            let mut queues = queues.lock().unwrap();
            match queues.get_mut(key) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap(),
                None => Ok(RegistryReply::new(404, "")),
            }
        }
    }

    #[async_trait]
    impl RegistryTransport for ScriptedTransport {
        async fn lookup(&self, country_code: &str, number: &str) -> Scripted {
            let key = format!("{}{}", country_code, number);
            *self.lookup_calls.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

            if self.panic_on.lock().unwrap().contains(&key) {
                panic!("scripted transport failure for {}", key);
            }

            Self::next(&self.lookups, &key)
        }

        async fn check(&self, request: &CheckRequest) -> Scripted {
            let key = format!("{}{}", request.country_code, request.vat_number);
            *self.check_calls.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
            Self::next(&self.checks, &key)
        }
    }

    pub(crate) fn ok(body: &str) -> Scripted {
        Ok(RegistryReply::new(200, body))
    }

    pub(crate) fn status(code: u16) -> Scripted {
        Ok(RegistryReply::new(code, ""))
    }

    pub(crate) fn valid(name: &str) -> Scripted {
        ok(&format!(
            r#"{{"isValid":true,"requestDate":"2026-01-15T10:00:00.000Z","userError":"VALID","name":"{}","address":"Aastvej 1, 7190 Billund","requestIdentifier":"","vatNumber":"","viesApproximate":{{}}}}"#,
            name
        ))
    }

    pub(crate) fn invalid() -> Scripted {
        ok(r#"{"isValid":false,"requestDate":"2026-01-15T10:00:00.000Z","userError":"INVALID","name":"---","address":"---"}"#)
    }

    pub(crate) fn user_error(code: &str) -> Scripted {
        ok(&format!(
            r#"{{"isValid":false,"requestDate":"2026-01-15T10:00:00.000Z","userError":"{}"}}"#,
            code
        ))
    }
}
